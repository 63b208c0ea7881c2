//! Declarative endpoint spec tree.
//!
//! An [`EndpointSpec`] describes the callable shape of a composite endpoint —
//! field names and nesting only, no runtime logic. It is the single contract
//! consumed both by client call-site helpers and by the composite builder,
//! and is immutable once declared.

use std::collections::BTreeMap;

use crate::errors::DispatchError;

/// Separator used in dotted operation paths (`"profile.get"`).
pub const PATH_SEPARATOR: char = '.';

/// One position in the declared endpoint tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointSpec {
    /// Terminal operation position. Carries no runtime payload.
    Leaf,
    /// Nested mapping from field name to child position.
    Branch(BTreeMap<String, EndpointSpec>),
}

impl EndpointSpec {
    /// Terminal operation marker.
    pub fn leaf() -> Self {
        Self::Leaf
    }

    /// Branch from `(name, child)` pairs.
    pub fn branch<N>(children: impl IntoIterator<Item = (N, EndpointSpec)>) -> Self
    where
        N: Into<String>,
    {
        Self::Branch(
            children
                .into_iter()
                .map(|(name, child)| (name.into(), child))
                .collect(),
        )
    }

    /// Whether this position is terminal.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf)
    }

    /// Child positions of a branch; empty for a leaf.
    pub fn children(&self) -> Option<&BTreeMap<String, EndpointSpec>> {
        match self {
            Self::Leaf => None,
            Self::Branch(children) => Some(children),
        }
    }

    /// Look up a direct child by field name.
    pub fn get(&self, name: &str) -> Option<&EndpointSpec> {
        self.children().and_then(|c| c.get(name))
    }

    /// Validate every field name in the tree.
    ///
    /// Field names are structural: they become dotted-path segments in the
    /// populate API, so empty names and names containing the path separator
    /// are rejected.
    pub fn validate(&self) -> Result<(), DispatchError> {
        let Some(children) = self.children() else {
            return Ok(());
        };
        for (name, child) in children {
            validate_field_name(name)?;
            child.validate()?;
        }
        Ok(())
    }

    /// Sorted dotted paths of every leaf in the tree.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_leaf_paths(self, "", &mut paths);
        paths.sort();
        paths
    }
}

/// Check a single field name for structural collisions.
pub fn validate_field_name(name: &str) -> Result<(), DispatchError> {
    if name.is_empty() {
        return Err(DispatchError::invalid_arguments(
            "spec field names must not be empty",
        ));
    }
    if name.contains(PATH_SEPARATOR) {
        return Err(DispatchError::invalid_arguments(format!(
            "spec field name `{name}` collides with the path separator `{PATH_SEPARATOR}`"
        )));
    }
    Ok(())
}

fn collect_leaf_paths(spec: &EndpointSpec, prefix: &str, out: &mut Vec<String>) {
    match spec {
        EndpointSpec::Leaf => out.push(prefix.to_owned()),
        EndpointSpec::Branch(children) => {
            for (name, child) in children {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}{PATH_SEPARATOR}{name}")
                };
                collect_leaf_paths(child, &path, out);
            }
        }
    }
}
