//! Composite endpoint construction and population.
//!
//! A [`CompositeEndpoint`] owns the combined handler tree built from an
//! [`EndpointSpec`] plus the **entry chain** — the produced root chain the
//! transport executes. The entry chain carries once-per-call steps and the
//! terminal dispatch step; the tree root's own chain (path `""`) carries
//! root-level steps that descendants *inherit*. Invariant: the entry chain
//! is never part of the inherited ancestor list.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use manifold_core::context::CallContext;
use manifold_core::errors::DispatchError;
use manifold_core::spec::EndpointSpec;

use crate::chain::HandlerChain;
use crate::dispatch::dispatch;
use crate::gate::{GateStep, InitGate};
use crate::group::ChainGroup;
use crate::step::{Next, Operation, Step, StepResult};
use crate::tree::HandlerNode;

/// A composite endpoint: one entry chain fanning out over a handler tree.
pub struct CompositeEndpoint {
    entry: Arc<HandlerChain>,
    root: Arc<HandlerNode>,
    dispatch_installed: Mutex<bool>,
}

impl CompositeEndpoint {
    /// Build a composite from a declared spec.
    ///
    /// Validates field names and mirrors the spec into a handler tree with a
    /// fresh empty chain per position. The root must be a branch.
    pub fn from_spec(spec: &EndpointSpec) -> Result<Self, DispatchError> {
        spec.validate()?;
        if spec.is_leaf() {
            return Err(DispatchError::invalid_arguments(
                "a composite root must be a branch, not a single operation",
            ));
        }
        Ok(Self {
            entry: Arc::new(HandlerChain::new()),
            root: Arc::new(HandlerNode::from_spec(spec)),
            dispatch_installed: Mutex::new(false),
        })
    }

    /// Derive an independent composite from this one.
    ///
    /// The handler tree is deep-cloned (fresh chains seeded with copies of
    /// the current step lists, copied `skip_parents` flags) and the entry
    /// chain starts fresh, so the fork can be populated further without
    /// mutating the original.
    pub fn fork(&self) -> Self {
        Self {
            entry: Arc::new(HandlerChain::new()),
            root: Arc::new(self.root.deep_clone()),
            dispatch_installed: Mutex::new(false),
        }
    }

    /// The produced root chain. Steps installed here run exactly once per
    /// call, around the dispatch; they are never inherited by tree positions.
    pub fn entry_chain(&self) -> &Arc<HandlerChain> {
        &self.entry
    }

    /// Chain at a dotted tree path; the empty path addresses the tree root's
    /// own (inherited) chain.
    pub fn chain_at(&self, path: &str) -> Result<Arc<HandlerChain>, DispatchError> {
        self.node_at(path).map(|node| Arc::clone(node.chain()))
    }

    /// Group over the chains at several tree paths, for attaching one
    /// cross-cutting step to multiple siblings atomically.
    pub fn chains_at(&self, paths: &[&str]) -> Result<ChainGroup, DispatchError> {
        let chains = paths
            .iter()
            .map(|path| self.chain_at(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChainGroup::new(chains))
    }

    /// Install an operation at a tree position, named after its path.
    pub fn install_operation(
        &self,
        path: &str,
        operation: Arc<dyn Operation>,
    ) -> Result<(), DispatchError> {
        debug!(path, "installing operation");
        self.chain_at(path)?.append_operation(path, operation)
    }

    /// Install an arbitrary step at a tree position.
    pub fn install_step(
        &self,
        path: &str,
        name: &str,
        step: Arc<dyn Step>,
    ) -> Result<(), DispatchError> {
        self.chain_at(path)?.append(name, step)
    }

    /// Bulk-install operations at dotted paths.
    pub fn populate_operations<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a str, Arc<dyn Operation>)>,
    ) -> Result<(), DispatchError> {
        for (path, operation) in entries {
            self.install_operation(path, operation)?;
        }
        Ok(())
    }

    /// Bulk-install arbitrary steps at dotted paths, named after their paths.
    pub fn populate_steps<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a str, Arc<dyn Step>)>,
    ) -> Result<(), DispatchError> {
        for (path, step) in entries {
            self.install_step(path, path, step)?;
        }
        Ok(())
    }

    /// Detach the leaf at `path` from all inherited ancestor steps.
    pub fn set_skip_parents(&self, path: &str) -> Result<(), DispatchError> {
        let node = self.node_at(path)?;
        let Some(leaf) = node.as_leaf() else {
            return Err(DispatchError::invalid_arguments(format!(
                "`{path}` is not an operation position"
            )));
        };
        leaf.set_skip_parents(true);
        Ok(())
    }

    /// Prepend an init-gate step to the entry chain, deferring population
    /// until the first call.
    pub fn prepend_init_gate(&self, gate: Arc<InitGate>) -> Result<(), DispatchError> {
        self.entry.prepend("init", Arc::new(GateStep::new(gate)))
    }

    /// Append the terminal dispatch step to the entry chain.
    ///
    /// Idempotent: the step is installed at most once no matter how often
    /// this is called. Steps appended to the entry chain afterwards run
    /// after the dispatch completes.
    ///
    /// Installation is serialized: the flag only flips once the append has
    /// landed, so a concurrent first call cannot execute the entry chain
    /// before the dispatch step is in place.
    pub fn install_dispatch(&self) -> Result<(), DispatchError> {
        let mut installed = self.dispatch_installed.lock();
        if *installed {
            return Ok(());
        }
        self.entry.append(
            "dispatch",
            Arc::new(DispatchStep {
                root: Arc::clone(&self.root),
            }),
        )?;
        *installed = true;
        Ok(())
    }

    /// Execute one call: install the dispatch step if needed, then run the
    /// entry chain against `input`.
    pub async fn call(
        &self,
        input: Value,
        ctx: &Arc<CallContext>,
    ) -> Result<Value, DispatchError> {
        self.install_dispatch()?;
        self.entry.execute(input, ctx).await
    }

    /// Sorted dotted paths of every declared operation.
    pub fn operations(&self) -> Vec<String> {
        self.root.leaf_paths()
    }

    /// Whether a dotted path names a declared operation.
    pub fn has_operation(&self, path: &str) -> bool {
        self.root
            .node_at(path)
            .is_some_and(|node| node.as_leaf().is_some())
    }

    fn node_at(&self, path: &str) -> Result<&HandlerNode, DispatchError> {
        self.root.node_at(path).ok_or_else(|| {
            DispatchError::invalid_arguments(format!("unknown position `{path}`"))
        })
    }
}

impl std::fmt::Debug for CompositeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEndpoint")
            .field("operations", &self.operations())
            .field("dispatch_installed", &*self.dispatch_installed.lock())
            .finish()
    }
}

/// Terminal entry-chain step: runs the dispatcher over the whole tree and
/// assigns the assembled result object to `ctx.output`, then continues so
/// entry steps appended later still run.
struct DispatchStep {
    root: Arc<HandlerNode>,
}

#[async_trait]
impl Step for DispatchStep {
    async fn run(&self, ctx: Arc<CallContext>, next: Next) -> StepResult {
        let Some(branch) = self.root.as_branch() else {
            return Err(DispatchError::internal("composite root is not a branch"));
        };
        let results = dispatch(branch, &ctx).await?;
        ctx.set_output(results);
        next().await
    }
}
