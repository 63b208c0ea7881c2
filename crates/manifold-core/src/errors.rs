//! Dispatch error taxonomy and error codes.
//!
//! Every failure that leaves the engine is one of four kinds. Foreign errors
//! (anything a step produces that is not already a [`DispatchError`]) are
//! classified into the taxonomy at the conversion seam, so callers never see
//! an uncategorized error.

use crate::envelope::ErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Call input is missing, malformed, or matches no known operation.
pub const INVALID_ARGUMENTS: &str = "INVALID_ARGUMENTS";
/// An auth guard ran without an authenticated caller.
pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
/// A declared position has no usable handler bound to it.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Engine contract violation or unexpected internal failure.
pub const INTERNAL: &str = "INTERNAL";

/// Error type raised by chains, the dispatcher, and the composite builder.
///
/// Errors are `Clone` so a cached initialization failure can be handed to
/// every caller sharing an in-flight future.
#[derive(Clone, Debug, thiserror::Error)]
pub enum DispatchError {
    /// Required input missing or wrong shape.
    #[error("{message}")]
    InvalidArguments {
        /// Description of what is wrong.
        message: String,
    },

    /// The call carries no authenticated identity.
    #[error("{message}")]
    Unauthenticated {
        /// Description.
        message: String,
    },

    /// A spec-declared position has no handler bound.
    #[error("{message}")]
    NotFound {
        /// Description, naming the unbound position.
        message: String,
    },

    /// Engine invariant violation (locked chain mutated, continuation never
    /// called, empty chain executed) or a classified foreign error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl DispatchError {
    /// Build an [`InvalidArguments`](Self::InvalidArguments) error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Build an [`Unauthenticated`](Self::Unauthenticated) error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Build a [`NotFound`](Self::NotFound) error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Build an [`Internal`](Self::Internal) error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArguments { .. } => INVALID_ARGUMENTS,
            Self::Unauthenticated { .. } => UNAUTHENTICATED,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Internal { .. } => INTERNAL,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        }
    }
}

// Foreign errors are classified once, here, into the taxonomy.

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(err.to_string())
    }
}
