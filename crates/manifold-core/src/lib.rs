//! # manifold-core
//!
//! Core types for the Manifold composite dispatch engine:
//!
//! - [`errors`] — the shared four-kind error taxonomy every layer speaks.
//! - [`context`] — the per-invocation [`CallContext`](context::CallContext)
//!   threaded through every step of a call.
//! - [`spec`] — the declarative [`EndpointSpec`](spec::EndpointSpec) tree
//!   describing the callable shape (field names and nesting).
//! - [`envelope`] — wire request/response types used by the transport at the
//!   boundary.
//!
//! The engine itself (chains, dispatcher, builder) lives in `manifold-rpc`.

#![deny(unsafe_code)]

pub mod context;
pub mod envelope;
pub mod errors;
pub mod spec;
