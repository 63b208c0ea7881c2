//! # manifold-rpc
//!
//! Nested, middleware-composable dispatch engine. One physical entry point
//! fans out over a declared tree of named sub-operations, each independently
//! configurable with its own chain of async request-processing steps, while
//! ancestors inject cross-cutting behavior (auth guards, context seeding,
//! logging) that descendants inherit unless a leaf opts out.
//!
//! ## Building blocks
//!
//! - [`step`] — the [`Step`](step::Step) continuation-passing trait and the
//!   built-in auth-guard / operation / context-seeder steps.
//! - [`chain`] — an ordered [`HandlerChain`](chain::HandlerChain) of named
//!   steps, locked against structural mutation while executing.
//! - [`group`] — a [`ChainGroup`](group::ChainGroup) facade fanning one
//!   mutation out to several sibling chains at once.
//! - [`tree`] — the combined [`HandlerNode`](tree::HandlerNode) tree carrying
//!   both the declared shape and the bound chains.
//! - [`dispatch`] — the recursive tree walk executing matched leaves with
//!   their inherited ancestor steps.
//! - [`builder`] — [`CompositeEndpoint`](builder::CompositeEndpoint), the
//!   constructed composite: population, forking, and the produced entry chain.
//! - [`gate`] — [`InitGate`](gate::InitGate), a single-flight one-time async
//!   initializer usable as a chain's first step.
//!
//! ## Execution model
//!
//! Dispatch is intentionally sequential — no parallel fan-out across sibling
//! keys, no concurrent steps within a chain — so side-effect ordering is
//! deterministic and testable. All failures are members of the shared
//! [`DispatchError`](manifold_core::errors::DispatchError) taxonomy.

#![deny(unsafe_code)]

pub mod builder;
pub mod chain;
pub mod dispatch;
pub mod gate;
pub mod group;
pub mod step;
pub mod tree;
