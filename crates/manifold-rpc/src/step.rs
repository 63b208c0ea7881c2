//! Step trait and built-in steps.
//!
//! A [`Step`] is one link in a continuation-passing chain over a single call.
//! It receives the shared [`CallContext`] and a [`Next`] continuation; calling
//! `next()` hands control to the rest of the chain. The chain runner records
//! whether the continuation was invoked — a step that returns `Ok` without
//! calling it fails the whole chain (see [`chain`](crate::chain)).

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use manifold_core::context::CallContext;
use manifold_core::errors::DispatchError;

/// Result type shared by steps and the chain runner.
pub type StepResult = Result<(), DispatchError>;

/// Future produced by a [`Next`] continuation.
pub type NextFuture = BoxFuture<'static, StepResult>;

/// Continuation handed to a step: invokes the remainder of the chain.
pub type Next = Box<dyn FnOnce() -> NextFuture + Send>;

/// One link in a handler chain.
#[async_trait]
pub trait Step: Send + Sync {
    /// Run this step. Call `next()` exactly once to continue the chain;
    /// returning an error aborts the remainder.
    async fn run(&self, ctx: Arc<CallContext>, next: Next) -> StepResult;
}

/// A terminal operation bound to a tree position: consumes the position's
/// input and produces its result value.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Handle the input for this position.
    async fn call(&self, input: Value, ctx: &CallContext) -> Result<Value, DispatchError>;
}

/// A cross-cutting step that only mutates the context's shared data bag.
#[async_trait]
pub trait ContextSeeder: Send + Sync {
    /// Populate `ctx` before downstream steps run.
    async fn seed(&self, ctx: &CallContext) -> Result<(), DispatchError>;
}

// ── Built-in steps ──────────────────────────────────────────────────

/// Step wrapping an [`Operation`]: calls it with the current input,
/// shallow-merges the returned value into `ctx.output`, then continues.
pub struct OperationStep {
    operation: Arc<dyn Operation>,
}

impl OperationStep {
    /// Wrap an operation.
    pub fn new(operation: Arc<dyn Operation>) -> Self {
        Self { operation }
    }
}

#[async_trait]
impl Step for OperationStep {
    async fn run(&self, ctx: Arc<CallContext>, next: Next) -> StepResult {
        let input = ctx.input();
        let value = self.operation.call(input, &ctx).await?;
        ctx.merge_output(value);
        next().await
    }
}

/// Step requiring an authenticated caller: fails `Unauthenticated` unless the
/// context carries a non-empty `auth.uid`.
pub struct AuthGuardStep;

#[async_trait]
impl Step for AuthGuardStep {
    async fn run(&self, ctx: Arc<CallContext>, next: Next) -> StepResult {
        if ctx.auth().is_some_and(|auth| !auth.uid.is_empty()) {
            next().await
        } else {
            Err(DispatchError::unauthenticated(
                "call requires an authenticated user",
            ))
        }
    }
}

/// Step wrapping a [`ContextSeeder`]: runs it, then continues unconditionally.
pub struct SeederStep {
    seeder: Arc<dyn ContextSeeder>,
}

impl SeederStep {
    /// Wrap a seeder.
    pub fn new(seeder: Arc<dyn ContextSeeder>) -> Self {
        Self { seeder }
    }
}

#[async_trait]
impl Step for SeederStep {
    async fn run(&self, ctx: Arc<CallContext>, next: Next) -> StepResult {
        self.seeder.seed(&ctx).await?;
        next().await
    }
}

// ── Closure adapters ────────────────────────────────────────────────

struct FnOperation<F> {
    f: F,
}

#[async_trait]
impl<F> Operation for FnOperation<F>
where
    F: Fn(Value, &CallContext) -> Result<Value, DispatchError> + Send + Sync,
{
    async fn call(&self, input: Value, ctx: &CallContext) -> Result<Value, DispatchError> {
        (self.f)(input, ctx)
    }
}

/// Adapt a plain function into an [`Operation`].
pub fn operation_fn<F>(f: F) -> Arc<dyn Operation>
where
    F: Fn(Value, &CallContext) -> Result<Value, DispatchError> + Send + Sync + 'static,
{
    Arc::new(FnOperation { f })
}

struct FnSeeder<F> {
    f: F,
}

#[async_trait]
impl<F> ContextSeeder for FnSeeder<F>
where
    F: Fn(&CallContext) -> Result<(), DispatchError> + Send + Sync,
{
    async fn seed(&self, ctx: &CallContext) -> Result<(), DispatchError> {
        (self.f)(ctx)
    }
}

/// Adapt a plain function into a [`ContextSeeder`].
pub fn seeder_fn<F>(f: F) -> Arc<dyn ContextSeeder>
where
    F: Fn(&CallContext) -> Result<(), DispatchError> + Send + Sync + 'static,
{
    Arc::new(FnSeeder { f })
}
