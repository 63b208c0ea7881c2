//! Ordered, continuation-passing handler chain.
//!
//! A [`HandlerChain`] owns an ordered list of named [`Step`]s over one
//! `(input, output)` pair. The list is mutable until an execution begins:
//! while any `execute` of the chain is in flight, `append`/`prepend` fail
//! fast with `Internal` ("chain is locked") rather than queuing or silently
//! dropping the mutation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use manifold_core::context::CallContext;
use manifold_core::errors::DispatchError;

use crate::step::{AuthGuardStep, ContextSeeder, Next, Operation, OperationStep, SeederStep, Step, StepResult};

/// A step plus the name used in diagnostics ("`<name>` did not call next").
#[derive(Clone)]
pub struct NamedStep {
    name: Arc<str>,
    step: Arc<dyn Step>,
}

impl NamedStep {
    /// Pair a step with its diagnostic name.
    pub fn new(name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        Self {
            name: name.into().into(),
            step,
        }
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for NamedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedStep").field("name", &self.name).finish()
    }
}

/// Ordered chain of named steps over one call.
#[derive(Default)]
pub struct HandlerChain {
    steps: Mutex<Vec<NamedStep>>,
    /// Number of in-flight executions. Non-zero locks the chain.
    executing: AtomicUsize,
}

impl HandlerChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain seeded with an existing step list (used for the transient
    /// concatenations the dispatcher builds, and for deep clones).
    pub fn from_steps(steps: Vec<NamedStep>) -> Self {
        Self {
            steps: Mutex::new(steps),
            executing: AtomicUsize::new(0),
        }
    }

    /// Add a step at the end of the chain.
    pub fn append(&self, name: impl Into<String>, step: Arc<dyn Step>) -> Result<(), DispatchError> {
        self.ensure_mutable()?;
        let named = NamedStep::new(name, step);
        debug!(step = %named.name(), "appending chain step");
        self.steps.lock().push(named);
        Ok(())
    }

    /// Add a step before all existing steps (runs-first cross-cutting).
    pub fn prepend(&self, name: impl Into<String>, step: Arc<dyn Step>) -> Result<(), DispatchError> {
        self.ensure_mutable()?;
        let named = NamedStep::new(name, step);
        debug!(step = %named.name(), "prepending chain step");
        self.steps.lock().insert(0, named);
        Ok(())
    }

    /// Append an [`Operation`] wrapped as a step.
    pub fn append_operation(
        &self,
        name: impl Into<String>,
        operation: Arc<dyn Operation>,
    ) -> Result<(), DispatchError> {
        self.append(name, Arc::new(OperationStep::new(operation)))
    }

    /// Append an auth guard requiring a non-empty `auth.uid`.
    pub fn append_auth_guard(&self) -> Result<(), DispatchError> {
        self.append("auth", Arc::new(AuthGuardStep))
    }

    /// Prepend an auth guard so it runs before all existing steps.
    pub fn prepend_auth_guard(&self) -> Result<(), DispatchError> {
        self.prepend("auth", Arc::new(AuthGuardStep))
    }

    /// Append a [`ContextSeeder`] wrapped as a step.
    pub fn append_seeder(
        &self,
        name: impl Into<String>,
        seeder: Arc<dyn ContextSeeder>,
    ) -> Result<(), DispatchError> {
        self.append(name, Arc::new(SeederStep::new(seeder)))
    }

    /// Prepend a [`ContextSeeder`] wrapped as a step.
    pub fn prepend_seeder(
        &self,
        name: impl Into<String>,
        seeder: Arc<dyn ContextSeeder>,
    ) -> Result<(), DispatchError> {
        self.prepend(name, Arc::new(SeederStep::new(seeder)))
    }

    /// Snapshot of the current step list.
    pub fn steps(&self) -> Vec<NamedStep> {
        self.steps.lock().clone()
    }

    /// Whether no steps are installed.
    pub fn is_empty(&self) -> bool {
        self.steps.lock().is_empty()
    }

    /// Number of installed steps.
    pub fn len(&self) -> usize {
        self.steps.lock().len()
    }

    /// Execute the chain against `arg`.
    ///
    /// Sets `ctx.input = arg`, clears `ctx.output`, locks the chain for the
    /// call's duration, runs the steps in order with a no-op terminal
    /// continuation, and returns the accumulated output. Fails `Internal`
    /// ("No handlers were added") when the chain is empty; a step error
    /// aborts the remainder and propagates.
    pub async fn execute(
        &self,
        arg: Value,
        ctx: &Arc<CallContext>,
    ) -> Result<Value, DispatchError> {
        let snapshot: Arc<[NamedStep]> = self.steps.lock().clone().into();
        if snapshot.is_empty() {
            return Err(DispatchError::internal("No handlers were added"));
        }

        ctx.set_input(arg);
        ctx.clear_output();

        let _lock = ExecuteLock::acquire(&self.executing);
        run_from(snapshot, 0, Arc::clone(ctx)).await?;
        Ok(ctx.take_output())
    }

    fn ensure_mutable(&self) -> Result<(), DispatchError> {
        if self.executing.load(Ordering::SeqCst) > 0 {
            return Err(DispatchError::internal(
                "chain is locked: cannot mutate a chain while it is executing",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerChain")
            .field("len", &self.len())
            .field("executing", &self.executing.load(Ordering::SeqCst))
            .finish()
    }
}

/// Guard keeping the chain locked for the duration of one execution.
/// A counter (not a flag) so overlapping executions cannot unlock each other.
struct ExecuteLock<'a> {
    executing: &'a AtomicUsize,
}

impl<'a> ExecuteLock<'a> {
    fn acquire(executing: &'a AtomicUsize) -> Self {
        let _ = executing.fetch_add(1, Ordering::SeqCst);
        Self { executing }
    }
}

impl Drop for ExecuteLock<'_> {
    fn drop(&mut self) {
        let _ = self.executing.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run `steps[idx..]` in continuation-passing order.
///
/// Each step receives a `next` that advances to the following step; the step
/// past the end is a no-op terminal. A step that returns `Ok` without having
/// invoked its continuation is a contract violation and fails the chain.
fn run_from(
    steps: Arc<[NamedStep]>,
    idx: usize,
    ctx: Arc<CallContext>,
) -> BoxFuture<'static, StepResult> {
    Box::pin(async move {
        let Some(named) = steps.get(idx) else {
            return Ok(());
        };
        let called = Arc::new(AtomicBool::new(false));
        let next: Next = {
            let steps = Arc::clone(&steps);
            let ctx = Arc::clone(&ctx);
            let called = Arc::clone(&called);
            Box::new(move || {
                called.store(true, Ordering::SeqCst);
                run_from(steps, idx + 1, ctx)
            })
        };

        let step = Arc::clone(&named.step);
        let name = Arc::clone(&named.name);
        step.run(ctx, next).await?;

        if !called.load(Ordering::SeqCst) {
            return Err(DispatchError::internal(format!(
                "the middleware `{name}` did not call next"
            )));
        }
        Ok(())
    })
}
