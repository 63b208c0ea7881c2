//! Single-flight one-time initialization gate.
//!
//! An [`InitGate`] defers an async population routine until first use: the
//! first caller starts the injected factory and caches the shared future, and
//! every caller — concurrent or later — awaits that same future, so the
//! routine runs at most once. Once resolved the gate is transparent. A failed
//! initialization stays cached (every caller sees the same error) until the
//! owner explicitly calls [`reset`](InitGate::reset); there is no built-in
//! retry.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::debug;

use manifold_core::context::CallContext;
use manifold_core::errors::DispatchError;

use crate::step::{Next, Step, StepResult};

type InitFuture = Shared<BoxFuture<'static, Result<(), DispatchError>>>;

/// One-time async initializer with an injected factory.
pub struct InitGate {
    factory: Box<dyn Fn() -> BoxFuture<'static, Result<(), DispatchError>> + Send + Sync>,
    inflight: Mutex<Option<InitFuture>>,
}

impl InitGate {
    /// Gate around an async population routine.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
    {
        Self {
            factory: Box::new(move || factory().boxed()),
            inflight: Mutex::new(None),
        }
    }

    /// Await the one-time initialization, starting it if nobody has yet.
    pub async fn ensure(&self) -> Result<(), DispatchError> {
        let future = {
            let mut slot = self.inflight.lock();
            match slot.as_ref() {
                Some(future) => future.clone(),
                None => {
                    debug!("starting deferred initialization");
                    let future = (self.factory)().shared();
                    *slot = Some(future.clone());
                    future
                }
            }
        };
        future.await
    }

    /// Drop the cached attempt so the next [`ensure`](Self::ensure) runs the
    /// factory again. The owner's explicit retry decision.
    pub fn reset(&self) {
        debug!("resetting init gate");
        *self.inflight.lock() = None;
    }

    /// Whether an attempt has been started (and not reset) yet.
    pub fn is_started(&self) -> bool {
        self.inflight.lock().is_some()
    }
}

impl std::fmt::Debug for InitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitGate")
            .field("started", &self.is_started())
            .finish()
    }
}

/// Chain step awaiting the gate before continuing. Typically `prepend`ed to a
/// composite's entry chain to defer tree population until the first call.
pub struct GateStep {
    gate: Arc<InitGate>,
}

impl GateStep {
    /// Step view of a gate.
    pub fn new(gate: Arc<InitGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Step for GateStep {
    async fn run(&self, _ctx: Arc<CallContext>, next: Next) -> StepResult {
        self.gate.ensure().await?;
        next().await
    }
}
