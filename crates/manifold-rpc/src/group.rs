//! Fan-out facade over several handler chains.
//!
//! A [`ChainGroup`] applies one chain mutation to N chains at once — the way
//! a single cross-cutting step (one auth rule, one seeder) is attached to
//! several sibling branches atomically, without the caller iterating
//! manually.

use std::sync::Arc;

use crate::chain::{HandlerChain, NamedStep};
use crate::step::{ContextSeeder, Operation, Step};
use manifold_core::errors::DispatchError;

/// Facade fanning chain mutations out to several wrapped chains.
pub struct ChainGroup {
    chains: Vec<Arc<HandlerChain>>,
}

impl ChainGroup {
    /// Group over the given chains, in fan-out order.
    pub fn new(chains: Vec<Arc<HandlerChain>>) -> Self {
        Self { chains }
    }

    /// Append a step to every wrapped chain.
    pub fn append(&self, name: &str, step: Arc<dyn Step>) -> Result<(), DispatchError> {
        for chain in &self.chains {
            chain.append(name, Arc::clone(&step))?;
        }
        Ok(())
    }

    /// Prepend a step to every wrapped chain.
    pub fn prepend(&self, name: &str, step: Arc<dyn Step>) -> Result<(), DispatchError> {
        for chain in &self.chains {
            chain.prepend(name, Arc::clone(&step))?;
        }
        Ok(())
    }

    /// Append an operation step to every wrapped chain.
    pub fn append_operation(
        &self,
        name: &str,
        operation: Arc<dyn Operation>,
    ) -> Result<(), DispatchError> {
        for chain in &self.chains {
            chain.append_operation(name, Arc::clone(&operation))?;
        }
        Ok(())
    }

    /// Append an auth guard to every wrapped chain.
    pub fn append_auth_guard(&self) -> Result<(), DispatchError> {
        for chain in &self.chains {
            chain.append_auth_guard()?;
        }
        Ok(())
    }

    /// Prepend an auth guard to every wrapped chain.
    pub fn prepend_auth_guard(&self) -> Result<(), DispatchError> {
        for chain in &self.chains {
            chain.prepend_auth_guard()?;
        }
        Ok(())
    }

    /// Append a context seeder to every wrapped chain.
    pub fn append_seeder(
        &self,
        name: &str,
        seeder: Arc<dyn ContextSeeder>,
    ) -> Result<(), DispatchError> {
        for chain in &self.chains {
            chain.append_seeder(name, Arc::clone(&seeder))?;
        }
        Ok(())
    }

    /// Sequential concatenation of every wrapped chain's current steps,
    /// in wrapped order.
    pub fn steps(&self) -> Vec<NamedStep> {
        self.chains.iter().flat_map(|chain| chain.steps()).collect()
    }

    /// Whether every wrapped chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chains.iter().all(|chain| chain.is_empty())
    }

    /// Number of wrapped chains.
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }
}
