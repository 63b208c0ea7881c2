//! Per-invocation call context threaded through every step of a dispatch.
//!
//! A context is created fresh by the transport for each inbound call and
//! destroyed when the call resolves. The engine treats `auth`, `data`, and
//! `transport` as opaque pass-through state; only `input` and `output` are
//! rewritten as the dispatcher descends the handler tree.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Authenticated caller identity, supplied by the transport.
#[derive(Clone, Debug, Default)]
pub struct AuthIdentity {
    /// Stable user identifier. An auth guard requires this to be non-empty.
    pub uid: String,
    /// Decoded token claims, opaque to the engine.
    pub claims: Map<String, Value>,
}

impl AuthIdentity {
    /// Identity with a uid and no claims.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            claims: Map::new(),
        }
    }
}

/// Mutable per-call state shared by every step of one dispatch.
///
/// Nested dispatch derives a child context via [`child`](Self::child): the
/// `data` bag, `auth` identity, and `transport` fields are shared with the
/// parent, while `input`/`output` are fresh for the subtree being processed.
#[derive(Debug, Default)]
pub struct CallContext {
    /// Argument for the subtree currently being processed.
    input: Mutex<Value>,
    /// Accumulation slot for the subtree's result. Starts `Null`.
    output: Mutex<Value>,
    /// Opaque bag mutated by context-seeding steps; shared with children.
    data: Arc<Mutex<Map<String, Value>>>,
    /// Caller identity, if the transport authenticated the call.
    auth: Option<AuthIdentity>,
    /// Opaque transport metadata, passed through unchanged.
    transport: Arc<Map<String, Value>>,
}

impl CallContext {
    /// Fresh unauthenticated context with empty slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a caller identity.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthIdentity) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Attach opaque transport metadata.
    #[must_use]
    pub fn with_transport(mut self, transport: Map<String, Value>) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Derive a child context for a nested subtree.
    ///
    /// Shares `data`/`auth`/`transport` with `self`; `input` is the subtree
    /// argument and `output` starts empty.
    pub fn child(&self, input: Value) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(Value::Null),
            data: Arc::clone(&self.data),
            auth: self.auth.clone(),
            transport: Arc::clone(&self.transport),
        }
    }

    /// Current subtree argument.
    pub fn input(&self) -> Value {
        self.input.lock().clone()
    }

    /// Replace the subtree argument.
    pub fn set_input(&self, input: Value) {
        *self.input.lock() = input;
    }

    /// Current accumulated output.
    pub fn output(&self) -> Value {
        self.output.lock().clone()
    }

    /// Replace the accumulated output.
    pub fn set_output(&self, output: Value) {
        *self.output.lock() = output;
    }

    /// Reset the output slot to empty.
    pub fn clear_output(&self) {
        *self.output.lock() = Value::Null;
    }

    /// Take the accumulated output, leaving the slot empty.
    pub fn take_output(&self) -> Value {
        std::mem::take(&mut *self.output.lock())
    }

    /// Shallow-merge a step's returned value into the output slot.
    ///
    /// Object-into-object merges accumulate fields across steps; any other
    /// combination replaces the slot wholesale.
    pub fn merge_output(&self, value: Value) {
        let mut slot = self.output.lock();
        match (&mut *slot, value) {
            (Value::Object(acc), Value::Object(fields)) => {
                for (key, field) in fields {
                    let _ = acc.insert(key, field);
                }
            }
            (slot, value) => *slot = value,
        }
    }

    /// Caller identity, if authenticated.
    pub fn auth(&self) -> Option<&AuthIdentity> {
        self.auth.as_ref()
    }

    /// Opaque transport metadata.
    pub fn transport(&self) -> &Map<String, Value> {
        &self.transport
    }

    /// Read a value out of the shared data bag.
    pub fn data_get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    /// Write a value into the shared data bag.
    pub fn data_insert(&self, key: impl Into<String>, value: Value) {
        let _ = self.data.lock().insert(key.into(), value);
    }

    /// Mutate the shared data bag in place.
    pub fn update_data(&self, f: impl FnOnce(&mut Map<String, Value>)) {
        f(&mut self.data.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_context_is_empty() {
        let ctx = CallContext::new();
        assert!(ctx.input().is_null());
        assert!(ctx.output().is_null());
        assert!(ctx.auth().is_none());
        assert!(ctx.transport().is_empty());
    }

    #[test]
    fn merge_output_accumulates_objects() {
        let ctx = CallContext::new();
        ctx.merge_output(json!({"a": 1}));
        ctx.merge_output(json!({"b": 2}));
        assert_eq!(ctx.output(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_output_replaces_non_objects() {
        let ctx = CallContext::new();
        ctx.merge_output(json!({"a": 1}));
        ctx.merge_output(json!(7));
        assert_eq!(ctx.output(), json!(7));
        // And an object after a scalar replaces again.
        ctx.merge_output(json!({"b": 2}));
        assert_eq!(ctx.output(), json!({"b": 2}));
    }

    #[test]
    fn take_output_leaves_slot_empty() {
        let ctx = CallContext::new();
        ctx.set_output(json!({"done": true}));
        assert_eq!(ctx.take_output(), json!({"done": true}));
        assert!(ctx.output().is_null());
    }

    #[test]
    fn child_shares_data_bag() {
        let ctx = CallContext::new();
        let child = ctx.child(json!({"nested": 1}));
        child.data_insert("seeded", json!("yes"));
        // Mutation through the child is visible to the parent.
        assert_eq!(ctx.data_get("seeded"), Some(json!("yes")));
        assert_eq!(child.input(), json!({"nested": 1}));
        assert!(child.output().is_null());
    }

    #[test]
    fn child_substitutes_input_and_output() {
        let ctx = CallContext::new();
        ctx.set_input(json!({"outer": true}));
        ctx.set_output(json!({"partial": 1}));
        let child = ctx.child(json!("inner"));
        assert_eq!(child.input(), json!("inner"));
        assert!(child.output().is_null());
        // Parent slots untouched.
        assert_eq!(ctx.input(), json!({"outer": true}));
        assert_eq!(ctx.output(), json!({"partial": 1}));
    }

    #[test]
    fn child_carries_auth() {
        let ctx = CallContext::new().with_auth(AuthIdentity::new("user-1"));
        let child = ctx.child(Value::Null);
        assert_eq!(child.auth().map(|a| a.uid.as_str()), Some("user-1"));
    }

    #[test]
    fn update_data_mutates_in_place() {
        let ctx = CallContext::new();
        ctx.update_data(|bag| {
            let _ = bag.insert("n".into(), json!(1));
        });
        ctx.update_data(|bag| {
            if let Some(Value::Number(n)) = bag.get("n") {
                let next = n.as_i64().unwrap_or(0) + 1;
                let _ = bag.insert("n".into(), json!(next));
            }
        });
        assert_eq!(ctx.data_get("n"), Some(json!(2)));
    }
}
