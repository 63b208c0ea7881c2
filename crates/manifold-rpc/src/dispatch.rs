//! Recursive composite dispatcher.
//!
//! Walks the combined handler tree against an input object keyed by field
//! name: matched leaves execute (composed with their inherited ancestor
//! chains), matched branches recurse with a derived child context, and the
//! results are reassembled into one object with the same keys.
//!
//! Ordering contract: sibling keys are processed strictly sequentially, in
//! the input object's own enumeration order (`serde_json` is built with
//! `preserve_order`, so that is the wire order). An error on any key aborts
//! the remaining keys and fails the whole call. Input fields that name no
//! tree position are silently ignored, except at the root, where a call
//! matching nothing at all is an argument error rather than a silent no-op.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use manifold_core::context::CallContext;
use manifold_core::errors::DispatchError;

use crate::chain::HandlerChain;
use crate::tree::{BranchNode, HandlerNode};

/// Dispatch `ctx.input` against the tree rooted at `root`.
///
/// Returns the assembled result object. Fails `InvalidArguments` when the
/// input is null or (root only) when no input field names a known position;
/// fails `NotFound` when a matched position has no handler bound.
pub async fn dispatch(
    root: &BranchNode,
    ctx: &Arc<CallContext>,
) -> Result<Value, DispatchError> {
    let input = ctx.input();
    walk(root, input, Arc::clone(ctx), Vec::new(), true).await
}

fn walk<'a>(
    node: &'a BranchNode,
    input: Value,
    ctx: Arc<CallContext>,
    ancestors: Vec<Arc<HandlerChain>>,
    is_root: bool,
) -> BoxFuture<'a, Result<Value, DispatchError>> {
    Box::pin(async move {
        if input.is_null() {
            return Err(DispatchError::invalid_arguments(
                "call input must not be null",
            ));
        }

        // Own keys of a non-object input are empty, which at a nested level
        // simply yields an empty result object.
        let fields = match input {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };

        // Fields naming no tree position are dropped here, silently.
        let matched: Vec<(String, Value, Arc<HandlerNode>)> = fields
            .into_iter()
            .filter_map(|(name, value)| {
                node.get(&name)
                    .map(|child| (name, value, Arc::clone(child)))
            })
            .collect();

        if is_root && matched.is_empty() {
            return Err(DispatchError::invalid_arguments(
                "no input field matches a known operation",
            ));
        }

        debug!(matched = matched.len(), root = is_root, "dispatching subtree");

        let mut results = Map::new();
        for (name, value, child) in matched {
            match &*child {
                HandlerNode::Branch(branch) => {
                    let mut inherited = ancestors.clone();
                    inherited.push(Arc::clone(node.chain()));
                    let child_ctx = Arc::new(ctx.child(value));
                    let child_input = child_ctx.input();
                    let sub = walk(branch, child_input, child_ctx, inherited, false).await?;
                    let _ = results.insert(name, sub);
                }
                HandlerNode::Leaf(leaf) => {
                    if leaf.chain().is_empty() {
                        warn!(field = %name, "declared operation has no handler bound");
                        return Err(DispatchError::not_found(format!(
                            "no handler bound for `{name}`"
                        )));
                    }

                    let mut steps = Vec::new();
                    if !leaf.skip_parents() {
                        for chain in &ancestors {
                            steps.extend(chain.steps());
                        }
                        steps.extend(node.chain().steps());
                    }
                    steps.extend(leaf.chain().steps());

                    let composed = HandlerChain::from_steps(steps);
                    let result = composed.execute(value, &ctx).await?;
                    let _ = results.insert(name, result);
                }
            }
        }

        Ok(Value::Object(results))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::spec::EndpointSpec;
    use serde_json::json;

    use crate::step::operation_fn;
    use crate::tree::HandlerNode;

    fn tree_for(spec: &EndpointSpec) -> HandlerNode {
        HandlerNode::from_spec(spec)
    }

    fn bind(tree: &HandlerNode, path: &str, value: Value) {
        tree.node_at(path)
            .unwrap()
            .chain()
            .append_operation(path, operation_fn(move |_, _| Ok(value.clone())))
            .unwrap();
    }

    async fn run(tree: &HandlerNode, input: Value) -> Result<Value, DispatchError> {
        let ctx = Arc::new(CallContext::new());
        ctx.set_input(input);
        dispatch(tree.as_branch().unwrap(), &ctx).await
    }

    #[tokio::test]
    async fn null_input_is_invalid() {
        let spec = EndpointSpec::branch([("a", EndpointSpec::leaf())]);
        let tree = tree_for(&spec);
        let err = run(&tree, Value::Null).await.unwrap_err();
        assert_eq!(err.code(), manifold_core::errors::INVALID_ARGUMENTS);
    }

    #[tokio::test]
    async fn root_with_no_recognized_field_is_invalid() {
        let spec = EndpointSpec::branch([("a", EndpointSpec::leaf())]);
        let tree = tree_for(&spec);
        bind(&tree, "a", json!(1));
        let err = run(&tree, json!({"unknown": 1})).await.unwrap_err();
        assert_eq!(err.code(), manifold_core::errors::INVALID_ARGUMENTS);
        assert!(err.to_string().contains("no input field"));
    }

    #[tokio::test]
    async fn unrecognized_fields_are_silently_dropped() {
        let spec = EndpointSpec::branch([("a", EndpointSpec::leaf())]);
        let tree = tree_for(&spec);
        bind(&tree, "a", json!("handled"));
        let result = run(&tree, json!({"a": 1, "extra": true})).await.unwrap();
        assert_eq!(result, json!({"a": "handled"}));
    }

    #[tokio::test]
    async fn declared_but_unbound_position_is_not_found() {
        let spec = EndpointSpec::branch([
            ("a", EndpointSpec::leaf()),
            ("b", EndpointSpec::branch([("c", EndpointSpec::leaf())])),
        ]);
        let tree = tree_for(&spec);
        bind(&tree, "a", json!(1));

        let err = run(&tree, json!({"a": 1, "b": {"c": 2}})).await.unwrap_err();
        assert_eq!(err.code(), manifold_core::errors::NOT_FOUND);
        assert!(err.to_string().contains("`c`"));
    }

    #[tokio::test]
    async fn nested_branch_results_are_reassembled() {
        let spec = EndpointSpec::branch([
            ("ping", EndpointSpec::leaf()),
            (
                "profile",
                EndpointSpec::branch([("get", EndpointSpec::leaf())]),
            ),
        ]);
        let tree = tree_for(&spec);
        bind(&tree, "ping", json!("pong"));
        bind(&tree, "profile.get", json!({"name": "ada"}));

        let result = run(&tree, json!({"ping": {}, "profile": {"get": {}}}))
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({"ping": "pong", "profile": {"get": {"name": "ada"}}})
        );
    }

    #[tokio::test]
    async fn scalar_branch_input_yields_empty_object() {
        let spec = EndpointSpec::branch([(
            "profile",
            EndpointSpec::branch([("get", EndpointSpec::leaf())]),
        )]);
        let tree = tree_for(&spec);
        bind(&tree, "profile.get", json!(1));

        let result = run(&tree, json!({"profile": 5})).await.unwrap();
        assert_eq!(result, json!({"profile": {}}));
    }

    #[tokio::test]
    async fn null_branch_input_is_invalid() {
        let spec = EndpointSpec::branch([(
            "profile",
            EndpointSpec::branch([("get", EndpointSpec::leaf())]),
        )]);
        let tree = tree_for(&spec);
        bind(&tree, "profile.get", json!(1));

        let err = run(&tree, json!({"profile": null})).await.unwrap_err();
        assert_eq!(err.code(), manifold_core::errors::INVALID_ARGUMENTS);
    }

    #[tokio::test]
    async fn keys_process_in_input_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let spec = EndpointSpec::branch([
            ("alpha", EndpointSpec::leaf()),
            ("beta", EndpointSpec::leaf()),
        ]);
        let tree = tree_for(&spec);
        for name in ["alpha", "beta"] {
            let order = Arc::clone(&order);
            tree.node_at(name)
                .unwrap()
                .chain()
                .append_operation(
                    name,
                    operation_fn(move |_, _| {
                        order.lock().push(name);
                        Ok(json!(null))
                    }),
                )
                .unwrap();
        }

        // Input declares beta before alpha; processing must follow the input.
        let input: Value = serde_json::from_str(r#"{"beta": 1, "alpha": 2}"#).unwrap();
        let _ = run(&tree, input).await.unwrap();
        assert_eq!(*order.lock(), vec!["beta", "alpha"]);
    }

    #[tokio::test]
    async fn error_on_one_key_aborts_the_rest() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let spec = EndpointSpec::branch([
            ("first", EndpointSpec::leaf()),
            ("second", EndpointSpec::leaf()),
        ]);
        let tree = tree_for(&spec);

        {
            let order = Arc::clone(&order);
            tree.node_at("first")
                .unwrap()
                .chain()
                .append_operation(
                    "first",
                    operation_fn(move |_, _| {
                        order.lock().push("first");
                        Err(DispatchError::internal("first failed"))
                    }),
                )
                .unwrap();
        }
        {
            let order = Arc::clone(&order);
            tree.node_at("second")
                .unwrap()
                .chain()
                .append_operation(
                    "second",
                    operation_fn(move |_, _| {
                        order.lock().push("second");
                        Ok(json!(null))
                    }),
                )
                .unwrap();
        }

        let input: Value = serde_json::from_str(r#"{"first": 1, "second": 2}"#).unwrap();
        let err = run(&tree, input).await.unwrap_err();
        assert_eq!(err.to_string(), "first failed");
        assert_eq!(*order.lock(), vec!["first"]);
    }

    #[tokio::test]
    async fn branch_chain_steps_are_inherited_by_leaves() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let spec = EndpointSpec::branch([(
            "api",
            EndpointSpec::branch([("op", EndpointSpec::leaf())]),
        )]);
        let tree = tree_for(&spec);

        {
            let seen = Arc::clone(&seen);
            tree.node_at("api")
                .unwrap()
                .chain()
                .append_seeder(
                    "branch-seed",
                    crate::step::seeder_fn(move |_| {
                        seen.lock().push("branch");
                        Ok(())
                    }),
                )
                .unwrap();
        }
        {
            let seen = Arc::clone(&seen);
            tree.node_at("api.op")
                .unwrap()
                .chain()
                .append_operation(
                    "api.op",
                    operation_fn(move |_, _| {
                        seen.lock().push("leaf");
                        Ok(json!("done"))
                    }),
                )
                .unwrap();
        }

        let result = run(&tree, json!({"api": {"op": {}}})).await.unwrap();
        assert_eq!(result, json!({"api": {"op": "done"}}));
        assert_eq!(*seen.lock(), vec!["branch", "leaf"]);
    }

    #[tokio::test]
    async fn skip_parents_bypasses_ancestor_chains() {
        let ancestor_calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let spec = EndpointSpec::branch([(
            "api",
            EndpointSpec::branch([
                ("guarded", EndpointSpec::leaf()),
                ("open", EndpointSpec::leaf()),
            ]),
        )]);
        let tree = tree_for(&spec);

        {
            let calls = Arc::clone(&ancestor_calls);
            tree.node_at("api")
                .unwrap()
                .chain()
                .append_seeder(
                    "count",
                    crate::step::seeder_fn(move |_| {
                        let _ = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        Ok(())
                    }),
                )
                .unwrap();
        }
        bind(&tree, "api.guarded", json!("g"));
        bind(&tree, "api.open", json!("o"));
        tree.node_at("api.open")
            .unwrap()
            .as_leaf()
            .unwrap()
            .set_skip_parents(true);

        let result = run(&tree, json!({"api": {"guarded": 1, "open": 2}}))
            .await
            .unwrap();
        assert_eq!(result, json!({"api": {"guarded": "g", "open": "o"}}));
        // Only the non-detached sibling ran the ancestor step.
        assert_eq!(ancestor_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_leaf_result_has_no_extra_keys() {
        let spec = EndpointSpec::branch([("foo", EndpointSpec::leaf())]);
        let tree = tree_for(&spec);
        bind(&tree, "foo", json!(2));
        let result = run(&tree, json!({"foo": 1})).await.unwrap();
        assert_eq!(result, json!({"foo": 2}));
    }
}
