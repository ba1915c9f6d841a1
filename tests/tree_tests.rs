use debug_console::tree::{chunk_size_for, refresh, resolve, set_value};
use debug_console::{
    EvaluateContext, EvaluateResponse, NodeKind, ProtocolClient, ProtocolError,
    SetVariableResponse, Variable, VariablesArguments, VariablesFilter, VariableTree,
};
use pretty_assertions::assert_eq;
use std::sync::Mutex;

type VariablesResponder =
    Box<dyn Fn(&VariablesArguments) -> Result<Vec<Variable>, ProtocolError> + Send + Sync>;

// Scripted adapter endpoint that records every request it serves.
struct MockClient {
    variables_log: Mutex<Vec<VariablesArguments>>,
    set_log: Mutex<Vec<(u32, String, String)>>,
    variables: VariablesResponder,
    set_result: Box<dyn Fn() -> Result<SetVariableResponse, ProtocolError> + Send + Sync>,
}

impl MockClient {
    fn with_variables(
        f: impl Fn(&VariablesArguments) -> Result<Vec<Variable>, ProtocolError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            variables_log: Mutex::new(Vec::new()),
            set_log: Mutex::new(Vec::new()),
            variables: Box::new(f),
            set_result: Box::new(|| Err(ProtocolError::request("setVariable", "not scripted"))),
        }
    }

    fn with_set_result(
        mut self,
        f: impl Fn() -> Result<SetVariableResponse, ProtocolError> + Send + Sync + 'static,
    ) -> Self {
        self.set_result = Box::new(f);
        self
    }

    fn requests(&self) -> Vec<VariablesArguments> {
        self.variables_log.lock().unwrap().clone()
    }
}

impl ProtocolClient for MockClient {
    fn variables(&self, args: &VariablesArguments) -> Result<Vec<Variable>, ProtocolError> {
        self.variables_log.lock().unwrap().push(args.clone());
        (self.variables)(args)
    }

    fn evaluate(
        &self,
        _expression: &str,
        _context: EvaluateContext,
    ) -> Result<EvaluateResponse, ProtocolError> {
        Err(ProtocolError::request("evaluate", "not scripted"))
    }

    fn set_variable(
        &self,
        variables_reference: u32,
        name: &str,
        value: &str,
    ) -> Result<SetVariableResponse, ProtocolError> {
        self.set_log
            .lock()
            .unwrap()
            .push((variables_reference, name.to_string(), value.to_string()));
        (self.set_result)()
    }
}

fn var(name: &str, value: &str, reference: u32) -> Variable {
    Variable {
        name: name.to_string(),
        value: value.to_string(),
        ty: None,
        variables_reference: reference,
        named_variables: None,
        indexed_variables: None,
        source: None,
        line: None,
    }
}

#[cfg(test)]
mod chunking_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chunk_size_grows_by_factor_100() {
        assert_eq!(chunk_size_for(1), 100);
        assert_eq!(chunk_size_for(100), 100);
        assert_eq!(chunk_size_for(10_000), 100);
        assert_eq!(chunk_size_for(10_001), 10_000);
        assert_eq!(chunk_size_for(1_000_000), 10_000);
        assert_eq!(chunk_size_for(1_000_001), 1_000_000);
    }

    #[test]
    fn chunk_size_saturates_for_counts_near_u64_max() {
        assert_eq!(
            chunk_size_for(1_000_000_000_000_000_000),
            10_000_000_000_000_000,
            "10^18 still fits 100 buckets of 10^16"
        );
        assert_eq!(
            chunk_size_for(1_000_000_000_000_000_001),
            1_000_000_000_000_000_000,
            "one past 10^18 moves to the widest chunk"
        );
        assert_eq!(
            chunk_size_for(u64::MAX),
            1_000_000_000_000_000_000,
            "the widest representable count must not wrap the chunk width"
        );
    }

    #[test]
    fn small_indexed_range_fetches_directly() {
        let client = MockClient::with_variables(|args| {
            assert_eq!(args.filter, Some(VariablesFilter::Indexed));
            Ok(vec![var("0", "a", 0), var("1", "b", 0)])
        });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 7, 0, 2);

        let children = resolve(&mut tree, scope, &client);
        assert_eq!(children.len(), 2);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].start, Some(0));
        assert_eq!(requests[0].count, Some(2));
    }

    #[test]
    fn oversized_range_synthesizes_virtual_buckets() {
        let client = MockClient::with_variables(|_| panic!("no fetch expected"));
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 7, 0, 250);

        let children = resolve(&mut tree, scope, &client);
        assert_eq!(children.len(), 3, "ceil(250 / 100) buckets");

        let names: Vec<String> = children
            .iter()
            .map(|id| tree.node(*id).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["[0..99]", "[100..199]", "[200..249]"]);
        assert!(client.requests().is_empty(), "buckets defer all fetching");
    }

    #[test]
    fn buckets_nest_for_very_large_collections() {
        let client = MockClient::with_variables(|_| panic!("no fetch expected"));
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 7, 0, 20_000);

        let buckets = resolve(&mut tree, scope, &client);
        assert_eq!(buckets.len(), 2, "chunk size 10_000 over 20_000 items");

        // Expanding a bucket re-applies the algorithm to its slice.
        let inner = resolve(&mut tree, buckets[0], &client);
        assert_eq!(inner.len(), 100, "10_000 items split into 100 buckets");
        let first = tree.node(inner[0]).unwrap();
        assert_eq!(first.name, "[0..99]");
        let last = tree.node(inner[99]).unwrap();
        assert_eq!(last.name, "[9900..9999]");
    }

    #[test]
    fn bucket_fetch_uses_its_own_slice() {
        let client = MockClient::with_variables(|args| {
            let start = args.start.unwrap();
            let count = args.count.unwrap();
            Ok((start..start + count)
                .map(|i| var(&i.to_string(), "x", 0))
                .collect())
        });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 7, 0, 150);

        let buckets = resolve(&mut tree, scope, &client);
        assert_eq!(buckets.len(), 2);

        let tail = resolve(&mut tree, buckets[1], &client);
        assert_eq!(tail.len(), 50);
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].start, Some(100));
        assert_eq!(requests[0].count, Some(50));
    }
}

#[cfg(test)]
mod resolve_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn named_variables_come_before_indexed() {
        let client = MockClient::with_variables(|args| match args.filter {
            Some(VariablesFilter::Named) => Ok(vec![var("length", "2", 0)]),
            Some(VariablesFilter::Indexed) => Ok(vec![var("0", "a", 0), var("1", "b", 0)]),
            None => panic!("expected a filtered request"),
        });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 3, 1, 2);

        let children = resolve(&mut tree, scope, &client);
        let names: Vec<String> = children
            .iter()
            .map(|id| tree.node(*id).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["length", "0", "1"]);

        let requests = client.requests();
        assert_eq!(requests[0].filter, Some(VariablesFilter::Named));
        assert_eq!(requests[1].filter, Some(VariablesFilter::Indexed));
    }

    #[test]
    fn missing_counts_trigger_one_unfiltered_fetch() {
        let client = MockClient::with_variables(|args| {
            assert_eq!(args.filter, None);
            Ok(vec![var("x", "1", 0)])
        });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 9, 0, 0);

        let children = resolve(&mut tree, scope, &client);
        assert_eq!(children.len(), 1);
        assert_eq!(client.requests().len(), 1);
    }

    #[test]
    fn leaf_resolves_empty_without_a_request() {
        let client = MockClient::with_variables(|_| panic!("leaves never fetch"));
        let mut tree = VariableTree::new();
        let leaf = tree.new_scope("Empty", 0, 0, 0);

        assert!(resolve(&mut tree, leaf, &client).is_empty());
        assert!(client.requests().is_empty());
    }

    #[test]
    fn duplicate_composite_names_keep_only_the_first() {
        let client = MockClient::with_variables(|_| {
            Ok(vec![var("x", "outer", 10), var("x", "shadowed", 11)])
        });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);

        let children = resolve(&mut tree, scope, &client);
        assert_eq!(children.len(), 1, "second composite 'x' is dropped");
        assert_eq!(tree.node(children[0]).unwrap().value, "outer");
    }

    #[test]
    fn duplicate_leaf_names_are_all_kept() {
        let client =
            MockClient::with_variables(|_| Ok(vec![var("x", "1", 0), var("x", "2", 0)]));
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);

        let children = resolve(&mut tree, scope, &client);
        assert_eq!(children.len(), 2, "dedup only applies to composites");
    }

    #[test]
    fn second_resolve_reuses_the_cache() {
        let client = MockClient::with_variables(|_| Ok(vec![var("x", "1", 0)]));
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);

        let first = resolve(&mut tree, scope, &client);
        let second = resolve(&mut tree, scope, &client);
        assert_eq!(first, second);
        assert_eq!(client.requests().len(), 1, "children fetch at most once");
    }

    #[test]
    fn failed_fetch_caches_a_single_error_child() {
        let client = MockClient::with_variables(|_| {
            Err(ProtocolError::request("variables", "process exited"))
        });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);

        let children = resolve(&mut tree, scope, &client);
        assert_eq!(children.len(), 1);
        let child = tree.node(children[0]).unwrap();
        assert!(matches!(child.kind, NodeKind::Error { .. }));
        assert!(child.value.contains("process exited"));

        // Re-expanding without a refresh reuses the cached failure.
        let again = resolve(&mut tree, scope, &client);
        assert_eq!(again, children);
        assert_eq!(client.requests().len(), 1, "no automatic retry");
    }

    #[test]
    fn refresh_retries_a_cached_failure() {
        let attempts = Mutex::new(0u32);
        let client = MockClient::with_variables(move |_| {
            let mut n = attempts.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Err(ProtocolError::request("variables", "not stopped"))
            } else {
                Ok(vec![var("x", "1", 0)])
            }
        });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);

        let failed = resolve(&mut tree, scope, &client);
        assert!(matches!(
            tree.node(failed[0]).unwrap().kind,
            NodeKind::Error { .. }
        ));

        let retried = refresh(&mut tree, scope, &client);
        assert_eq!(retried.len(), 1);
        assert_eq!(tree.node(retried[0]).unwrap().name, "x");
        assert_eq!(client.requests().len(), 2);
    }

    #[test]
    fn invalidate_reclaims_the_subtree() {
        let client = MockClient::with_variables(|_| {
            Ok(vec![var("a", "1", 0), var("b", "2", 0), var("c", "3", 0)])
        });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);
        resolve(&mut tree, scope, &client);
        assert_eq!(tree.len(), 4);

        tree.invalidate(scope);
        assert_eq!(tree.len(), 1, "children go back to the free list");
    }

    #[test]
    fn paths_walk_parent_links_to_the_root() {
        let client = MockClient::with_variables(|_| Ok(vec![var("inner", "{}", 6)]));
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);
        let children = resolve(&mut tree, scope, &client);

        let path = tree.path_of(children[0]);
        assert_eq!(path.depth(), 2);
        assert_eq!(path.ids()[0], scope);
        assert_eq!(path.target(), Some(children[0]));
        assert!(tree.path_of(scope).is_prefix_of(&path));
    }
}

#[cfg(test)]
mod set_value_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn success_rewrites_the_node_in_place() {
        let client = MockClient::with_variables(|_| Ok(vec![var("count", "1", 0)]))
            .with_set_result(|| {
                Ok(SetVariableResponse {
                    value: "42".to_string(),
                    ty: Some("int".to_string()),
                    variables_reference: 0,
                    named_variables: None,
                    indexed_variables: None,
                })
            });
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);
        let children = resolve(&mut tree, scope, &client);

        set_value(&mut tree, children[0], "42", &client).expect("setVariable should succeed");

        let node = tree.node(children[0]).unwrap();
        assert_eq!(node.value, "42");
        assert_eq!(node.ty.as_deref(), Some("int"));

        let set_log = client.set_log.lock().unwrap().clone();
        assert_eq!(
            set_log,
            vec![(5, "count".to_string(), "42".to_string())],
            "request is scoped to the parent's reference and the node's name"
        );
    }

    #[test]
    fn failure_leaves_the_displayed_value_intact() {
        let client = MockClient::with_variables(|_| Ok(vec![var("count", "1", 0)]))
            .with_set_result(|| Err(ProtocolError::request("setVariable", "read-only")));
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);
        let children = resolve(&mut tree, scope, &client);

        let err = set_value(&mut tree, children[0], "42", &client)
            .expect_err("setVariable should fail");
        assert!(err.to_string().contains("read-only"));
        assert_eq!(tree.node(children[0]).unwrap().value, "1");
    }

    #[test]
    fn root_nodes_cannot_be_set() {
        let client = MockClient::with_variables(|_| Ok(vec![]));
        let mut tree = VariableTree::new();
        let scope = tree.new_scope("Locals", 5, 0, 0);

        assert!(set_value(&mut tree, scope, "42", &client).is_err());
        assert!(client.set_log.lock().unwrap().is_empty());
    }
}
