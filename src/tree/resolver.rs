use super::node::{ChildrenState, NodeId, NodeKind, VariableTree};
use crate::protocol::{ProtocolClient, ProtocolError, VariablesArguments};
use std::collections::HashSet;

/// Indexed fetches never exceed one chunk; a range wider than the
/// chunk size is split into at most 100 virtual buckets.
const BASE_CHUNK_SIZE: u64 = 100;

/// Deterministic chunk size: grows by a factor of 100 until the whole
/// range fits in at most 100 buckets.
pub fn chunk_size_for(indexed_count: u64) -> u64 {
    let mut chunk = BASE_CHUNK_SIZE;
    // Counts near u64::MAX are wire-valid; saturate instead of
    // overflowing once the next step would wrap.
    while let Some(capacity) = chunk.checked_mul(BASE_CHUNK_SIZE) {
        if indexed_count <= capacity {
            break;
        }
        chunk = capacity;
    }
    chunk
}

/// Resolve the children of `id`, fetching from the adapter at most
/// once. Returns the (possibly cached) ordered child list. A failed
/// fetch caches a single error pseudo-entry instead and is not
/// retried until `refresh`.
pub fn resolve(tree: &mut VariableTree, id: NodeId, client: &dyn ProtocolClient) -> Vec<NodeId> {
    let (kind, reference, named_count, indexed_count) = match tree.node(id) {
        Some(node) => {
            if let Some(cached) = node.children() {
                return cached.to_vec();
            }
            if node.is_leaf() || matches!(node.kind, NodeKind::Error { .. }) {
                // Leaves resolve to nothing without a request.
                if let Some(node) = tree.node_mut(id) {
                    node.children = ChildrenState::Resolved(Vec::new());
                }
                return Vec::new();
            }
            (
                node.kind.clone(),
                node.reference,
                node.named_count,
                node.indexed_count,
            )
        }
        None => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let outcome = match kind {
        NodeKind::Range { start, count } => resolve_indexed(
            tree, id, reference, start, count, client, &mut seen, &mut out,
        ),
        _ => {
            if named_count == 0 && indexed_count == 0 {
                // Adapters may omit both counts; fetch everything in
                // one unfiltered request.
                fetch_and_append(
                    tree,
                    id,
                    &VariablesArguments::all(reference),
                    client,
                    &mut seen,
                    &mut out,
                )
            } else {
                // Named variables always come before indexed ones.
                let mut r = Ok(());
                if named_count > 0 {
                    r = fetch_and_append(
                        tree,
                        id,
                        &VariablesArguments::named(reference),
                        client,
                        &mut seen,
                        &mut out,
                    );
                }
                if r.is_ok() && indexed_count > 0 {
                    r = resolve_indexed(
                        tree,
                        id,
                        reference,
                        0,
                        indexed_count,
                        client,
                        &mut seen,
                        &mut out,
                    );
                }
                r
            }
        }
    };

    let children = match outcome {
        Ok(()) => out,
        Err(err) => {
            tracing::error!(node = ?id, error = %err, "variables fetch failed");
            // Discard partial results; the node's only child becomes
            // the inline error entry.
            for child in out {
                tree.remove(child);
            }
            vec![tree.insert_error(id, &err.to_string())]
        }
    };

    if let Some(node) = tree.node_mut(id) {
        node.children = ChildrenState::Resolved(children.clone());
    }
    children
}

/// Invalidate the cached children and resolve again. This is the only
/// way a cached failure gets retried.
pub fn refresh(tree: &mut VariableTree, id: NodeId, client: &dyn ProtocolClient) -> Vec<NodeId> {
    tree.invalidate(id);
    resolve(tree, id, client)
}

#[allow(clippy::too_many_arguments)]
fn resolve_indexed(
    tree: &mut VariableTree,
    parent: NodeId,
    reference: u32,
    start: u64,
    count: u64,
    client: &dyn ProtocolClient,
    seen: &mut HashSet<String>,
    out: &mut Vec<NodeId>,
) -> Result<(), ProtocolError> {
    let chunk = chunk_size_for(count);
    if count > chunk {
        // Synthesize virtual buckets instead of fetching an unbounded
        // range. Each bucket re-enters this algorithm on expansion.
        let mut offset = 0;
        while offset < count {
            let bucket = chunk.min(count - offset);
            out.push(tree.insert_range(parent, reference, start + offset, bucket));
            offset += bucket;
        }
        Ok(())
    } else {
        fetch_and_append(
            tree,
            parent,
            &VariablesArguments::indexed(reference, start, count),
            client,
            seen,
            out,
        )
    }
}

fn fetch_and_append(
    tree: &mut VariableTree,
    parent: NodeId,
    args: &VariablesArguments,
    client: &dyn ProtocolClient,
    seen: &mut HashSet<String>,
    out: &mut Vec<NodeId>,
) -> Result<(), ProtocolError> {
    let items = client.variables(args)?;
    tracing::debug!(
        reference = args.variables_reference,
        filter = ?args.filter,
        count = items.len(),
        "variables fetched"
    );
    for item in &items {
        // Same-named composites: only the first occurrence survives,
        // so an identically-named shadowed binding expands once.
        if item.variables_reference > 0 && !seen.insert(item.name.clone()) {
            tracing::debug!(name = %item.name, "dropping duplicate composite child");
            continue;
        }
        out.push(tree.insert_variable(parent, item));
    }
    Ok(())
}

/// Send a `setVariable` request scoped to the parent's reference and
/// this node's name. Success rewrites the node in place; the caller
/// is expected to enqueue a refresh of the parent path. Failure
/// leaves the displayed value untouched and goes back to the caller.
pub fn set_value(
    tree: &mut VariableTree,
    id: NodeId,
    new_value: &str,
    client: &dyn ProtocolClient,
) -> Result<(), ProtocolError> {
    let (parent_reference, name) = {
        let node = tree
            .node(id)
            .ok_or_else(|| ProtocolError::request("setVariable", "node no longer exists"))?;
        let parent = node
            .parent()
            .and_then(|p| tree.node(p))
            .ok_or_else(|| ProtocolError::request("setVariable", "node has no parent scope"))?;
        (parent.reference, node.name.clone())
    };

    let response = client.set_variable(parent_reference, &name, new_value)?;

    if let Some(node) = tree.node_mut(id) {
        node.value = response.value;
        if response.ty.is_some() {
            node.ty = response.ty;
        }
        node.reference = response.variables_reference;
        node.named_count = response.named_variables.unwrap_or(0);
        node.indexed_count = response.indexed_variables.unwrap_or(0);
    }
    // Old children may describe the previous value.
    tree.invalidate(id);
    Ok(())
}
