use crate::protocol::{EvaluateResponse, Source, Variable};

/// Opaque handle into the tree arena. Identity lives here so parent
/// back-references never carry ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Root-to-node sequence of ids. Depth is the length; an ancestor's
/// path is a prefix of every descendant's path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreePath(Vec<NodeId>);

impl TreePath {
    pub fn new(ids: Vec<NodeId>) -> Self {
        Self(ids)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn target(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    pub fn is_prefix_of(&self, other: &TreePath) -> bool {
        other.0.starts_with(&self.0)
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.0
    }
}

/// Closed set of node kinds sharing one resolution contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Top-level scope (Locals, Globals, ...).
    Scope,
    /// Ordinary variable fetched from the adapter.
    Variable,
    /// Synthetic `[start..start+count-1]` bucket over an indexed
    /// collection; forwards resolution, has no value of its own.
    Range { start: u64, count: u64 },
    /// Result of a console `evaluate`.
    Evaluation { expression: String },
    /// Inline resolution-failure pseudo-entry.
    Error { message: String },
}

/// Lazily-resolved children cache. `Unresolved` means no fetch has
/// been attempted since creation or the last invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildrenState {
    Unresolved,
    Resolved(Vec<NodeId>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub name: String,
    pub value: String,
    pub ty: Option<String>,
    /// Adapter reference handle; 0 marks a leaf.
    pub reference: u32,
    pub named_count: u64,
    pub indexed_count: u64,
    pub source: Option<Source>,
    pub line: Option<u32>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: ChildrenState,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.reference == 0 && !matches!(self.kind, NodeKind::Range { .. })
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Resolved children, if a fetch has happened. `None` only while
    /// `Unresolved`; a cached failure still reports its error child.
    pub fn children(&self) -> Option<&[NodeId]> {
        match &self.children {
            ChildrenState::Unresolved => None,
            ChildrenState::Resolved(ids) => Some(ids),
        }
    }
}

/// Arena owning every node. Slots freed by invalidation are recycled
/// through a free list; a `NodeId` is only valid until its subtree is
/// invalidated.
#[derive(Default)]
pub struct VariableTree {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
}

impl VariableTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(node);
            NodeId(index)
        } else {
            self.slots.push(Some(node));
            NodeId((self.slots.len() - 1) as u32)
        }
    }

    /// Create a root scope node.
    pub fn new_scope(&mut self, name: &str, reference: u32, named: u64, indexed: u64) -> NodeId {
        self.insert(Node {
            kind: NodeKind::Scope,
            name: name.to_string(),
            value: String::new(),
            ty: None,
            reference,
            named_count: named,
            indexed_count: indexed,
            source: None,
            line: None,
            parent: None,
            children: ChildrenState::Unresolved,
        })
    }

    /// Create a root container for an `output` event that carries a
    /// reference handle. The event text doubles as the display value.
    pub fn new_container(
        &mut self,
        value: &str,
        reference: u32,
        source: Option<Source>,
        line: Option<u32>,
    ) -> NodeId {
        self.insert(Node {
            kind: NodeKind::Variable,
            name: String::new(),
            value: value.to_string(),
            ty: None,
            reference,
            named_count: 0,
            indexed_count: 0,
            source,
            line,
            parent: None,
            children: ChildrenState::Unresolved,
        })
    }

    /// Create a root node for a completed `evaluate` request.
    pub fn new_evaluation(&mut self, expression: &str, response: &EvaluateResponse) -> NodeId {
        self.insert(Node {
            kind: NodeKind::Evaluation {
                expression: expression.to_string(),
            },
            name: expression.to_string(),
            value: response.result.clone(),
            ty: response.ty.clone(),
            reference: response.variables_reference,
            named_count: response.named_variables.unwrap_or(0),
            indexed_count: response.indexed_variables.unwrap_or(0),
            source: None,
            line: None,
            parent: None,
            children: ChildrenState::Unresolved,
        })
    }

    pub(crate) fn insert_variable(&mut self, parent: NodeId, item: &Variable) -> NodeId {
        self.insert(Node {
            kind: NodeKind::Variable,
            name: item.name.clone(),
            value: item.value.clone(),
            ty: item.ty.clone(),
            reference: item.variables_reference,
            named_count: item.named_variables.unwrap_or(0),
            indexed_count: item.indexed_variables.unwrap_or(0),
            source: item.source.clone(),
            line: item.line,
            parent: Some(parent),
            children: ChildrenState::Unresolved,
        })
    }

    pub(crate) fn insert_range(
        &mut self,
        parent: NodeId,
        reference: u32,
        start: u64,
        count: u64,
    ) -> NodeId {
        self.insert(Node {
            kind: NodeKind::Range { start, count },
            name: format!("[{}..{}]", start, start + count - 1),
            value: String::new(),
            ty: None,
            reference,
            named_count: 0,
            indexed_count: count,
            source: None,
            line: None,
            parent: Some(parent),
            children: ChildrenState::Unresolved,
        })
    }

    pub(crate) fn insert_error(&mut self, parent: NodeId, message: &str) -> NodeId {
        self.insert(Node {
            kind: NodeKind::Error {
                message: message.to_string(),
            },
            name: String::new(),
            value: message.to_string(),
            ty: None,
            reference: 0,
            named_count: 0,
            indexed_count: 0,
            source: None,
            line: None,
            parent: Some(parent),
            children: ChildrenState::Unresolved,
        })
    }

    /// Path from the root down to `id`, via non-owning parent lookups.
    pub fn path_of(&self, id: NodeId) -> TreePath {
        let mut ids = vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).and_then(|n| n.parent) {
            ids.push(parent);
            current = parent;
        }
        ids.reverse();
        TreePath::new(ids)
    }

    /// Drop the cached children of `id` so the next resolve re-fetches.
    /// The whole subtree goes back to the free list.
    pub fn invalidate(&mut self, id: NodeId) {
        let children = match self.node_mut(id) {
            Some(node) => {
                std::mem::replace(&mut node.children, ChildrenState::Unresolved)
            }
            None => return,
        };
        let mut stack = match children {
            ChildrenState::Resolved(ids) => ids,
            ChildrenState::Unresolved => return,
        };
        while let Some(child) = stack.pop() {
            if let Some(node) = self.slots.get_mut(child.index()).and_then(|s| s.take()) {
                if let ChildrenState::Resolved(grandchildren) = node.children {
                    stack.extend(grandchildren);
                }
                self.free.push(child.index() as u32);
            }
        }
    }

    /// Remove a root node (and its subtree) from the arena entirely.
    pub fn remove(&mut self, id: NodeId) {
        self.invalidate(id);
        if self.slots.get_mut(id.index()).and_then(|s| s.take()).is_some() {
            self.free.push(id.index() as u32);
        }
    }

    /// Number of live nodes; used by tests to check reclamation.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
