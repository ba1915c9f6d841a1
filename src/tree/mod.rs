mod node;
mod resolver;

pub use node::{ChildrenState, Node, NodeId, NodeKind, TreePath, VariableTree};
pub use resolver::{chunk_size_for, refresh, resolve, set_value};
