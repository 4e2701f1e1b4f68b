use thiserror::Error;

use crate::vnode::NodeId;

pub type TreeResult<T> = Result<T, TreeError>;

/// Misuse of the node arena. These are programming errors in the code that
/// assembles a tree, reported instead of corrupting links.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Node {node:?} does not exist in this arena")]
    UnknownNode { node: NodeId },

    #[error("Node {node:?} is already attached to a parent or siblings")]
    AlreadyAttached { node: NodeId },

    #[error("Node {node:?} cannot be attached to itself")]
    SelfAttach { node: NodeId },

    #[error("Node {node:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, node: NodeId },

    #[error("Node {node:?} delegates to a component and cannot have children")]
    ComponentWithChildren { node: NodeId },
}
