use thiserror::Error;

use crate::context::ContextId;
use crate::host::HostId;
use crate::work_node::{NodeId, WorkTag};

/// Failures reported by a [`Host`](crate::Host) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host node {id} is missing")]
    Missing { id: HostId },
    #[error("host node {child} is not a child of {parent}")]
    NotAChild { parent: HostId, child: HostId },
}

/// Errors raised while rendering or committing a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("work node {id} is missing")]
    MissingNode { id: NodeId },
    #[error("work node {id} is tagged {tag:?} but carries an incompatible element type")]
    UnknownKind { id: NodeId, tag: WorkTag },
    #[error("expected to find a host parent above work node {id}")]
    NoHostParent { id: NodeId },
    #[error("work node {id} has no host handle")]
    MissingHostHandle { id: NodeId },
    #[error("context stack mismatch: expected {expected}, found {found:?}")]
    ContextStackMismatch {
        expected: ContextId,
        found: Option<ContextId>,
    },
    #[error("gave up after {limit} nested updates")]
    NestedUpdateLimit { limit: usize },
    #[error(transparent)]
    Host(#[from] HostError),
}
