//! Read-only snapshots of the committed tree, for tests and debugging.

use crate::descriptor::ElementKind;
use crate::error::RenderError;
use crate::hooks::Hook;
use crate::host::HostId;
use crate::work_node::{EffectFlags, NodeArena, NodeId, WorkTag};

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub tag: WorkTag,
    pub name: Option<String>,
    pub key: Option<String>,
    pub index: usize,
    pub flags: EffectFlags,
    pub hook_count: usize,
    /// Effect hooks among `hook_count`.
    pub effect_count: usize,
    pub host: Option<HostId>,
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Pre-order search.
    pub fn find(&self, predicate: &dyn Fn(&NodeSnapshot) -> bool) -> Option<&NodeSnapshot> {
        if predicate(self) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(predicate))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&NodeSnapshot> {
        self.find(&|node| node.name.as_deref() == Some(name))
    }

    pub fn child_keys(&self) -> Vec<Option<&str>> {
        self.children.iter().map(|child| child.key.as_deref()).collect()
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NodeSnapshot::count).sum::<usize>()
    }
}

pub(crate) fn snapshot(arena: &NodeArena, id: NodeId) -> Result<NodeSnapshot, RenderError> {
    let node = arena.get(id)?;
    let name = match (&node.element_type, node.tag) {
        (Some(ElementKind::Fragment), _) | (None, WorkTag::Fragment) => None,
        (Some(kind), _) => Some(kind.name().to_owned()),
        (None, _) => None,
    };
    let hooks = node.memoized_state.hooks().unwrap_or_default();
    let children = arena
        .children(id)?
        .into_iter()
        .map(|child| snapshot(arena, child))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(NodeSnapshot {
        tag: node.tag,
        name,
        key: node.key.as_deref().map(str::to_owned),
        index: node.index,
        flags: node.flags,
        hook_count: hooks.len(),
        effect_count: hooks
            .iter()
            .filter(|hook| matches!(hook, Hook::Effect { .. }))
            .count(),
        host: node.host_handle(),
        children,
    })
}
