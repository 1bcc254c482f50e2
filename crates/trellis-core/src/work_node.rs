//! Work nodes, their arena storage, and the double-buffer helpers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::descriptor::{Component, Descriptor, Element, ElementKind, Key, Props};
use crate::error::RenderError;
use crate::hooks::{Effect, Hook};
use crate::host::HostId;

/// Generational handle to a work node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkTag {
    Root,
    HostElement,
    HostText,
    Fragment,
    FunctionComponent,
    ClassComponent,
    ContextProvider,
    ContextConsumer,
    Memoized,
}

impl WorkTag {
    /// Nodes that own a host node of their own.
    pub fn is_host(self) -> bool {
        matches!(self, WorkTag::HostElement | WorkTag::HostText)
    }

    /// Nodes whose host node can contain other host nodes.
    pub(crate) fn is_host_parent(self) -> bool {
        matches!(self, WorkTag::HostElement | WorkTag::Root)
    }
}

bitflags! {
    /// Side effects recorded on a work node during rendering.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct EffectFlags: u32 {
        const PLACEMENT = 0b0000_0000_0010;
        const UPDATE = 0b0000_0000_0100;
        const CHILD_DELETION = 0b0000_0000_1000;
        const PASSIVE = 0b1000_0000_0000;
    }
}

impl EffectFlags {
    pub(crate) const MUTATION_MASK: Self = Self::PLACEMENT
        .union(Self::UPDATE)
        .union(Self::CHILD_DELETION);
    pub(crate) const LAYOUT_MASK: Self = Self::UPDATE.union(Self::PASSIVE);
}

pub(crate) type ComponentInstance = Rc<RefCell<Box<dyn Component>>>;

#[derive(Clone, Default)]
pub(crate) enum StateNode {
    #[default]
    None,
    Host(HostId),
    Instance(ComponentInstance),
}

#[derive(Clone, Default)]
pub(crate) enum MemoizedState {
    #[default]
    None,
    Root(Rc<Descriptor>),
    Hooks(Vec<Hook>),
}

impl MemoizedState {
    pub(crate) fn hooks(&self) -> Option<&[Hook]> {
        match self {
            MemoizedState::Hooks(hooks) => Some(hooks),
            _ => None,
        }
    }
}

/// A pending host property change computed in the complete phase.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PropChange {
    Set(Rc<str>, crate::Value),
    Remove(Rc<str>),
    Text(Rc<str>),
}

pub(crate) struct WorkNode {
    pub(crate) tag: WorkTag,
    pub(crate) key: Option<Key>,
    pub(crate) element_type: Option<ElementKind>,
    pub(crate) state_node: StateNode,
    pub(crate) parent: Option<NodeId>,
    pub(crate) child: Option<NodeId>,
    pub(crate) sibling: Option<NodeId>,
    pub(crate) index: usize,
    pub(crate) pending_props: Rc<Props>,
    pub(crate) memoized_props: Option<Rc<Props>>,
    pub(crate) memoized_state: MemoizedState,
    pub(crate) effects: Vec<Rc<Effect>>,
    pub(crate) update_payload: Vec<PropChange>,
    pub(crate) flags: EffectFlags,
    pub(crate) subtree_flags: EffectFlags,
    pub(crate) deletions: Vec<NodeId>,
    pub(crate) alternate: Option<NodeId>,
    pub(crate) has_pending_update: bool,
}

impl WorkNode {
    pub(crate) fn new(tag: WorkTag, pending_props: Rc<Props>, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            state_node: StateNode::None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: None,
            memoized_state: MemoizedState::None,
            effects: Vec::new(),
            update_payload: Vec::new(),
            flags: EffectFlags::empty(),
            subtree_flags: EffectFlags::empty(),
            deletions: Vec::new(),
            alternate: None,
            has_pending_update: false,
        }
    }

    pub(crate) fn host_handle(&self) -> Option<HostId> {
        match self.state_node {
            StateNode::Host(handle) => Some(handle),
            _ => None,
        }
    }
}

struct ArenaSlot {
    generation: u32,
    node: Option<WorkNode>,
}

/// Generational storage for work nodes of both tree generations.
#[derive(Default)]
pub(crate) struct NodeArena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
    live: usize,
}

impl NodeArena {
    pub(crate) fn insert(&mut self, node: WorkNode) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(ArenaSlot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.node.is_some())
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&WorkNode, RenderError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(RenderError::MissingNode { id })
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut WorkNode, RenderError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(RenderError::MissingNode { id })
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<WorkNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn children(&self, parent: NodeId) -> Result<Vec<NodeId>, RenderError> {
        let mut children = Vec::new();
        let mut cursor = self.get(parent)?.child;
        while let Some(child) = cursor {
            children.push(child);
            cursor = self.get(child)?.sibling;
        }
        Ok(children)
    }
}

/// Returns the other-generation twin of `current`, reusing an existing
/// alternate when there is one. The twin is detached from its siblings'
/// parent; callers relink it.
pub(crate) fn create_work_in_progress(
    arena: &mut NodeArena,
    current: NodeId,
    pending_props: Rc<Props>,
) -> Result<NodeId, RenderError> {
    let source = arena.get(current)?;
    let tag = source.tag;
    let key = source.key.clone();
    let element_type = source.element_type.clone();
    let state_node = source.state_node.clone();
    let child = source.child;
    let sibling = source.sibling;
    let index = source.index;
    let memoized_props = source.memoized_props.clone();
    let memoized_state = source.memoized_state.clone();
    let has_pending_update = source.has_pending_update;
    let alternate = source.alternate.filter(|id| arena.contains(*id));

    let wip = match alternate {
        Some(wip) => {
            let node = arena.get_mut(wip)?;
            node.pending_props = pending_props;
            node.flags = EffectFlags::empty();
            node.subtree_flags = EffectFlags::empty();
            node.deletions.clear();
            node.effects.clear();
            node.update_payload.clear();
            wip
        }
        None => {
            let mut node = WorkNode::new(tag, pending_props, key);
            node.alternate = Some(current);
            let wip = arena.insert(node);
            arena.get_mut(current)?.alternate = Some(wip);
            wip
        }
    };

    let node = arena.get_mut(wip)?;
    node.element_type = element_type;
    node.state_node = state_node;
    node.child = child;
    node.sibling = sibling;
    node.index = index;
    node.memoized_props = memoized_props;
    node.memoized_state = memoized_state;
    node.has_pending_update = has_pending_update;
    Ok(wip)
}

pub(crate) fn create_from_element(arena: &mut NodeArena, element: &Element) -> NodeId {
    let mut node = WorkNode::new(
        element.kind.tag(),
        element.props.clone(),
        element.key.clone(),
    );
    node.element_type = Some(element.kind.clone());
    arena.insert(node)
}

pub(crate) fn create_from_text(arena: &mut NodeArena, text: Rc<str>) -> NodeId {
    arena.insert(WorkNode::new(
        WorkTag::HostText,
        Rc::new(Props::from_text(text)),
        None,
    ))
}

pub(crate) fn create_fragment(
    arena: &mut NodeArena,
    items: &[Descriptor],
    key: Option<Key>,
) -> NodeId {
    let mut node = WorkNode::new(WorkTag::Fragment, fragment_props(items), key);
    node.element_type = Some(ElementKind::Fragment);
    arena.insert(node)
}

pub(crate) fn fragment_props(items: &[Descriptor]) -> Rc<Props> {
    Rc::new(Props::with_children(Descriptor::List(items.to_vec())))
}

pub(crate) fn create_root(arena: &mut NodeArena, container: HostId) -> NodeId {
    let mut node = WorkNode::new(WorkTag::Root, Rc::new(Props::default()), None);
    node.state_node = StateNode::Host(container);
    arena.insert(node)
}
