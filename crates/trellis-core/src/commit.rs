//! Commit: apply host mutations for a finished tree, swap generations, and
//! queue lifecycle work.
//!
//! User callbacks (layout effects, class lifecycles) are not invoked here.
//! They are collected into a [`CommitOutcome`] that the caller runs once it
//! no longer holds the root, so callbacks may touch the host or dispatch.

use std::rc::Rc;

use crate::descriptor::Props;
use crate::error::RenderError;
use crate::hooks::{Effect, EffectInstance, EffectTag, Hook};
use crate::host::{Host, HostId};
use crate::work_loop::{ExecutionContext, FiberRoot};
use crate::work_node::{ComponentInstance, EffectFlags, NodeId, PropChange, StateNode, WorkTag};

pub(crate) enum LayoutWork {
    Destroy(Rc<EffectInstance>),
    Create(Rc<Effect>),
    DidMount(ComponentInstance),
    DidUpdate(ComponentInstance, Rc<Props>),
    WillUnmount(ComponentInstance),
}

impl LayoutWork {
    fn run(self) {
        match self {
            LayoutWork::Destroy(instance) => instance.run_destroy(),
            LayoutWork::Create(effect) => effect.run_create(),
            LayoutWork::DidMount(instance) => instance.borrow_mut().component_did_mount(),
            LayoutWork::DidUpdate(instance, previous) => {
                instance.borrow_mut().component_did_update(&previous)
            }
            LayoutWork::WillUnmount(instance) => instance.borrow_mut().component_will_unmount(),
        }
    }
}

#[derive(Default)]
pub(crate) struct CommitOutcome {
    layout: Vec<LayoutWork>,
    pub(crate) passive_pending: bool,
}

impl CommitOutcome {
    /// Runs cleanups and lifecycle callbacks queued by the commit, in order.
    pub(crate) fn run_layout(self) {
        for work in self.layout {
            work.run();
        }
    }
}

/// Passive effect work left behind by commits, flushed in a later task.
#[derive(Default)]
pub(crate) struct PendingPassive {
    unmount: Vec<Rc<EffectInstance>>,
    mount: Vec<Rc<Effect>>,
}

impl PendingPassive {
    pub(crate) fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.mount.is_empty()
    }

    /// All cleanups run before any effect body.
    pub(crate) fn run(self) {
        if self.is_empty() {
            return;
        }
        log::trace!(
            "flushing passive effects: {} unmounts, {} mounts",
            self.unmount.len(),
            self.mount.len()
        );
        for instance in &self.unmount {
            instance.run_destroy();
        }
        for effect in &self.mount {
            effect.run_destroy();
        }
        for effect in &self.mount {
            effect.run_create();
        }
    }
}

impl<H: Host> FiberRoot<H> {
    pub(crate) fn commit_root(&mut self) -> Result<CommitOutcome, RenderError> {
        let Some(finished) = self.finished_work.take() else {
            return Ok(CommitOutcome::default());
        };
        log::debug!("committing {finished}");
        let previous = self.enter(ExecutionContext::COMMIT);
        let mut layout = Vec::new();
        let result = self.commit_passes(finished, &mut layout);
        self.execution_context = previous;
        self.created.clear();
        if let Err(err) = &result {
            log::error!("commit of {finished} failed: {err}");
        }
        result?;
        Ok(CommitOutcome {
            layout,
            passive_pending: !self.pending_passive.is_empty(),
        })
    }

    fn commit_passes(
        &mut self,
        finished: NodeId,
        layout: &mut Vec<LayoutWork>,
    ) -> Result<(), RenderError> {
        self.commit_mutation_effects(finished, layout)?;
        self.current = finished;
        self.commit_layout_effects(finished, layout)
    }

    fn commit_mutation_effects(
        &mut self,
        id: NodeId,
        layout: &mut Vec<LayoutWork>,
    ) -> Result<(), RenderError> {
        let (tag, flags, subtree_flags, deletions) = {
            let node = self.arena.get_mut(id)?;
            (
                node.tag,
                node.flags,
                node.subtree_flags,
                std::mem::take(&mut node.deletions),
            )
        };
        for deleted in deletions {
            self.commit_deletion(id, deleted, layout)?;
        }
        if flags.contains(EffectFlags::UPDATE) {
            match tag {
                WorkTag::HostElement => self.commit_host_update(id)?,
                WorkTag::HostText => self.commit_text_update(id)?,
                WorkTag::FunctionComponent | WorkTag::Memoized => {
                    let node = self.arena.get(id)?;
                    layout.extend(
                        node.effects
                            .iter()
                            .filter(|effect| effect.tag == EffectTag::Layout)
                            .map(|effect| LayoutWork::Destroy(effect.instance.clone())),
                    );
                }
                _ => {}
            }
        }
        if subtree_flags.intersects(EffectFlags::MUTATION_MASK) {
            for child in self.arena.children(id)? {
                self.commit_mutation_effects(child, layout)?;
            }
        }
        if flags.contains(EffectFlags::PLACEMENT) {
            self.commit_placement(id)?;
            self.arena.get_mut(id)?.flags.remove(EffectFlags::PLACEMENT);
        }
        Ok(())
    }

    fn commit_host_update(&mut self, id: NodeId) -> Result<(), RenderError> {
        let node = self.arena.get_mut(id)?;
        let handle = node
            .host_handle()
            .ok_or(RenderError::MissingHostHandle { id })?;
        for change in std::mem::take(&mut node.update_payload) {
            match change {
                PropChange::Set(key, value) => self.host.set_property(handle, &key, Some(&value))?,
                PropChange::Remove(key) => self.host.set_property(handle, &key, None)?,
                PropChange::Text(text) => self.host.set_text_content(handle, &text)?,
            }
        }
        Ok(())
    }

    fn commit_text_update(&mut self, id: NodeId) -> Result<(), RenderError> {
        let node = self.arena.get(id)?;
        let handle = node
            .host_handle()
            .ok_or(RenderError::MissingHostHandle { id })?;
        let text = node.pending_props.text().cloned().unwrap_or_else(|| Rc::from(""));
        self.host.set_text_content(handle, &text)?;
        Ok(())
    }

    /// Nearest host node at or above `from`.
    fn find_host_parent(&self, from: NodeId, origin: NodeId) -> Result<HostId, RenderError> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let node = self.arena.get(id)?;
            if node.tag.is_host_parent() {
                return node
                    .host_handle()
                    .ok_or(RenderError::MissingHostHandle { id });
            }
            cursor = node.parent;
        }
        Err(RenderError::NoHostParent { id: origin })
    }

    /// First host node after `id` in document order that is already mounted.
    fn find_host_sibling(&self, id: NodeId) -> Result<Option<HostId>, RenderError> {
        let mut node = id;
        'siblings: loop {
            let sibling = loop {
                let current = self.arena.get(node)?;
                if let Some(sibling) = current.sibling {
                    break sibling;
                }
                match current.parent {
                    Some(parent) if !self.arena.get(parent)?.tag.is_host_parent() => {
                        node = parent;
                    }
                    _ => return Ok(None),
                }
            };
            node = sibling;
            loop {
                let current = self.arena.get(node)?;
                if current.tag.is_host() {
                    break;
                }
                if current.flags.contains(EffectFlags::PLACEMENT) {
                    continue 'siblings;
                }
                match current.child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
            let current = self.arena.get(node)?;
            if !current.flags.contains(EffectFlags::PLACEMENT) {
                return current
                    .host_handle()
                    .map(Some)
                    .ok_or(RenderError::MissingHostHandle { id: node });
            }
        }
    }

    fn commit_placement(&mut self, id: NodeId) -> Result<(), RenderError> {
        let parent = self
            .arena
            .get(id)?
            .parent
            .ok_or(RenderError::NoHostParent { id })?;
        let host_parent = self.find_host_parent(parent, id)?;
        let before = self.find_host_sibling(id)?;
        self.insert_or_append(id, before, host_parent)
    }

    fn insert_or_append(
        &mut self,
        id: NodeId,
        before: Option<HostId>,
        parent: HostId,
    ) -> Result<(), RenderError> {
        let node = self.arena.get(id)?;
        if node.tag.is_host() {
            let handle = node
                .host_handle()
                .ok_or(RenderError::MissingHostHandle { id })?;
            match before {
                Some(before) => self.host.insert_before(parent, handle, Some(before))?,
                None => self.host.append_child(parent, handle)?,
            }
            return Ok(());
        }
        for child in self.arena.children(id)? {
            self.insert_or_append(child, before, parent)?;
        }
        Ok(())
    }

    fn commit_deletion(
        &mut self,
        parent: NodeId,
        deleted: NodeId,
        layout: &mut Vec<LayoutWork>,
    ) -> Result<(), RenderError> {
        log::trace!("deleting {deleted} under {parent}");
        let host_parent = self.find_host_parent(parent, deleted)?;
        self.unmount_subtree(deleted, Some(host_parent), layout)?;
        self.release_subtree(deleted)
    }

    /// Detaches host nodes and queues teardown for everything under `id`.
    /// Only the topmost host nodes are removed from `host_parent`.
    fn unmount_subtree(
        &mut self,
        id: NodeId,
        host_parent: Option<HostId>,
        layout: &mut Vec<LayoutWork>,
    ) -> Result<(), RenderError> {
        let node = self.arena.get(id)?;
        let tag = node.tag;
        let handle = node.host_handle();
        match (&node.state_node, tag) {
            (_, WorkTag::FunctionComponent | WorkTag::Memoized) => {
                for hook in node.memoized_state.hooks().unwrap_or_default() {
                    if let Hook::Effect { tag, instance, .. } = hook {
                        match tag {
                            EffectTag::Layout => layout.push(LayoutWork::Destroy(instance.clone())),
                            EffectTag::Passive => self.pending_passive.unmount.push(instance.clone()),
                        }
                    }
                }
            }
            (StateNode::Instance(instance), WorkTag::ClassComponent) => {
                layout.push(LayoutWork::WillUnmount(instance.clone()));
            }
            _ => {}
        }

        let nested_parent = if tag.is_host() { None } else { host_parent };
        for child in self.arena.children(id)? {
            self.unmount_subtree(child, nested_parent, layout)?;
        }
        if tag.is_host() {
            if let Some(parent) = host_parent {
                let handle = handle.ok_or(RenderError::MissingHostHandle { id })?;
                self.host.remove_child(parent, handle)?;
            }
        }
        Ok(())
    }

    /// Frees a deleted subtree and the other-generation twins of its nodes.
    fn release_subtree(&mut self, id: NodeId) -> Result<(), RenderError> {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            stack.extend(self.arena.children(next)?);
            if let Some(node) = self.arena.remove(next) {
                if let Some(alternate) = node.alternate {
                    self.arena.remove(alternate);
                }
            }
        }
        Ok(())
    }

    fn commit_layout_effects(
        &mut self,
        id: NodeId,
        layout: &mut Vec<LayoutWork>,
    ) -> Result<(), RenderError> {
        let (tag, flags, subtree_flags) = {
            let node = self.arena.get(id)?;
            (node.tag, node.flags, node.subtree_flags)
        };
        if subtree_flags.intersects(EffectFlags::LAYOUT_MASK) {
            for child in self.arena.children(id)? {
                self.commit_layout_effects(child, layout)?;
            }
        }
        match tag {
            WorkTag::FunctionComponent | WorkTag::Memoized => {
                let node = self.arena.get(id)?;
                for effect in &node.effects {
                    match effect.tag {
                        EffectTag::Layout if flags.contains(EffectFlags::UPDATE) => {
                            layout.push(LayoutWork::Create(effect.clone()));
                        }
                        EffectTag::Passive if flags.contains(EffectFlags::PASSIVE) => {
                            self.pending_passive.mount.push(effect.clone());
                        }
                        _ => {}
                    }
                }
            }
            WorkTag::ClassComponent if flags.contains(EffectFlags::UPDATE) => {
                let node = self.arena.get(id)?;
                let StateNode::Instance(instance) = &node.state_node else {
                    return Err(RenderError::UnknownKind { id, tag });
                };
                let previous = match node.alternate {
                    Some(alternate) => self.arena.get(alternate)?.memoized_props.clone(),
                    None => None,
                };
                layout.push(match previous {
                    Some(previous) => LayoutWork::DidUpdate(instance.clone(), previous),
                    None => LayoutWork::DidMount(instance.clone()),
                });
            }
            _ => {}
        }
        Ok(())
    }
}
