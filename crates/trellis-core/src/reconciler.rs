//! Child reconciliation: diff a node's previous children against new
//! descriptors, reusing work nodes where key and type match and recording
//! placements and deletions.

use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::descriptor::{Descriptor, Element, ElementKind, Key, Props};
use crate::error::RenderError;
use crate::work_node::{
    create_fragment, create_from_element, create_from_text, create_work_in_progress,
    fragment_props, EffectFlags, NodeArena, NodeId, WorkTag,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum MapKey {
    Key(Key),
    Index(usize),
}

pub(crate) struct ChildReconciler<'a> {
    arena: &'a mut NodeArena,
    /// False on mount: nothing to delete and the parent's insertion covers placement.
    track_side_effects: bool,
    /// Nodes allocated during this pass, freed if the pass is discarded.
    created: &'a mut Vec<NodeId>,
}

impl<'a> ChildReconciler<'a> {
    pub(crate) fn new(
        arena: &'a mut NodeArena,
        track_side_effects: bool,
        created: &'a mut Vec<NodeId>,
    ) -> Self {
        Self {
            arena,
            track_side_effects,
            created,
        }
    }

    pub(crate) fn reconcile(
        &mut self,
        parent: NodeId,
        current_first: Option<NodeId>,
        new_child: &Descriptor,
    ) -> Result<Option<NodeId>, RenderError> {
        let new_child = match new_child {
            Descriptor::Element(element)
                if matches!(element.kind, ElementKind::Fragment) && element.key.is_none() =>
            {
                element.props.children()
            }
            other => other,
        };
        match new_child {
            Descriptor::Element(element) => {
                let child = self.reconcile_single_element(parent, current_first, element)?;
                self.place_single_child(child)?;
                Ok(Some(child))
            }
            Descriptor::Text(text) => {
                let child = self.reconcile_single_text(parent, current_first, text)?;
                self.place_single_child(child)?;
                Ok(Some(child))
            }
            Descriptor::List(items) => self.reconcile_children_array(parent, current_first, items),
            Descriptor::Empty => {
                self.delete_remaining_children(parent, current_first)?;
                Ok(None)
            }
        }
    }

    fn delete_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), RenderError> {
        if !self.track_side_effects {
            return Ok(());
        }
        let node = self.arena.get_mut(parent)?;
        node.deletions.push(child);
        node.flags |= EffectFlags::CHILD_DELETION;
        Ok(())
    }

    fn delete_remaining_children(
        &mut self,
        parent: NodeId,
        first: Option<NodeId>,
    ) -> Result<(), RenderError> {
        if !self.track_side_effects {
            return Ok(());
        }
        let mut cursor = first;
        while let Some(child) = cursor {
            self.delete_child(parent, child)?;
            cursor = self.arena.get(child)?.sibling;
        }
        Ok(())
    }

    /// Indexes the old children from `first` on. Later siblings repeating a
    /// key are returned separately so they can be deleted.
    fn map_remaining_children(
        &self,
        first: Option<NodeId>,
    ) -> Result<(HashMap<MapKey, NodeId>, Vec<NodeId>), RenderError> {
        let mut existing = HashMap::default();
        let mut duplicates = Vec::new();
        let mut cursor = first;
        while let Some(child) = cursor {
            let node = self.arena.get(child)?;
            let key = match &node.key {
                Some(key) => MapKey::Key(key.clone()),
                None => MapKey::Index(node.index),
            };
            if existing.contains_key(&key) {
                log::warn!("duplicate child key {key:?} under one parent");
                duplicates.push(child);
            } else {
                existing.insert(key, child);
            }
            cursor = node.sibling;
        }
        Ok((existing, duplicates))
    }

    fn use_fiber(&mut self, fiber: NodeId, props: Rc<Props>) -> Result<NodeId, RenderError> {
        let clone = create_work_in_progress(self.arena, fiber, props)?;
        let node = self.arena.get_mut(clone)?;
        node.index = 0;
        node.sibling = None;
        Ok(clone)
    }

    fn adopt(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, RenderError> {
        self.arena.get_mut(child)?.parent = Some(parent);
        Ok(child)
    }

    fn created(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, RenderError> {
        self.created.push(child);
        self.adopt(parent, child)
    }

    fn place_child(
        &mut self,
        child: NodeId,
        last_placed_index: usize,
        new_index: usize,
    ) -> Result<usize, RenderError> {
        let alternate = {
            let node = self.arena.get_mut(child)?;
            node.index = new_index;
            if !self.track_side_effects {
                return Ok(last_placed_index);
            }
            node.alternate
        };
        let old_index = match alternate {
            Some(current) => Some(self.arena.get(current)?.index),
            None => None,
        };
        match old_index {
            Some(old_index) if old_index >= last_placed_index => Ok(old_index),
            _ => {
                self.arena.get_mut(child)?.flags |= EffectFlags::PLACEMENT;
                Ok(last_placed_index)
            }
        }
    }

    fn place_single_child(&mut self, child: NodeId) -> Result<(), RenderError> {
        let node = self.arena.get_mut(child)?;
        if self.track_side_effects && node.alternate.is_none() {
            node.flags |= EffectFlags::PLACEMENT;
        }
        Ok(())
    }

    fn is_same_element(&self, node: NodeId, element: &Element) -> Result<bool, RenderError> {
        Ok(self
            .arena
            .get(node)?
            .element_type
            .as_ref()
            .is_some_and(|kind| kind.same_type(&element.kind)))
    }

    fn reuse_element(&mut self, current: NodeId, element: &Element) -> Result<NodeId, RenderError> {
        let existing = self.use_fiber(current, element.props.clone())?;
        self.arena.get_mut(existing)?.element_type = Some(element.kind.clone());
        Ok(existing)
    }

    fn reconcile_single_element(
        &mut self,
        parent: NodeId,
        current_first: Option<NodeId>,
        element: &Element,
    ) -> Result<NodeId, RenderError> {
        let mut cursor = current_first;
        while let Some(child) = cursor {
            let (key_matches, sibling) = {
                let node = self.arena.get(child)?;
                (node.key == element.key, node.sibling)
            };
            if key_matches {
                if self.is_same_element(child, element)? {
                    self.delete_remaining_children(parent, sibling)?;
                    let existing = self.reuse_element(child, element)?;
                    return self.adopt(parent, existing);
                }
                self.delete_remaining_children(parent, Some(child))?;
                break;
            }
            self.delete_child(parent, child)?;
            cursor = sibling;
        }
        let created = create_from_element(self.arena, element);
        self.created(parent, created)
    }

    fn reconcile_single_text(
        &mut self,
        parent: NodeId,
        current_first: Option<NodeId>,
        text: &Rc<str>,
    ) -> Result<NodeId, RenderError> {
        if let Some(first) = current_first {
            let node = self.arena.get(first)?;
            if node.tag == WorkTag::HostText {
                let sibling = node.sibling;
                self.delete_remaining_children(parent, sibling)?;
                let existing = self.use_fiber(first, Rc::new(Props::from_text(text.clone())))?;
                return self.adopt(parent, existing);
            }
        }
        self.delete_remaining_children(parent, current_first)?;
        let created = create_from_text(self.arena, text.clone());
        self.created(parent, created)
    }

    fn create_child(
        &mut self,
        parent: NodeId,
        new_child: &Descriptor,
    ) -> Result<Option<NodeId>, RenderError> {
        let created = match new_child {
            Descriptor::Text(text) => create_from_text(self.arena, text.clone()),
            Descriptor::Element(element) => create_from_element(self.arena, element),
            Descriptor::List(items) => create_fragment(self.arena, items, None),
            Descriptor::Empty => return Ok(None),
        };
        self.created(parent, created).map(Some)
    }

    fn update_text_node(
        &mut self,
        parent: NodeId,
        current: Option<NodeId>,
        text: &Rc<str>,
    ) -> Result<NodeId, RenderError> {
        if let Some(current) = current {
            if self.arena.get(current)?.tag == WorkTag::HostText {
                let existing = self.use_fiber(current, Rc::new(Props::from_text(text.clone())))?;
                return self.adopt(parent, existing);
            }
        }
        let created = create_from_text(self.arena, text.clone());
        self.created(parent, created)
    }

    fn update_element(
        &mut self,
        parent: NodeId,
        current: Option<NodeId>,
        element: &Element,
    ) -> Result<NodeId, RenderError> {
        if let Some(current) = current {
            if self.is_same_element(current, element)? {
                let existing = self.reuse_element(current, element)?;
                return self.adopt(parent, existing);
            }
        }
        let created = create_from_element(self.arena, element);
        self.created(parent, created)
    }

    fn update_fragment(
        &mut self,
        parent: NodeId,
        current: Option<NodeId>,
        items: &[Descriptor],
    ) -> Result<NodeId, RenderError> {
        if let Some(current) = current {
            if self.arena.get(current)?.tag == WorkTag::Fragment {
                let existing = self.use_fiber(current, fragment_props(items))?;
                return self.adopt(parent, existing);
            }
        }
        let created = create_fragment(self.arena, items, None);
        self.created(parent, created)
    }

    /// Reuses or replaces `old` for the same slot; `None` when keys disagree.
    fn update_slot(
        &mut self,
        parent: NodeId,
        old: Option<NodeId>,
        new_child: &Descriptor,
    ) -> Result<Option<NodeId>, RenderError> {
        let key = match old {
            Some(old) => self.arena.get(old)?.key.clone(),
            None => None,
        };
        match new_child {
            Descriptor::Text(text) if key.is_none() => {
                self.update_text_node(parent, old, text).map(Some)
            }
            Descriptor::Element(element) if element.key == key => {
                self.update_element(parent, old, element).map(Some)
            }
            Descriptor::List(items) if key.is_none() => {
                self.update_fragment(parent, old, items).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn update_from_map(
        &mut self,
        existing: &HashMap<MapKey, NodeId>,
        parent: NodeId,
        new_index: usize,
        new_child: &Descriptor,
    ) -> Result<Option<NodeId>, RenderError> {
        let by_index = || existing.get(&MapKey::Index(new_index)).copied();
        match new_child {
            Descriptor::Text(text) => self.update_text_node(parent, by_index(), text).map(Some),
            Descriptor::Element(element) => {
                let matched = match &element.key {
                    Some(key) => existing.get(&MapKey::Key(key.clone())).copied(),
                    None => by_index(),
                };
                self.update_element(parent, matched, element).map(Some)
            }
            Descriptor::List(items) => self.update_fragment(parent, by_index(), items).map(Some),
            Descriptor::Empty => Ok(None),
        }
    }

    fn link(
        &mut self,
        first: &mut Option<NodeId>,
        previous: &mut Option<NodeId>,
        child: NodeId,
    ) -> Result<(), RenderError> {
        match *previous {
            Some(previous) => self.arena.get_mut(previous)?.sibling = Some(child),
            None => *first = Some(child),
        }
        *previous = Some(child);
        Ok(())
    }

    fn reconcile_children_array(
        &mut self,
        parent: NodeId,
        current_first: Option<NodeId>,
        items: &[Descriptor],
    ) -> Result<Option<NodeId>, RenderError> {
        let mut resulting_first = None;
        let mut previous_new = None;
        let mut old = current_first;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        // Walk both lists in step while slots line up.
        while let Some(old_id) = old {
            if new_index >= items.len() {
                break;
            }
            let (old_index, old_sibling) = {
                let node = self.arena.get(old_id)?;
                (node.index, node.sibling)
            };
            let (slot_old, next_old) = if old_index > new_index {
                (None, Some(old_id))
            } else {
                (Some(old_id), old_sibling)
            };
            let Some(new_fiber) = self.update_slot(parent, slot_old, &items[new_index])? else {
                break;
            };
            if self.track_side_effects {
                if let Some(slot_old) = slot_old {
                    if self.arena.get(new_fiber)?.alternate.is_none() {
                        self.delete_child(parent, slot_old)?;
                    }
                }
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, new_index)?;
            self.link(&mut resulting_first, &mut previous_new, new_fiber)?;
            old = next_old;
            new_index += 1;
        }

        if new_index == items.len() {
            self.delete_remaining_children(parent, old)?;
            return Ok(resulting_first);
        }

        if old.is_none() {
            for (index, item) in items.iter().enumerate().skip(new_index) {
                if let Some(new_fiber) = self.create_child(parent, item)? {
                    last_placed_index = self.place_child(new_fiber, last_placed_index, index)?;
                    self.link(&mut resulting_first, &mut previous_new, new_fiber)?;
                }
            }
            return Ok(resulting_first);
        }

        let (mut existing, duplicates) = self.map_remaining_children(old)?;
        for (index, item) in items.iter().enumerate().skip(new_index) {
            let Some(new_fiber) = self.update_from_map(&existing, parent, index, item)? else {
                continue;
            };
            if self.track_side_effects {
                let node = self.arena.get(new_fiber)?;
                if node.alternate.is_some() {
                    let key = match &node.key {
                        Some(key) => MapKey::Key(key.clone()),
                        None => MapKey::Index(index),
                    };
                    existing.remove(&key);
                }
            }
            last_placed_index = self.place_child(new_fiber, last_placed_index, index)?;
            self.link(&mut resulting_first, &mut previous_new, new_fiber)?;
        }

        if self.track_side_effects {
            let mut leftovers = Vec::with_capacity(existing.len() + duplicates.len());
            for id in existing.into_values().chain(duplicates) {
                leftovers.push((self.arena.get(id)?.index, id));
            }
            leftovers.sort_unstable_by_key(|(index, _)| *index);
            for (_, id) in leftovers {
                self.delete_child(parent, id)?;
            }
        }
        Ok(resulting_first)
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
