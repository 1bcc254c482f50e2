use std::rc::Rc;

use crate::descriptor::{ElementKind, Props};
use crate::error::RenderError;
use crate::host::{Host, HostId};
use crate::work_loop::FiberRoot;
use crate::work_node::{EffectFlags, NodeId, PropChange, StateNode, WorkTag};

/// Property changes needed to turn `previous` into `next` on a host element.
pub(crate) fn diff_props(previous: &Props, next: &Props) -> Vec<PropChange> {
    let mut changes = Vec::new();
    for (key, _) in previous.attrs() {
        if !next.contains(key) {
            changes.push(PropChange::Remove(key.clone()));
        }
    }
    for (key, value) in next.attrs() {
        if previous.get(key).map_or(true, |old| !old.is(value)) {
            changes.push(PropChange::Set(key.clone(), value.clone()));
        }
    }
    match (previous.text(), next.text()) {
        (Some(old), Some(new)) if old != new => changes.push(PropChange::Text(new.clone())),
        (None, Some(new)) => changes.push(PropChange::Text(new.clone())),
        (Some(_), None) => changes.push(PropChange::Text(Rc::from(""))),
        _ => {}
    }
    changes
}

impl<H: Host> FiberRoot<H> {
    pub(crate) fn complete_work(&mut self, unit: NodeId) -> Result<(), RenderError> {
        let (tag, current, has_handle) = {
            let node = self.arena.get(unit)?;
            (node.tag, node.alternate, node.host_handle().is_some())
        };
        log::trace!("complete {unit} {tag:?}");
        match tag {
            WorkTag::Root
            | WorkTag::Fragment
            | WorkTag::FunctionComponent
            | WorkTag::ClassComponent
            | WorkTag::ContextConsumer
            | WorkTag::Memoized => {}
            WorkTag::ContextProvider => {
                let node = self.arena.get(unit)?;
                let Some(ElementKind::Provider(context)) = &node.element_type else {
                    return Err(RenderError::UnknownKind { id: unit, tag });
                };
                let id = context.id();
                self.context.pop(id)?;
            }
            WorkTag::HostElement => match current {
                Some(current) if has_handle => self.diff_host_component(current, unit)?,
                _ => self.create_host_component(unit)?,
            },
            WorkTag::HostText => {
                let text = self
                    .arena
                    .get(unit)?
                    .pending_props
                    .text()
                    .cloned()
                    .unwrap_or_else(|| Rc::from(""));
                match current {
                    Some(current) if has_handle => {
                        let previous = self.arena.get(current)?.memoized_props.clone();
                        if previous.as_deref().and_then(Props::text) != Some(&text) {
                            self.arena.get_mut(unit)?.flags |= EffectFlags::UPDATE;
                        }
                    }
                    _ => {
                        let handle = self.host.create_text_node(&text);
                        self.arena.get_mut(unit)?.state_node = StateNode::Host(handle);
                    }
                }
            }
        }
        self.bubble_properties(unit)
    }

    fn create_host_component(&mut self, unit: NodeId) -> Result<(), RenderError> {
        let (tag, props) = {
            let node = self.arena.get(unit)?;
            let Some(ElementKind::Host(tag)) = &node.element_type else {
                return Err(RenderError::UnknownKind {
                    id: unit,
                    tag: node.tag,
                });
            };
            (tag.clone(), node.pending_props.clone())
        };
        let handle = self.host.create_node(&tag);
        for (key, value) in props.attrs() {
            self.host.set_property(handle, key, Some(value))?;
        }
        if let Some(text) = props.text() {
            self.host.set_text_content(handle, text)?;
        }
        self.append_all_children(handle, unit)?;
        self.arena.get_mut(unit)?.state_node = StateNode::Host(handle);
        Ok(())
    }

    fn diff_host_component(&mut self, current: NodeId, unit: NodeId) -> Result<(), RenderError> {
        let previous = self.arena.get(current)?.memoized_props.clone();
        let node = self.arena.get_mut(unit)?;
        if let Some(previous) = previous {
            if Rc::ptr_eq(&previous, &node.pending_props) {
                return Ok(());
            }
            let payload = diff_props(&previous, &node.pending_props);
            if !payload.is_empty() {
                node.update_payload = payload;
                node.flags |= EffectFlags::UPDATE;
            }
        }
        Ok(())
    }

    /// Appends the nearest host descendants of `unit` to a freshly created
    /// host node, skipping through non-host nodes.
    fn append_all_children(&mut self, parent: HostId, unit: NodeId) -> Result<(), RenderError> {
        let mut cursor = self.arena.get(unit)?.child;
        while let Some(id) = cursor {
            let node = self.arena.get(id)?;
            if node.tag.is_host() {
                let handle = node
                    .host_handle()
                    .ok_or(RenderError::MissingHostHandle { id })?;
                self.host.append_child(parent, handle)?;
            } else if let Some(child) = node.child {
                cursor = Some(child);
                continue;
            }
            let mut climb = id;
            cursor = loop {
                let node = self.arena.get(climb)?;
                if let Some(sibling) = node.sibling {
                    break Some(sibling);
                }
                match node.parent {
                    Some(up) if up != unit => climb = up,
                    _ => break None,
                }
            };
        }
        Ok(())
    }

    fn bubble_properties(&mut self, unit: NodeId) -> Result<(), RenderError> {
        let mut subtree = EffectFlags::empty();
        let mut cursor = self.arena.get(unit)?.child;
        while let Some(child) = cursor {
            let node = self.arena.get(child)?;
            subtree |= node.flags | node.subtree_flags;
            cursor = node.sibling;
        }
        self.arena.get_mut(unit)?.subtree_flags = subtree;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::element;
    use crate::value::Value;

    fn props_of(descriptor: crate::Descriptor) -> Props {
        descriptor.as_element().unwrap().props().clone()
    }

    #[test]
    fn diff_reports_changed_added_and_removed_props() {
        let previous = props_of(element("a").prop("href", "/x").prop("title", "t").build());
        let next = props_of(element("a").prop("href", "/y").prop("rel", "ext").build());
        assert_eq!(
            diff_props(&previous, &next),
            vec![
                PropChange::Remove("title".into()),
                PropChange::Set("href".into(), Value::from("/y")),
                PropChange::Set("rel".into(), Value::from("ext")),
            ]
        );
    }

    #[test]
    fn diff_tracks_direct_text() {
        let previous = props_of(element("p").text("old").build());
        let next = props_of(element("p").text("new").build());
        assert_eq!(
            diff_props(&previous, &next),
            vec![PropChange::Text("new".into())]
        );
        let nested = props_of(element("p").child(element("b").build()).build());
        assert_eq!(
            diff_props(&previous, &nested),
            vec![PropChange::Text("".into())]
        );
        assert!(diff_props(&previous, &previous).is_empty());
    }
}
