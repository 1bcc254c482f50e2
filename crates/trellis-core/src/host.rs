//! Host tree interface and an in-memory implementation.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::error::HostError;
use crate::value::{EventHandler, Value};

/// Handle to a node owned by a [`Host`].
pub type HostId = usize;

/// Target of committed mutations.
///
/// The reconciler only calls mutating methods during commit, in
/// parent-before-child order for insertions.
pub trait Host {
    fn create_node(&mut self, tag: &str) -> HostId;

    fn create_text_node(&mut self, text: &str) -> HostId;

    /// Sets or clears (`None`) a property.
    fn set_property(
        &mut self,
        node: HostId,
        key: &str,
        value: Option<&Value>,
    ) -> Result<(), HostError>;

    /// Replaces all children of an element with text, or updates a text node.
    fn set_text_content(&mut self, node: HostId, text: &str) -> Result<(), HostError>;

    fn append_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError>;

    /// Inserts `child` before `before`, appending when `before` is `None`.
    fn insert_before(
        &mut self,
        parent: HostId,
        child: HostId,
        before: Option<HostId>,
    ) -> Result<(), HostError>;

    fn remove_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError>;
}

/// Mutation log entry recorded by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    Create { id: HostId, tag: String },
    CreateText { id: HostId, text: String },
    SetProperty { id: HostId, key: String, value: Option<String> },
    SetText { id: HostId, text: String },
    Append { parent: HostId, child: HostId },
    InsertBefore { parent: HostId, child: HostId, before: HostId },
    Remove { parent: HostId, child: HostId },
}

#[derive(Debug, Clone)]
pub enum MemoryNodeKind {
    Element {
        tag: String,
        props: IndexMap<String, Value>,
        text: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct MemoryNode {
    pub kind: MemoryNodeKind,
    pub children: Vec<HostId>,
    pub parent: Option<HostId>,
}

/// Host that keeps its tree in memory and logs every mutation.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: Vec<Option<MemoryNode>>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached element to render into. Not recorded in the log.
    pub fn create_container(&mut self, tag: &str) -> HostId {
        self.alloc(MemoryNodeKind::Element {
            tag: tag.to_owned(),
            props: IndexMap::new(),
            text: None,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, id: HostId) -> Option<&MemoryNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    pub fn children(&self, id: HostId) -> &[HostId] {
        self.node(id).map_or(&[], |node| node.children.as_slice())
    }

    pub fn tag(&self, id: HostId) -> Option<&str> {
        match &self.node(id)?.kind {
            MemoryNodeKind::Element { tag, .. } => Some(tag),
            MemoryNodeKind::Text(_) => None,
        }
    }

    pub fn prop(&self, id: HostId, key: &str) -> Option<&Value> {
        match &self.node(id)?.kind {
            MemoryNodeKind::Element { props, .. } => props.get(key),
            MemoryNodeKind::Text(_) => None,
        }
    }

    /// Returns an event handler stored under `event`, to be invoked outside
    /// any borrow of the host.
    pub fn handler(&self, id: HostId, event: &str) -> Option<EventHandler> {
        self.prop(id, event).and_then(Value::as_handler).cloned()
    }

    /// Text of a text node or of an element holding direct text.
    pub fn text(&self, id: HostId) -> Option<&str> {
        match &self.node(id)?.kind {
            MemoryNodeKind::Element { text, .. } => text.as_deref(),
            MemoryNodeKind::Text(text) => Some(text),
        }
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Depth-first search for elements with the given tag below `root`.
    pub fn find_by_tag(&self, root: HostId, tag: &str) -> Vec<HostId> {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if id != root && self.tag(id) == Some(tag) {
                found.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        found
    }

    /// Serializes the children of `id` as markup.
    pub fn inner_html(&self, id: HostId) -> String {
        let mut output = String::new();
        if let Some(MemoryNodeKind::Element { text: Some(text), .. }) =
            self.node(id).map(|node| &node.kind)
        {
            output.push_str(text);
        }
        for &child in self.children(id) {
            self.write_html(&mut output, child);
        }
        output
    }

    pub fn serialize(&self, id: HostId) -> String {
        let mut output = String::new();
        self.write_html(&mut output, id);
        output
    }

    fn write_html(&self, output: &mut String, id: HostId) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            MemoryNodeKind::Text(text) => output.push_str(text),
            MemoryNodeKind::Element { tag, props, .. } => {
                output.push('<');
                output.push_str(tag);
                for (key, value) in props {
                    if let Some(text) = value.to_text() {
                        let _ = write!(output, " {key}=\"{text}\"");
                    }
                }
                output.push('>');
                output.push_str(&self.inner_html(id));
                let _ = write!(output, "</{tag}>");
            }
        }
    }

    pub fn dump_tree(&self, root: Option<HostId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: HostId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.node(id) {
            Some(node) => {
                match &node.kind {
                    MemoryNodeKind::Element { tag, text, .. } => {
                        let _ = write!(output, "{indent}[{id}] <{tag}>");
                        if let Some(text) = text {
                            let _ = write!(output, " {text:?}");
                        }
                        output.push('\n');
                    }
                    MemoryNodeKind::Text(text) => {
                        let _ = writeln!(output, "{indent}[{id}] {text:?}");
                    }
                }
                for &child in &node.children {
                    self.dump_node(output, child, depth + 1);
                }
            }
            None => {
                let _ = writeln!(output, "{indent}[{id}] (missing)");
            }
        }
    }

    fn alloc(&mut self, kind: MemoryNodeKind) -> HostId {
        let id = self.nodes.len();
        self.nodes.push(Some(MemoryNode {
            kind,
            children: Vec::new(),
            parent: None,
        }));
        id
    }

    fn node_mut(&mut self, id: HostId) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::Missing { id })
    }

    fn detach(&mut self, child: HostId) -> Result<(), HostError> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.node_mut(parent)?.children.retain(|&c| c != child);
        }
        Ok(())
    }

    fn free(&mut self, id: HostId) {
        let children = match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        for child in children {
            self.free(child);
        }
    }
}

impl Host for MemoryHost {
    fn create_node(&mut self, tag: &str) -> HostId {
        let id = self.create_container(tag);
        self.ops.push(HostOp::Create {
            id,
            tag: tag.to_owned(),
        });
        id
    }

    fn create_text_node(&mut self, text: &str) -> HostId {
        let id = self.alloc(MemoryNodeKind::Text(text.to_owned()));
        self.ops.push(HostOp::CreateText {
            id,
            text: text.to_owned(),
        });
        id
    }

    fn set_property(
        &mut self,
        node: HostId,
        key: &str,
        value: Option<&Value>,
    ) -> Result<(), HostError> {
        if let MemoryNodeKind::Element { props, .. } = &mut self.node_mut(node)?.kind {
            match value {
                Some(value) => {
                    props.insert(key.to_owned(), value.clone());
                }
                None => {
                    props.shift_remove(key);
                }
            }
        }
        self.ops.push(HostOp::SetProperty {
            id: node,
            key: key.to_owned(),
            value: value.map(|v| v.to_text().unwrap_or_else(|| format!("{v:?}"))),
        });
        Ok(())
    }

    fn set_text_content(&mut self, node: HostId, text: &str) -> Result<(), HostError> {
        let entry = self.node_mut(node)?;
        let removed = match &mut entry.kind {
            MemoryNodeKind::Text(content) => {
                *content = text.to_owned();
                Vec::new()
            }
            MemoryNodeKind::Element { text: content, .. } => {
                *content = (!text.is_empty()).then(|| text.to_owned());
                std::mem::take(&mut entry.children)
            }
        };
        for child in removed {
            self.free(child);
        }
        self.ops.push(HostOp::SetText {
            id: node,
            text: text.to_owned(),
        });
        Ok(())
    }

    fn append_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError> {
        self.node_mut(parent)?;
        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.ops.push(HostOp::Append { parent, child });
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: HostId,
        child: HostId,
        before: Option<HostId>,
    ) -> Result<(), HostError> {
        let Some(before) = before else {
            return self.append_child(parent, child);
        };
        if !self.node_mut(parent)?.children.contains(&before) {
            return Err(HostError::NotAChild {
                parent,
                child: before,
            });
        }
        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        let children = &mut self.node_mut(parent)?.children;
        let position = children
            .iter()
            .position(|&c| c == before)
            .ok_or(HostError::NotAChild {
                parent,
                child: before,
            })?;
        children.insert(position, child);
        self.ops.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError> {
        let children = &mut self.node_mut(parent)?.children;
        let position = children
            .iter()
            .position(|&c| c == child)
            .ok_or(HostError::NotAChild { parent, child })?;
        children.remove(position);
        self.free(child);
        self.ops.push(HostOp::Remove { parent, child });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_moves_existing_children() {
        let mut host = MemoryHost::new();
        let root = host.create_container("root");
        let a = host.create_text_node("a");
        let b = host.create_text_node("b");
        host.append_child(root, a).unwrap();
        host.append_child(root, b).unwrap();
        host.insert_before(root, b, Some(a)).unwrap();
        assert_eq!(host.inner_html(root), "ba");
    }

    #[test]
    fn removing_a_child_frees_its_subtree() {
        let mut host = MemoryHost::new();
        let root = host.create_container("root");
        let div = host.create_node("div");
        let text = host.create_text_node("x");
        host.append_child(div, text).unwrap();
        host.append_child(root, div).unwrap();
        host.remove_child(root, div).unwrap();
        assert!(host.node(text).is_none());
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn unknown_children_are_reported() {
        let mut host = MemoryHost::new();
        let root = host.create_container("root");
        let orphan = host.create_node("span");
        assert_eq!(
            host.remove_child(root, orphan),
            Err(HostError::NotAChild {
                parent: root,
                child: orphan
            })
        );
        assert_eq!(
            host.append_child(root, 99),
            Err(HostError::Missing { id: 99 })
        );
    }

    #[test]
    fn serializes_props_and_text() {
        let mut host = MemoryHost::new();
        let root = host.create_container("root");
        let button = host.create_node("button");
        host.set_property(button, "class", Some(&Value::from("primary")))
            .unwrap();
        host.set_property(button, "onclick", Some(&Value::handler(|| {})))
            .unwrap();
        host.set_text_content(button, "Go").unwrap();
        host.append_child(root, button).unwrap();
        assert_eq!(
            host.inner_html(root),
            "<button class=\"primary\">Go</button>"
        );
        assert!(host.handler(button, "onclick").is_some());
    }
}
