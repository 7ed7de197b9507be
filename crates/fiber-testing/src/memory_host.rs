//! In-memory host tree used by tests and headless demos.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use fiber_core::host::{initial_patches, PropPatch};
use fiber_core::{
    diff_props, Event, HostAdapter, HostError, HostKind, Listener, NodeId, PropValue, Props,
    NODE_VALUE,
};

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Container,
    Element(String),
    Text,
}

pub struct MemoryNode {
    pub kind: NodeKind,
    pub attributes: BTreeMap<String, PropValue>,
    listeners: Vec<(String, Listener)>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl MemoryNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
            listeners: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    /// Events this node has listeners for, in binding order.
    pub fn listener_events(&self) -> Vec<&str> {
        self.listeners.iter().map(|(e, _)| e.as_str()).collect()
    }

    fn apply(&mut self, patch: PropPatch) {
        match patch {
            PropPatch::RemoveListener { event, listener } => {
                self.listeners
                    .retain(|(e, l)| !(e == &event && Rc::ptr_eq(l, &listener)));
            }
            PropPatch::AddListener { event, listener } => self.listeners.push((event, listener)),
            PropPatch::ClearAttribute { name } => {
                self.attributes.remove(&name);
            }
            PropPatch::SetAttribute { name, value } => {
                self.attributes.insert(name, value);
            }
            PropPatch::SetStyle { key, value } => {
                let style = self
                    .attributes
                    .entry("style".to_owned())
                    .or_insert_with(|| PropValue::Style(BTreeMap::new()));
                if let PropValue::Style(map) = style {
                    match value {
                        Some(value) => {
                            map.insert(key, value);
                        }
                        None => {
                            map.remove(&key);
                        }
                    }
                }
            }
        }
    }

    fn label(&self) -> String {
        match &self.kind {
            NodeKind::Container => "#container".to_owned(),
            NodeKind::Element(tag) => tag.clone(),
            NodeKind::Text => "#text".to_owned(),
        }
    }
}

/// A mutation the host received, recorded in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    Create { node: NodeId, label: String },
    Insert { parent: NodeId, node: NodeId, before: Option<NodeId> },
    Remove { parent: NodeId, node: NodeId },
    Patch { node: NodeId, changes: usize },
}

#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<MemoryNode>>,
    ops: Vec<HostOp>,
    fail_inserts: bool,
    fail_removes: bool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a detached root node to render into.
    pub fn create_container(&mut self) -> NodeId {
        self.allocate(MemoryNode::new(NodeKind::Container))
    }

    fn allocate(&mut self, node: MemoryNode) -> NodeId {
        self.nodes.push(Some(node));
        self.nodes.len() - 1
    }

    /// Makes every later `insert_node` fail, to exercise aborted commits.
    pub fn set_fail_inserts(&mut self, fail: bool) {
        self.fail_inserts = fail;
    }

    /// Makes every later `remove_node` fail.
    pub fn set_fail_removes(&mut self, fail: bool) {
        self.fail_removes = fail;
    }

    pub fn node(&self, id: NodeId) -> Option<&MemoryNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::MissingNode { id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of nodes currently allocated, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn tag(&self, id: NodeId) -> Option<String> {
        self.node(id).map(MemoryNode::label)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&PropValue> {
        self.node(id).and_then(|n| n.attributes.get(name))
    }

    pub fn listener_events(&self, id: NodeId) -> Vec<&str> {
        self.node(id).map(MemoryNode::listener_events).unwrap_or_default()
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        if node.kind == NodeKind::Text {
            if let Some(text) = node.attributes.get(NODE_VALUE).and_then(PropValue::to_attribute) {
                out.push_str(&text);
            }
        }
        for &child in &node.children {
            self.collect_text(child, out);
        }
    }

    /// First attached element with `tag`, in allocation order.
    pub fn find(&self, tag: &str) -> Option<NodeId> {
        self.find_all(tag).into_iter().next()
    }

    pub fn find_all(&self, tag: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| {
                let node = node.as_ref()?;
                let attached = node.parent.is_some();
                (attached && node.kind == NodeKind::Element(tag.to_owned())).then_some(id)
            })
            .collect()
    }

    /// Invokes every listener bound to `event` on `id`. Returns how many ran.
    pub fn dispatch_event(&self, id: NodeId, event: &str) -> usize {
        let listeners: Vec<Listener> = self
            .node(id)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|(e, _)| e == event)
                    .map(|(_, l)| l.clone())
                    .collect()
            })
            .unwrap_or_default();
        let payload = Event::new(event, id);
        for listener in &listeners {
            listener(&payload);
        }
        listeners.len()
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        match root {
            Some(root) => self.dump_node(&mut output, root, 0),
            None => output.push_str("(no root)\n"),
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(node) = self.node(id) else {
            let _ = writeln!(output, "{indent}[{id}] (missing)");
            return;
        };
        let _ = write!(output, "{indent}[{id}] {}", node.label());
        for (name, value) in &node.attributes {
            let _ = write!(output, " {name}={value:?}");
        }
        for event in node.listener_events() {
            let _ = write!(output, " @{event}");
        }
        output.push('\n');
        for &child in &node.children {
            self.dump_node(output, child, depth + 1);
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_node(&mut self, kind: &HostKind, props: &Props) -> Result<NodeId, HostError> {
        let kind = match kind {
            HostKind::Element(tag) => NodeKind::Element(tag.to_string()),
            HostKind::Text => NodeKind::Text,
        };
        let mut node = MemoryNode::new(kind);
        for patch in initial_patches(props) {
            node.apply(patch);
        }
        let label = node.label();
        let id = self.allocate(node);
        self.ops.push(HostOp::Create { node: id, label });
        Ok(id)
    }

    fn patch_node(&mut self, node: NodeId, old: &Props, new: &Props) -> Result<(), HostError> {
        let patches = diff_props(old, new);
        let changes = patches.len();
        let target = self.node_mut(node)?;
        for patch in patches {
            target.apply(patch);
        }
        self.ops.push(HostOp::Patch { node, changes });
        Ok(())
    }

    fn insert_node(
        &mut self,
        parent: NodeId,
        node: NodeId,
        before: Option<NodeId>,
    ) -> Result<(), HostError> {
        if self.fail_inserts {
            return Err(HostError::NotAContainer { id: parent });
        }
        if self.node_mut(parent)?.kind == NodeKind::Text {
            return Err(HostError::NotAContainer { id: parent });
        }
        let previous = self.node_mut(node)?.parent.take();
        if let Some(previous) = previous {
            self.node_mut(previous)?.children.retain(|&c| c != node);
        }
        let target = self.node_mut(parent)?;
        let index = match before {
            Some(anchor) => target
                .children
                .iter()
                .position(|&c| c == anchor)
                .ok_or(HostError::NotAChild {
                    parent,
                    child: anchor,
                })?,
            None => target.children.len(),
        };
        target.children.insert(index, node);
        self.node_mut(node)?.parent = Some(parent);
        self.ops.push(HostOp::Insert {
            parent,
            node,
            before,
        });
        Ok(())
    }

    fn remove_node(&mut self, parent: NodeId, node: NodeId) -> Result<(), HostError> {
        if self.fail_removes {
            return Err(HostError::NotAChild {
                parent,
                child: node,
            });
        }
        let target = self.node_mut(parent)?;
        let index = target
            .children
            .iter()
            .position(|&c| c == node)
            .ok_or(HostError::NotAChild {
                parent,
                child: node,
            })?;
        target.children.remove(index);
        self.free_subtree(node);
        self.ops.push(HostOp::Remove { parent, node });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiber_core::Element;
    use std::cell::Cell;

    fn element_kind(tag: &str) -> HostKind {
        HostKind::Element(Rc::from(tag))
    }

    #[test]
    fn insert_respects_anchor_and_remove_frees_subtree() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let a = host.create_node(&element_kind("a"), &Props::new()).unwrap();
        let b = host.create_node(&element_kind("b"), &Props::new()).unwrap();
        let c = host.create_node(&HostKind::Text, &Props::new().with(NODE_VALUE, "hi")).unwrap();
        host.insert_node(root, a, None).unwrap();
        host.insert_node(root, b, Some(a)).unwrap();
        host.insert_node(a, c, None).unwrap();
        assert_eq!(host.children(root), vec![b, a]);
        assert_eq!(host.text_content(root), "hi");

        host.remove_node(root, a).unwrap();
        assert!(!host.contains(a));
        assert!(!host.contains(c));
        assert_eq!(
            host.remove_node(root, a),
            Err(HostError::NotAChild {
                parent: root,
                child: a
            })
        );
    }

    #[test]
    fn patch_tracks_attributes_and_listeners() {
        let mut host = MemoryHost::new();
        let clicks = Rc::new(Cell::new(0));
        let counter = clicks.clone();
        let old = Element::host("input")
            .attr("value", "a")
            .attr("title", "t")
            .on("click", move |_| counter.set(counter.get() + 1));
        let new = Element::host("input").attr("value", "b").on("focus", |_| {});

        let node = host.create_node(&element_kind("input"), &old.props).unwrap();
        assert_eq!(host.dispatch_event(node, "click"), 1);
        host.patch_node(node, &old.props, &new.props).unwrap();

        assert_eq!(host.attribute(node, "value"), Some(&PropValue::from("b")));
        assert_eq!(host.attribute(node, "title"), None);
        assert_eq!(host.listener_events(node), vec!["focus"]);
        assert_eq!(host.dispatch_event(node, "click"), 0);
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn text_nodes_cannot_hold_children() {
        let mut host = MemoryHost::new();
        let text = host.create_node(&HostKind::Text, &Props::new()).unwrap();
        let child = host.create_node(&element_kind("b"), &Props::new()).unwrap();
        assert_eq!(
            host.insert_node(text, child, None),
            Err(HostError::NotAContainer { id: text })
        );
    }
}
