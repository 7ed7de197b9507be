//! Fiber records and the arena that owns them.
//!
//! Every generation allocates fresh fibers; `alternate` links a fiber to its
//! counterpart in the previous generation. Links are arena keys, so parent
//! back-references and alternates never own anything.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::element::{Component, Element, ElementType, NodeRef, Props, Tag};
use crate::hooks::HookCell;
use crate::host::HostKind;
use crate::NodeId;

new_key_type! {
    pub struct FiberId;
}

#[derive(Clone, Debug)]
pub enum FiberKind {
    Root,
    Host(Tag),
    Text,
    Component(Component),
}

impl FiberKind {
    pub fn from_element(ty: &ElementType) -> Self {
        match ty {
            ElementType::Host(tag) => FiberKind::Host(tag.clone()),
            ElementType::Text => FiberKind::Text,
            ElementType::Component(component) => FiberKind::Component(component.clone()),
        }
    }

    /// Same-type test used by the reconciler. All text elements match.
    pub fn matches(&self, ty: &ElementType) -> bool {
        match (self, ty) {
            (FiberKind::Host(a), ElementType::Host(b)) => a == b,
            (FiberKind::Text, ElementType::Text) => true,
            (FiberKind::Component(a), ElementType::Component(b)) => a == b,
            _ => false,
        }
    }

    pub fn host_kind(&self) -> Option<HostKind> {
        match self {
            FiberKind::Host(tag) => Some(HostKind::Element(tag.clone())),
            FiberKind::Text => Some(HostKind::Text),
            FiberKind::Root | FiberKind::Component(_) => None,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, FiberKind::Component(_))
    }
}

impl fmt::Display for FiberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberKind::Root => f.write_str("#root"),
            FiberKind::Host(tag) => f.write_str(tag),
            FiberKind::Text => f.write_str("#text"),
            FiberKind::Component(component) => {
                let name = component.name();
                let short = name.rsplit("::").find(|s| !s.starts_with('{')).unwrap_or(name);
                write!(f, "<{short}>")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EffectTag {
    #[default]
    None,
    Placement,
    Update,
    Delete,
}

pub struct Fiber {
    pub kind: FiberKind,
    pub props: Rc<Props>,
    pub state_node: Option<NodeId>,
    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub alternate: Option<FiberId>,
    pub effect_tag: EffectTag,
    pub hooks: Vec<HookCell>,
    pub node_ref: Option<NodeRef>,
    pub generation: u64,
}

impl Fiber {
    pub fn root(
        container: NodeId,
        props: Rc<Props>,
        alternate: Option<FiberId>,
        generation: u64,
    ) -> Self {
        Self {
            kind: FiberKind::Root,
            props,
            state_node: Some(container),
            parent: None,
            child: None,
            sibling: None,
            alternate,
            effect_tag: EffectTag::None,
            hooks: Vec::new(),
            node_ref: None,
            generation,
        }
    }

    /// A fiber with no previous counterpart.
    pub fn placed(element: &Element, parent: FiberId, generation: u64) -> Self {
        Self {
            kind: FiberKind::from_element(&element.ty),
            props: element.props.clone(),
            state_node: None,
            parent: Some(parent),
            child: None,
            sibling: None,
            alternate: None,
            effect_tag: EffectTag::Placement,
            hooks: Vec::new(),
            node_ref: element.node_ref.clone(),
            generation,
        }
    }

    /// Next generation of `old`, carrying the new element's props.
    pub fn updated(
        element: &Element,
        parent: FiberId,
        old_id: FiberId,
        old: &Fiber,
        generation: u64,
    ) -> Self {
        Self {
            kind: FiberKind::from_element(&element.ty),
            props: element.props.clone(),
            state_node: old.state_node,
            parent: Some(parent),
            child: None,
            sibling: None,
            alternate: Some(old_id),
            effect_tag: EffectTag::Update,
            hooks: old.hooks.clone(),
            node_ref: element.node_ref.clone(),
            generation,
        }
    }

    pub fn label(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("kind", &self.kind)
            .field("state_node", &self.state_node)
            .field("effect_tag", &self.effect_tag)
            .field("hooks", &self.hooks.len())
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Default)]
pub struct FiberArena {
    fibers: SlotMap<FiberId, Fiber>,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fiber: Fiber) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(FiberId, &mut Fiber) -> bool) {
        self.fibers.retain(|id, fiber| keep(id, fiber));
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (FiberId, &mut Fiber)> {
        self.fibers.iter_mut()
    }

    /// Child fibers of `id`, in sibling order.
    pub fn children(&self, id: FiberId) -> SmallVec<[FiberId; 8]> {
        let mut out = SmallVec::new();
        let mut cursor = self.get(id).and_then(|f| f.child);
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.get(child).and_then(|f| f.sibling);
        }
        out
    }

    /// Pre-order successor of `id`: its first child, else the nearest
    /// sibling of itself or an ancestor.
    pub fn next_in_preorder(&self, id: FiberId) -> Option<FiberId> {
        let fiber = self.get(id)?;
        if let Some(child) = fiber.child {
            return Some(child);
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let fiber = self.get(current)?;
            if let Some(sibling) = fiber.sibling {
                return Some(sibling);
            }
            cursor = fiber.parent;
        }
        None
    }

    /// Host node of the nearest ancestor that owns one.
    pub fn host_parent(&self, id: FiberId) -> Option<NodeId> {
        let mut cursor = self.get(id)?.parent;
        while let Some(current) = cursor {
            let fiber = self.get(current)?;
            if let Some(node) = fiber.state_node {
                return Some(node);
            }
            cursor = fiber.parent;
        }
        None
    }

    /// First host nodes found under `id`, descending through components.
    pub fn host_nodes(&self, id: FiberId) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        self.collect_host_nodes(id, &mut out);
        out
    }

    fn collect_host_nodes(&self, id: FiberId, out: &mut SmallVec<[NodeId; 4]>) {
        for host in self.host_fibers(id) {
            if let Some(node) = self.get(host).and_then(|f| f.state_node) {
                out.push(node);
            }
        }
    }

    /// Fibers owning the nodes returned by [`host_nodes`](Self::host_nodes).
    pub fn host_fibers(&self, id: FiberId) -> SmallVec<[FiberId; 4]> {
        let mut out = SmallVec::new();
        self.collect_host_fibers(id, &mut out);
        out
    }

    fn collect_host_fibers(&self, id: FiberId, out: &mut SmallVec<[FiberId; 4]>) {
        let Some(fiber) = self.get(id) else {
            return;
        };
        if fiber.state_node.is_some() {
            out.push(id);
            return;
        }
        for child in self.children(id) {
            self.collect_host_fibers(child, out);
        }
    }

    /// Unlinks `id` from its parent's child list.
    pub fn detach(&mut self, id: FiberId) {
        let Some((parent, next)) = self.get(id).map(|f| (f.parent, f.sibling)) else {
            return;
        };
        if let Some(parent) = parent.filter(|&p| self.contains(p)) {
            if self.fibers[parent].child == Some(id) {
                self.fibers[parent].child = next;
            } else {
                let mut cursor = self.fibers[parent].child;
                while let Some(current) = cursor {
                    let sibling = self.fibers[current].sibling;
                    if sibling == Some(id) {
                        self.fibers[current].sibling = next;
                        break;
                    }
                    cursor = sibling;
                }
            }
        }
        let fiber = &mut self.fibers[id];
        fiber.parent = None;
        fiber.sibling = None;
    }

    /// Frees `id` and everything below it. Call [`detach`](Self::detach)
    /// first if the parent still links to it.
    pub fn remove_subtree(&mut self, id: FiberId) {
        for child in self.children(id) {
            self.remove_subtree(child);
        }
        self.fibers.remove(id);
    }

    /// Indented outline of the subtree under `root`.
    pub fn dump(&self, root: Option<FiberId>) -> String {
        let mut output = String::new();
        match root {
            Some(root) => self.dump_fiber(&mut output, root, 0),
            None => output.push_str("(no root)\n"),
        }
        output
    }

    fn dump_fiber(&self, output: &mut String, id: FiberId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(fiber) = self.get(id) else {
            output.push_str(&format!("{indent}(missing)\n"));
            return;
        };
        match fiber.state_node {
            Some(node) => output.push_str(&format!("{indent}{} [{node}]\n", fiber.kind)),
            None => output.push_str(&format!("{indent}{}\n", fiber.kind)),
        }
        for child in self.children(id) {
            self.dump_fiber(output, child, depth + 1);
        }
    }
}

impl Index<FiberId> for FiberArena {
    type Output = Fiber;

    fn index(&self, id: FiberId) -> &Fiber {
        &self.fibers[id]
    }
}

impl IndexMut<FiberId> for FiberArena {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber {
        &mut self.fibers[id]
    }
}
