//! Contract between the engine and the mutable host tree.

use std::collections::BTreeMap;
use std::fmt;

use crate::element::{Listener, PropValue, Props, Tag};
use crate::error::HostError;
use crate::NodeId;

const STYLE: &str = "style";

#[derive(Clone, Debug, PartialEq)]
pub enum HostKind {
    Element(Tag),
    Text,
}

/// Mutation primitives for a host tree.
///
/// Node handles are allocated by the adapter. The engine only hands them back;
/// it never inspects them.
pub trait HostAdapter {
    /// Creates a detached node with its initial attributes and listeners.
    fn create_node(&mut self, kind: &HostKind, props: &Props) -> Result<NodeId, HostError>;

    /// Brings `node` from `old` to `new`. Implementations should apply
    /// [`diff_props`] so every host shares the same patch semantics.
    fn patch_node(&mut self, node: NodeId, old: &Props, new: &Props) -> Result<(), HostError>;

    /// Attaches `node` under `parent`, before `before` or at the end.
    fn insert_node(
        &mut self,
        parent: NodeId,
        node: NodeId,
        before: Option<NodeId>,
    ) -> Result<(), HostError>;

    fn remove_node(&mut self, parent: NodeId, node: NodeId) -> Result<(), HostError>;
}

/// Props whose name starts with `on` are event listeners.
pub fn is_listener(name: &str) -> bool {
    name.starts_with("on")
}

/// `onClick` and `onclick` both bind `click`.
pub fn event_name(name: &str) -> String {
    name.get(2..).unwrap_or_default().to_lowercase()
}

/// Props that end up as host attributes.
pub fn is_attribute(name: &str) -> bool {
    !is_listener(name)
}

#[derive(Clone)]
pub enum PropPatch {
    RemoveListener { event: String, listener: Listener },
    AddListener { event: String, listener: Listener },
    ClearAttribute { name: String },
    SetAttribute { name: String, value: PropValue },
    SetStyle { key: String, value: Option<String> },
}

impl fmt::Debug for PropPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropPatch::RemoveListener { event, .. } => write!(f, "RemoveListener({event})"),
            PropPatch::AddListener { event, .. } => write!(f, "AddListener({event})"),
            PropPatch::ClearAttribute { name } => write!(f, "ClearAttribute({name})"),
            PropPatch::SetAttribute { name, value } => write!(f, "SetAttribute({name}={value:?})"),
            PropPatch::SetStyle { key, value } => write!(f, "SetStyle({key}={value:?})"),
        }
    }
}

/// Patches that turn `old` into `new`.
///
/// Order: stale listeners are unbound, new listeners bound, removed attributes
/// cleared, then added or changed attributes set. A style map present on both
/// sides is diffed per key. Listener props without a listener value are ignored.
pub fn diff_props(old: &Props, new: &Props) -> Vec<PropPatch> {
    let mut patches = Vec::new();
    let old_entries = old.entries();
    let new_entries = new.entries();

    for (name, value) in old_entries.iter().filter(|(n, _)| is_listener(n)) {
        let Some(listener) = value.as_listener() else {
            continue;
        };
        if new.get(name) != Some(*value) {
            patches.push(PropPatch::RemoveListener {
                event: event_name(name),
                listener: listener.clone(),
            });
        }
    }

    for (name, value) in new_entries.iter().filter(|(n, _)| is_listener(n)) {
        let Some(listener) = value.as_listener() else {
            continue;
        };
        if old.get(name) != Some(*value) {
            patches.push(PropPatch::AddListener {
                event: event_name(name),
                listener: listener.clone(),
            });
        }
    }

    for (name, _) in old_entries.iter().filter(|(n, _)| is_attribute(n)) {
        if new.get(name).is_none() {
            patches.push(PropPatch::ClearAttribute {
                name: (*name).to_owned(),
            });
        }
    }

    for (name, value) in new_entries.iter().filter(|(n, _)| is_attribute(n)) {
        let previous = old.get(name);
        if previous == Some(*value) {
            continue;
        }
        match (*name, previous, value) {
            (STYLE, Some(PropValue::Style(before)), PropValue::Style(after)) => {
                diff_style(before, after, &mut patches);
            }
            _ => patches.push(PropPatch::SetAttribute {
                name: (*name).to_owned(),
                value: (*value).clone(),
            }),
        }
    }

    patches
}

fn diff_style(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
    patches: &mut Vec<PropPatch>,
) {
    for key in before.keys().filter(|k| !after.contains_key(*k)) {
        patches.push(PropPatch::SetStyle {
            key: key.clone(),
            value: None,
        });
    }
    for (key, value) in after {
        if before.get(key) != Some(value) {
            patches.push(PropPatch::SetStyle {
                key: key.clone(),
                value: Some(value.clone()),
            });
        }
    }
}

/// Patches that initialise a freshly created node.
pub fn initial_patches(props: &Props) -> Vec<PropPatch> {
    diff_props(&Props::default(), props)
}
