//! Immutable element descriptions and the builder used to produce them.

use std::any::{type_name, Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::error::RenderError;
use crate::hash::{hash_key, Map};
use crate::mutable_ref::MutableRef;
use crate::NodeId;

/// Prop carrying the content of a text element.
pub const NODE_VALUE: &str = "nodeValue";

pub type Tag = Rc<str>;
pub type Listener = Rc<dyn Fn(&Event)>;

/// What a component body produces once normalised.
pub type Rendered = Result<Option<Element>, RenderError>;

/// Host event delivered to a listener prop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: Rc<str>,
    pub target: NodeId,
}

impl Event {
    pub fn new(kind: impl Into<Rc<str>>, target: NodeId) -> Self {
        Self {
            kind: kind.into(),
            target,
        }
    }
}

/// Converts a component's return value into a [`Rendered`].
pub trait IntoRender {
    fn into_render(self) -> Rendered;
}

impl IntoRender for Element {
    fn into_render(self) -> Rendered {
        Ok(Some(self))
    }
}

impl IntoRender for Option<Element> {
    fn into_render(self) -> Rendered {
        Ok(self)
    }
}

impl<T, E> IntoRender for Result<T, E>
where
    T: IntoRender,
    E: Into<RenderError>,
{
    fn into_render(self) -> Rendered {
        match self {
            Ok(output) => output.into_render(),
            Err(err) => Err(err.into()),
        }
    }
}

/// A function component.
///
/// Identity is the Rust type of the function or closure it was built from, so
/// the same `fn` item passed on every render is recognised as the same type.
/// Bodies whose type is shared by many functions (`fn` pointers, boxed
/// closures) are told apart by address, or by an explicit identity given to
/// [`Component::with_identity`].
#[derive(Clone)]
pub struct Component {
    id: ComponentId,
    name: &'static str,
    render: Rc<dyn Fn(&Props) -> Rendered>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ComponentId {
    ty: TypeId,
    instance: u64,
}

/// Distinguishes bodies that share a Rust type. Zero for types that only
/// ever stand for one function.
fn instance_of<F, O>(body: &F) -> u64
where
    F: Fn(&Props) -> O + 'static,
    O: 'static,
{
    let body: &dyn Any = body;
    if let Some(f) = body.downcast_ref::<fn(&Props) -> O>() {
        return *f as usize as u64;
    }
    if let Some(f) = body.downcast_ref::<Box<dyn Fn(&Props) -> O>>() {
        let data: *const dyn Fn(&Props) -> O = &**f;
        return data.cast::<()>() as usize as u64;
    }
    0
}

impl Component {
    pub fn new<F, O>(body: F) -> Self
    where
        F: Fn(&Props) -> O + 'static,
        O: IntoRender + 'static,
    {
        Self {
            id: ComponentId {
                ty: TypeId::of::<F>(),
                instance: instance_of(&body),
            },
            name: type_name::<F>(),
            render: Rc::new(move |props| body(props).into_render()),
        }
    }

    /// Same body, identified by `identity` instead of its address. Two
    /// components with equal identities and body types reuse each other's
    /// fiber and hooks.
    pub fn with_identity(mut self, identity: impl Hash) -> Self {
        self.id.instance = hash_key(&identity);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn render(&self, props: &Props) -> Rendered {
        (self.render)(props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementType {
    Host(Tag),
    Text,
    Component(Component),
}

impl From<&str> for ElementType {
    fn from(tag: &str) -> Self {
        ElementType::Host(Rc::from(tag))
    }
}

impl From<Component> for ElementType {
    fn from(component: Component) -> Self {
        ElementType::Component(component)
    }
}

#[derive(Clone)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Style(BTreeMap<String, String>),
    Listener(Listener),
    Any(Rc<dyn Any>),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_listener(&self) -> Option<&Listener> {
        match self {
            PropValue::Listener(l) => Some(l),
            _ => None,
        }
    }

    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        match self {
            PropValue::Any(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Text form used when the value is written as a host attribute.
    /// Listeners and opaque values have none.
    pub fn to_attribute(&self) -> Option<String> {
        match self {
            PropValue::Str(s) => Some(s.to_string()),
            PropValue::Int(v) => Some(v.to_string()),
            PropValue::Float(v) => Some(v.to_string()),
            PropValue::Bool(v) => Some(v.to_string()),
            PropValue::Style(map) => Some(
                map.iter()
                    .map(|(k, v)| format!("{k}: {v};"))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            PropValue::Listener(_) | PropValue::Any(_) => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Style(a), PropValue::Style(b)) => a == b,
            (PropValue::Listener(a), PropValue::Listener(b)) => Rc::ptr_eq(a, b),
            (PropValue::Any(a), PropValue::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "{s:?}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Style(map) => write!(f, "{map:?}"),
            PropValue::Listener(_) => f.write_str("<listener>"),
            PropValue::Any(_) => f.write_str("<any>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value.into())
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<BTreeMap<String, String>> for PropValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        PropValue::Style(value)
    }
}

/// Named values plus the ordered child elements.
#[derive(Clone, Default, PartialEq)]
pub struct Props {
    values: Map<Rc<str>, PropValue>,
    pub children: Vec<Element>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<PropValue>) -> Option<PropValue> {
        self.values.insert(Rc::from(name), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<PropValue> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropValue::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(PropValue::as_int)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(PropValue::as_bool)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries sorted by name, for deterministic patching and output.
    pub fn entries(&self) -> Vec<(&str, &PropValue)> {
        let mut entries: Vec<_> = self.values.iter().map(|(k, v)| (&**k, v)).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.entries() {
            map.entry(&name, value);
        }
        if !self.children.is_empty() {
            map.entry(&"children", &self.children.len());
        }
        map.finish()
    }
}

/// Target populated with the host node an element ends up owning.
#[derive(Clone)]
pub enum NodeRef {
    Callback(Rc<dyn Fn(Option<NodeId>)>),
    Holder(MutableRef<Option<NodeId>>),
}

impl NodeRef {
    pub fn callback(f: impl Fn(Option<NodeId>) + 'static) -> Self {
        NodeRef::Callback(Rc::new(f))
    }

    pub fn resolve(&self, node: Option<NodeId>) {
        match self {
            NodeRef::Callback(f) => f(node),
            NodeRef::Holder(holder) => {
                holder.set(node);
            }
        }
    }
}

impl From<MutableRef<Option<NodeId>>> for NodeRef {
    fn from(holder: MutableRef<Option<NodeId>>) -> Self {
        NodeRef::Holder(holder)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NodeRef::Callback(a), NodeRef::Callback(b)) => Rc::ptr_eq(a, b),
            (NodeRef::Holder(a), NodeRef::Holder(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Callback(_) => f.write_str("NodeRef::Callback"),
            NodeRef::Holder(h) => write!(f, "NodeRef::Holder({:?})", *h.borrow()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub ty: ElementType,
    pub props: Rc<Props>,
    pub node_ref: Option<NodeRef>,
}

impl Element {
    pub fn new(ty: ElementType, props: Props) -> Self {
        Self {
            ty,
            props: Rc::new(props),
            node_ref: None,
        }
    }

    pub fn host(tag: &str) -> Self {
        Self::new(ElementType::from(tag), Props::new())
    }

    pub fn text(value: impl Into<PropValue>) -> Self {
        Self::new(ElementType::Text, Props::new().with(NODE_VALUE, value))
    }

    pub fn component<F, O>(body: F) -> Self
    where
        F: Fn(&Props) -> O + 'static,
        O: IntoRender + 'static,
    {
        Self::new(ElementType::Component(Component::new(body)), Props::new())
    }

    /// Component element whose identity is `identity` rather than the body's
    /// address. Meant for type-erased bodies such as `Box<dyn Fn>`.
    pub fn component_as<F, O>(identity: impl Hash, body: F) -> Self
    where
        F: Fn(&Props) -> O + 'static,
        O: IntoRender + 'static,
    {
        let component = Component::new(body).with_identity(identity);
        Self::new(ElementType::Component(component), Props::new())
    }

    fn props_mut(&mut self) -> &mut Props {
        Rc::make_mut(&mut self.props)
    }

    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props_mut().insert(name, value);
        self
    }

    pub fn style(mut self, key: &str, value: &str) -> Self {
        let props = self.props_mut();
        let mut style = match props.get("style") {
            Some(PropValue::Style(map)) => map.clone(),
            _ => BTreeMap::new(),
        };
        style.insert(key.to_owned(), value.to_owned());
        props.insert("style", style);
        self
    }

    /// Binds a listener for `event` (stored as the `on{event}` prop).
    pub fn on(mut self, event: &str, listener: impl Fn(&Event) + 'static) -> Self {
        let listener: Listener = Rc::new(listener);
        self.props_mut()
            .insert(&format!("on{event}"), PropValue::Listener(listener));
        self
    }

    pub fn child(mut self, child: impl Into<Element>) -> Self {
        self.props_mut().children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Element>,
    {
        self.props_mut()
            .children
            .extend(children.into_iter().map(Into::into));
        self
    }

    pub fn with_ref(mut self, node_ref: impl Into<NodeRef>) -> Self {
        self.node_ref = Some(node_ref.into());
        self
    }

    pub fn is_text(&self) -> bool {
        matches!(self.ty, ElementType::Text)
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::text(value)
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::text(value)
    }
}

macro_rules! text_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Element {
                fn from(value: $ty) -> Self {
                    Element::text(value.to_string())
                }
            }
        )*
    };
}

text_from_number!(i32, i64, u32, u64, usize, f64);

/// Builds an element from a type, its props and a list of children.
pub fn h(ty: impl Into<ElementType>, props: Props, children: Vec<Element>) -> Element {
    let mut props = props;
    props.children = children;
    Element::new(ty.into(), props)
}

/// Collects children, turning strings and numbers into text elements.
#[macro_export]
macro_rules! children {
    () => { ::std::vec::Vec::<$crate::element::Element>::new() };
    ($($child:expr),+ $(,)?) => {
        ::std::vec![$($crate::element::Element::from($child)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting(props: &Props) -> Element {
        Element::host("p").child(props.str("name").unwrap_or("nobody").to_owned())
    }

    fn farewell(_: &Props) -> Option<Element> {
        None
    }

    #[test]
    fn children_macro_normalises_scalars() {
        let tree = h(
            "div",
            Props::new().with("id", "root"),
            children![Element::host("span"), "hello", 42],
        );
        assert_eq!(tree.props.children.len(), 3);
        assert!(!tree.props.children[0].is_text());
        assert_eq!(tree.props.children[1].props.str(NODE_VALUE), Some("hello"));
        assert_eq!(tree.props.children[2].props.str(NODE_VALUE), Some("42"));
        assert_eq!(tree.props.str("id"), Some("root"));
    }

    #[test]
    fn component_identity_follows_function_type() {
        let a = Component::new(greeting);
        let b = Component::new(greeting);
        let c = Component::new(farewell);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.name().ends_with("greeting"));
    }

    #[test]
    fn fn_pointers_are_told_apart_by_address() {
        fn shout(_: &Props) -> Element {
            Element::host("strong")
        }

        let pointers: [fn(&Props) -> Element; 2] = [greeting, shout];
        let a = Component::new(pointers[0]);
        let b = Component::new(pointers[1]);
        assert_ne!(a, b);
        assert_eq!(a, Component::new(pointers[0]));

        let boxed: Box<dyn Fn(&Props) -> Element> = Box::new(shout);
        let erased = Component::new(boxed);
        assert_ne!(erased, a);

        let first = Component::new(Box::new(greeting) as Box<dyn Fn(&Props) -> Element>);
        let second = Component::new(Box::new(shout) as Box<dyn Fn(&Props) -> Element>);
        assert_eq!(first.clone().with_identity("slot"), second.with_identity("slot"));
        assert_ne!(first.with_identity("left"), Component::new(greeting));
    }

    #[test]
    fn component_render_normalises_output() {
        let props = Props::new().with("name", "ada");
        let rendered = Component::new(greeting).render(&props).unwrap().unwrap();
        assert_eq!(rendered.props.children[0].props.str(NODE_VALUE), Some("ada"));
        assert!(Component::new(farewell).render(&props).unwrap().is_none());

        let failing = Component::new(|_: &Props| -> Result<Element, &'static str> { Err("boom") });
        assert_eq!(failing.render(&props), Err(RenderError::new("boom")));
    }

    #[test]
    fn listeners_compare_by_identity() {
        let button = Element::host("button").on("click", |_| {});
        let same = button.clone();
        let other = Element::host("button").on("click", |_| {});
        assert_eq!(button.props.get("onclick"), same.props.get("onclick"));
        assert_ne!(button.props.get("onclick"), other.props.get("onclick"));
    }

    #[test]
    fn style_accumulates_keys() {
        let el = Element::host("div").style("color", "red").style("margin", "0");
        assert_eq!(
            el.props.get("style").and_then(PropValue::to_attribute).as_deref(),
            Some("color: red; margin: 0;")
        );
    }
}
