//! Immutable element descriptions produced by components.
//!
//! A [`Descriptor`] is the input to reconciliation: a tree of host
//! elements, text, lists and component invocations. Descriptors are cheap
//! to clone; element payloads sit behind `Rc`.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::context::{ContextConsumer, ErasedContext};
use crate::hooks::Hooks;
use crate::value::{EventHandler, Value};
use crate::work_node::WorkTag;

/// Sibling-scoped identity used to match elements across renders.
pub type Key = Rc<str>;

/// Output of a component render.
#[derive(Clone, Default)]
pub enum Descriptor {
    #[default]
    Empty,
    Text(Rc<str>),
    List(Vec<Descriptor>),
    Element(Rc<Element>),
}

impl Descriptor {
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Descriptor::Text(text.into())
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Descriptor>,
    {
        Descriptor::List(items.into_iter().map(Into::into).collect())
    }

    /// Unkeyed fragment; unwrapped in place when it is a component's whole output.
    pub fn fragment<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Descriptor>,
    {
        ElementBuilder::fragment().children(children).build()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Descriptor::Empty)
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Descriptor::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn as_text(&self) -> Option<&Rc<str>> {
        match self {
            Descriptor::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Descriptor::Empty, Descriptor::Empty) => true,
            (Descriptor::Text(a), Descriptor::Text(b)) => a == b,
            (Descriptor::List(a), Descriptor::List(b)) => a == b,
            (Descriptor::Element(a), Descriptor::Element(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Empty => f.write_str("Empty"),
            Descriptor::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Descriptor::List(items) => f.debug_list().entries(items).finish(),
            Descriptor::Element(element) => element.fmt(f),
        }
    }
}

impl From<&str> for Descriptor {
    fn from(value: &str) -> Self {
        Descriptor::Text(value.into())
    }
}

impl From<String> for Descriptor {
    fn from(value: String) -> Self {
        Descriptor::Text(value.into())
    }
}

impl From<Rc<str>> for Descriptor {
    fn from(value: Rc<str>) -> Self {
        Descriptor::Text(value)
    }
}

impl From<i64> for Descriptor {
    fn from(value: i64) -> Self {
        Descriptor::Text(value.to_string().into())
    }
}

impl From<i32> for Descriptor {
    fn from(value: i32) -> Self {
        Descriptor::Text(value.to_string().into())
    }
}

impl From<usize> for Descriptor {
    fn from(value: usize) -> Self {
        Descriptor::Text(value.to_string().into())
    }
}

impl From<Element> for Descriptor {
    fn from(value: Element) -> Self {
        Descriptor::Element(Rc::new(value))
    }
}

impl From<ElementBuilder> for Descriptor {
    fn from(value: ElementBuilder) -> Self {
        value.build()
    }
}

impl From<Vec<Descriptor>> for Descriptor {
    fn from(value: Vec<Descriptor>) -> Self {
        Descriptor::List(value)
    }
}

impl<T: Into<Descriptor>> From<Option<T>> for Descriptor {
    fn from(value: Option<T>) -> Self {
        value.map_or(Descriptor::Empty, Into::into)
    }
}

/// A typed element with optional key and immutable props.
pub struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) key: Option<Key>,
    pub(crate) props: Rc<Props>,
}

impl Element {
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn props(&self) -> &Props {
        &self.props
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.kind.same_type(&other.kind)
            && self.key == other.key
            && (Rc::ptr_eq(&self.props, &other.props) || self.props == other.props)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.kind.name())
            .field("key", &self.key)
            .field("props", &self.props)
            .finish()
    }
}

/// What an element instantiates.
#[derive(Clone)]
pub enum ElementKind {
    Host(Rc<str>),
    Fragment,
    Function(FunctionComponent),
    Class(ClassComponent),
    Provider(ErasedContext),
    Consumer(ContextConsumer),
    Memo(MemoComponent),
}

impl ElementKind {
    /// Type identity used to decide whether a work node can be reused.
    pub fn same_type(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Fragment, ElementKind::Fragment) => true,
            (ElementKind::Function(a), ElementKind::Function(b)) => a.same(b),
            (ElementKind::Class(a), ElementKind::Class(b)) => a.same(b),
            (ElementKind::Provider(a), ElementKind::Provider(b)) => a.id() == b.id(),
            (ElementKind::Consumer(a), ElementKind::Consumer(b)) => {
                a.context.id() == b.context.id()
            }
            (ElementKind::Memo(a), ElementKind::Memo(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn tag(&self) -> WorkTag {
        match self {
            ElementKind::Host(_) => WorkTag::HostElement,
            ElementKind::Fragment => WorkTag::Fragment,
            ElementKind::Function(_) => WorkTag::FunctionComponent,
            ElementKind::Class(_) => WorkTag::ClassComponent,
            ElementKind::Provider(_) => WorkTag::ContextProvider,
            ElementKind::Consumer(_) => WorkTag::ContextConsumer,
            ElementKind::Memo(_) => WorkTag::Memoized,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ElementKind::Host(tag) => tag,
            ElementKind::Fragment => "Fragment",
            ElementKind::Function(component) => component.name(),
            ElementKind::Class(component) => component.name(),
            ElementKind::Provider(_) => "Provider",
            ElementKind::Consumer(_) => "Consumer",
            ElementKind::Memo(component) => component.inner.name(),
        }
    }
}

/// Immutable props of an element. Attribute order is insertion order.
#[derive(Clone, Default, PartialEq)]
pub struct Props {
    attrs: IndexMap<Rc<str>, Value>,
    children: Descriptor,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_handler(&self, key: &str) -> Option<&EventHandler> {
        self.get(key).and_then(Value::as_handler)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.attrs.iter()
    }

    pub fn children(&self) -> &Descriptor {
        &self.children
    }

    pub(crate) fn with_children(children: Descriptor) -> Self {
        Self {
            attrs: IndexMap::new(),
            children,
        }
    }

    pub(crate) fn from_text(text: Rc<str>) -> Self {
        Self::with_children(Descriptor::Text(text))
    }

    pub(crate) fn text(&self) -> Option<&Rc<str>> {
        self.children.as_text()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.attrs {
            map.entry(key, value);
        }
        if !self.children.is_empty() {
            map.entry(&"children", &self.children);
        }
        map.finish()
    }
}

/// Builder for [`Element`] descriptors.
pub struct ElementBuilder {
    kind: ElementKind,
    key: Option<Key>,
    attrs: IndexMap<Rc<str>, Value>,
    children: Vec<Descriptor>,
}

impl ElementBuilder {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            attrs: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn fragment() -> Self {
        Self::new(ElementKind::Fragment)
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn on(self, event: impl Into<Rc<str>>, handler: impl Fn() + 'static) -> Self {
        self.prop(event, Value::handler(handler))
    }

    pub fn child(mut self, child: impl Into<Descriptor>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn text(self, text: impl Into<Rc<str>>) -> Self {
        self.child(Descriptor::Text(text.into()))
    }

    /// Appends the items as one nested list child.
    pub fn children<I>(self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Descriptor>,
    {
        self.child(Descriptor::list(children))
    }

    pub fn build(mut self) -> Descriptor {
        let children = match self.children.len() {
            0 => Descriptor::Empty,
            1 => self.children.pop().unwrap_or_default(),
            _ => Descriptor::List(self.children),
        };
        Descriptor::Element(Rc::new(Element {
            kind: self.kind,
            key: self.key,
            props: Rc::new(Props {
                attrs: self.attrs,
                children,
            }),
        }))
    }
}

/// Starts a host element with the given tag.
pub fn element(tag: impl Into<Rc<str>>) -> ElementBuilder {
    ElementBuilder::new(ElementKind::Host(tag.into()))
}

type RenderFn = dyn Fn(&mut Hooks<'_>, &Props) -> Descriptor;

/// A function component. Identity is the render closure's allocation, so
/// build each component once and clone the handle.
#[derive(Clone)]
pub struct FunctionComponent {
    name: Rc<str>,
    render: Rc<RenderFn>,
}

impl FunctionComponent {
    pub fn new(
        name: impl Into<Rc<str>>,
        render: impl Fn(&mut Hooks<'_>, &Props) -> Descriptor + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementKind::Function(self.clone()))
    }

    /// Wraps the component so it skips rendering while props are unchanged.
    pub fn memo(&self) -> MemoComponent {
        MemoComponent::new(self.clone())
    }

    pub(crate) fn same(&self, other: &FunctionComponent) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.render), Rc::as_ptr(&other.render))
    }

    pub(crate) fn call(&self, hooks: &mut Hooks<'_>, props: &Props) -> Descriptor {
        (self.render)(hooks, props)
    }
}

impl fmt::Debug for FunctionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FunctionComponent").field(&self.name).finish()
    }
}

type PropsCompare = dyn Fn(&Props, &Props) -> bool;

/// A function component with a props comparison bailout.
#[derive(Clone)]
pub struct MemoComponent {
    pub(crate) inner: FunctionComponent,
    compare: Option<Rc<PropsCompare>>,
}

impl MemoComponent {
    pub fn new(inner: FunctionComponent) -> Self {
        Self {
            inner,
            compare: None,
        }
    }

    /// Replaces the default equality check; return `true` to skip rendering.
    pub fn with_compare(mut self, compare: impl Fn(&Props, &Props) -> bool + 'static) -> Self {
        self.compare = Some(Rc::new(compare));
        self
    }

    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementKind::Memo(self.clone()))
    }

    pub(crate) fn props_equal(&self, previous: &Props, next: &Props) -> bool {
        match &self.compare {
            Some(compare) => compare(previous, next),
            None => previous == next,
        }
    }

    pub(crate) fn same(&self, other: &MemoComponent) -> bool {
        self.inner.same(&other.inner)
    }
}

/// Stateful component with lifecycle callbacks.
pub trait Component: 'static {
    /// Renders children. `context` carries the value of the class's
    /// declared context, if any.
    fn render(&mut self, props: &Props, context: Option<&Value>) -> Descriptor;

    fn component_did_mount(&mut self) {}

    fn component_did_update(&mut self, _previous_props: &Props) {}

    fn component_will_unmount(&mut self) {}
}

type Constructor = dyn Fn(&Props) -> Box<dyn Component>;

/// Constructor handle for a [`Component`] implementation.
#[derive(Clone)]
pub struct ClassComponent {
    name: Rc<str>,
    construct: Rc<Constructor>,
    pub(crate) context_type: Option<ErasedContext>,
}

impl ClassComponent {
    pub fn new<C: Component>(
        name: impl Into<Rc<str>>,
        construct: impl Fn(&Props) -> C + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            construct: Rc::new(move |props: &Props| Box::new(construct(props)) as Box<dyn Component>),
            context_type: None,
        }
    }

    pub fn with_context<T: 'static>(mut self, context: &crate::Context<T>) -> Self {
        self.context_type = Some(context.erased().clone());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementKind::Class(self.clone()))
    }

    pub(crate) fn construct(&self, props: &Props) -> Box<dyn Component> {
        (self.construct)(props)
    }

    pub(crate) fn same(&self, other: &ClassComponent) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.construct), Rc::as_ptr(&other.construct))
    }
}
