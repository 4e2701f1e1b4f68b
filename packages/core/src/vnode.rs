use std::any::Any;
use std::fmt;
use std::ops::Index;
use std::rc::Rc;

use serde::Serialize;

use crate::attr::{AttrValue, AttributeLister};
use crate::component::ComponentRef;
use crate::error::{TreeError, TreeResult};
use crate::event::DomEvent;

/// Index of a node inside a [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
    /// Structural grouping placeholder. Its children are rendered in its
    /// place and it never reaches the host.
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VAttribute {
    pub namespace: String,
    pub key: String,
    pub val: String,
}

impl VAttribute {
    pub fn new(key: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            key: key.into(),
            val: val.into(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// A JS-visible property with its value already encoded as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VProperty {
    pub key: String,
    pub json_val: Vec<u8>,
}

impl VProperty {
    pub fn json<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> serde_json::Result<Self> {
        Ok(Self {
            key: key.into(),
            json_val: serde_json::to_vec(value)?,
        })
    }

    pub fn raw(key: impl Into<String>, json_val: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            json_val: json_val.into(),
        }
    }
}

/// Opaque reference to a live host element, handed to element callbacks.
#[derive(Clone)]
pub struct ElementHandle(Rc<dyn Any>);

impl ElementHandle {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ElementHandle")
    }
}

pub type ElementCallback = Rc<dyn Fn(&ElementHandle)>;

/// Declared event listener on an element.
#[derive(Clone)]
pub struct DomEventHandlerSpec {
    pub event_type: String,
    pub capture: bool,
    pub passive: bool,
    pub handler: Rc<dyn Fn(&DomEvent)>,
}

impl DomEventHandlerSpec {
    pub fn new(event_type: impl Into<String>, handler: impl Fn(&DomEvent) + 'static) -> Self {
        Self {
            event_type: event_type.into(),
            capture: false,
            passive: false,
            handler: Rc::new(handler),
        }
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }
}

impl fmt::Debug for DomEventHandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomEventHandlerSpec")
            .field("event_type", &self.event_type)
            .field("capture", &self.capture)
            .field("passive", &self.passive)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Links {
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

/// One node of the virtual tree. Tree links are owned by the arena and only
/// change through its checked operations.
#[derive(Clone)]
pub struct VNode {
    pub kind: NodeKind,
    /// Tag name for elements, content for text and comments.
    pub data: String,
    pub namespace: String,
    pub attrs: Vec<VAttribute>,
    pub props: Vec<VProperty>,
    /// Raw inner content. When set, children are not rendered.
    pub inner_html: Option<String>,
    pub listeners: Vec<DomEventHandlerSpec>,
    pub js_create: Option<ElementCallback>,
    pub js_populate: Option<ElementCallback>,
    component: Option<ComponentRef>,
    links: Links,
}

impl VNode {
    fn new(kind: NodeKind, data: String) -> Self {
        Self {
            kind,
            data,
            namespace: String::new(),
            attrs: Vec::new(),
            props: Vec::new(),
            inner_html: None,
            listeners: Vec::new(),
            js_create: None,
            js_populate: None,
            component: None,
            links: Links::default(),
        }
    }

    pub fn element(tag: impl Into<String>) -> Self {
        Self::new(NodeKind::Element, tag.into())
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(NodeKind::Text, content.into())
    }

    pub fn comment(content: impl Into<String>) -> Self {
        Self::new(NodeKind::Comment, content.into())
    }

    pub fn fragment() -> Self {
        Self::new(NodeKind::Fragment, String::new())
    }

    /// A node whose contents come from the given component's own output.
    pub fn component(component: ComponentRef) -> Self {
        let mut node = Self::new(NodeKind::Element, String::new());
        node.component = Some(component);
        node
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.attrs.push(VAttribute::new(key, val));
        self
    }

    pub fn with_ns_attr(
        mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        val: impl Into<String>,
    ) -> Self {
        self.attrs
            .push(VAttribute::new(key, val).with_namespace(namespace));
        self
    }

    pub fn with_attr_value(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.add_attr_value(key, value);
        self
    }

    pub fn with_prop(mut self, prop: VProperty) -> Self {
        self.props.push(prop);
        self
    }

    pub fn with_inner_html(mut self, html: impl Into<String>) -> Self {
        self.inner_html = Some(html.into());
        self
    }

    pub fn with_listener(mut self, listener: DomEventHandlerSpec) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn on_create(mut self, callback: impl Fn(&ElementHandle) + 'static) -> Self {
        self.js_create = Some(Rc::new(callback));
        self
    }

    pub fn on_populate(mut self, callback: impl Fn(&ElementHandle) + 'static) -> Self {
        self.js_populate = Some(Rc::new(callback));
        self
    }

    /// Format `value` and add it as an attribute, unless the formatting rules
    /// say the attribute is absent.
    pub fn add_attr_value(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        if let Some(val) = value.into().render() {
            self.attrs.push(VAttribute::new(key, val));
        }
    }

    pub fn add_attribute_list(&mut self, lister: &dyn AttributeLister) {
        self.attrs.extend(lister.attribute_list());
    }

    pub fn component_ref(&self) -> Option<&ComponentRef> {
        self.component.as_ref()
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element && self.component.is_none()
    }

    pub fn is_component(&self) -> bool {
        self.component.is_some()
    }

    pub fn has_element_callbacks(&self) -> bool {
        self.js_create.is_some() || self.js_populate.is_some()
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("kind", &self.kind)
            .field("data", &self.data)
            .field("namespace", &self.namespace)
            .field("attrs", &self.attrs)
            .field("props", &self.props)
            .field("inner_html", &self.inner_html)
            .field("listeners", &self.listeners)
            .field("component", &self.component.is_some())
            .finish()
    }
}

/// Owns every node of one build output. Nodes refer to each other by
/// [`NodeId`] so the tree can be rebuilt cheaply each pass.
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: Vec<VNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a detached node. Any links it carried are discarded.
    pub fn add(&mut self, mut node: VNode) -> NodeId {
        node.links = Links::default();
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Store `node` and append it under `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: VNode) -> TreeResult<NodeId> {
        self.check(parent)?;
        let id = self.add(node);
        self.append_child(parent, id)?;
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&VNode> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut VNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.links.parent)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.links.first_child)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.links.last_child)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.links.prev_sibling)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.links.next_sibling)
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            arena: self,
            next: self.first_child(id),
        }
    }

    /// Delegate `id` to a component. Fails if the node already has children.
    pub fn set_component(&mut self, id: NodeId, component: ComponentRef) -> TreeResult<()> {
        self.check(id)?;
        if self.nodes[id.0].links.first_child.is_some() {
            return Err(TreeError::ComponentWithChildren { node: id });
        }
        self.nodes[id.0].component = Some(component);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.check_attachable(parent, child)?;

        let old_last = self.nodes[parent.0].links.last_child;
        {
            let links = &mut self.nodes[child.0].links;
            links.parent = Some(parent);
            links.prev_sibling = old_last;
        }
        match old_last {
            Some(last) => self.nodes[last.0].links.next_sibling = Some(child),
            None => self.nodes[parent.0].links.first_child = Some(child),
        }
        self.nodes[parent.0].links.last_child = Some(child);
        Ok(())
    }

    /// Insert `child` before `reference` under `parent`. A `None` reference
    /// appends.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> TreeResult<()> {
        let Some(reference) = reference else {
            return self.append_child(parent, child);
        };

        self.check_attachable(parent, child)?;
        self.check(reference)?;
        if self.nodes[reference.0].links.parent != Some(parent) {
            return Err(TreeError::NotAChild {
                parent,
                node: reference,
            });
        }

        let prev = self.nodes[reference.0].links.prev_sibling;
        {
            let links = &mut self.nodes[child.0].links;
            links.parent = Some(parent);
            links.prev_sibling = prev;
            links.next_sibling = Some(reference);
        }
        self.nodes[reference.0].links.prev_sibling = Some(child);
        match prev {
            Some(prev) => self.nodes[prev.0].links.next_sibling = Some(child),
            None => self.nodes[parent.0].links.first_child = Some(child),
        }
        Ok(())
    }

    /// Detach `child` from `parent`. The node stays in the arena.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.check(parent)?;
        self.check(child)?;
        let links = self.nodes[child.0].links;
        if links.parent != Some(parent) {
            return Err(TreeError::NotAChild {
                parent,
                node: child,
            });
        }

        match links.prev_sibling {
            Some(prev) => self.nodes[prev.0].links.next_sibling = links.next_sibling,
            None => self.nodes[parent.0].links.first_child = links.next_sibling,
        }
        match links.next_sibling {
            Some(next) => self.nodes[next.0].links.prev_sibling = links.prev_sibling,
            None => self.nodes[parent.0].links.last_child = links.prev_sibling,
        }
        self.nodes[child.0].links = Links {
            first_child: links.first_child,
            last_child: links.last_child,
            ..Links::default()
        };
        Ok(())
    }

    /// Pre-order walk starting at `start`, following first-child links and
    /// then next-sibling links. Siblings after `start` are visited too. Links
    /// are trusted: a hand-corrupted tree with cycles will not terminate.
    pub fn walk<E>(
        &self,
        start: NodeId,
        mut visit: impl FnMut(NodeId, &VNode) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            visit(id, node)?;
            if let Some(next) = node.links.next_sibling {
                stack.push(next);
            }
            if let Some(first) = node.links.first_child {
                stack.push(first);
            }
        }
        Ok(())
    }

    fn check(&self, id: NodeId) -> TreeResult<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(TreeError::UnknownNode { node: id })
        }
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.check(parent)?;
        self.check(child)?;
        if parent == child {
            return Err(TreeError::SelfAttach { node: child });
        }
        if self.nodes[parent.0].component.is_some() {
            return Err(TreeError::ComponentWithChildren { node: parent });
        }
        let links = &self.nodes[child.0].links;
        if links.parent.is_some() || links.prev_sibling.is_some() || links.next_sibling.is_some() {
            return Err(TreeError::AlreadyAttached { node: child });
        }
        Ok(())
    }
}

impl Index<NodeId> for NodeArena {
    type Output = VNode;

    fn index(&self, id: NodeId) -> &VNode {
        &self.nodes[id.0]
    }
}

pub struct Children<'a> {
    arena: &'a NodeArena,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.arena.next_sibling(current);
        Some(current)
    }
}
