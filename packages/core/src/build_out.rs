use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::component::{Component, ComponentRef};
use crate::vnode::{NodeArena, NodeId};

/// Result of one component build.
///
/// `out` normally holds exactly one node; a document-level component may emit
/// a single `html` node with `head` and `body` children. `css` and `js` are
/// side-channel nodes collected by the renderer from every component.
/// `components` lists nested instances in the order the build used them.
#[derive(Default)]
pub struct BuildOutput {
    pub nodes: NodeArena,
    pub out: Vec<NodeId>,
    pub css: Vec<NodeId>,
    pub js: Vec<NodeId>,
    pub components: Vec<ComponentRef>,
}

impl BuildOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single root node, if there is exactly one.
    pub fn root(&self) -> Option<NodeId> {
        match self.out.as_slice() {
            [root] => Some(*root),
            _ => None,
        }
    }

    pub fn append_css(&mut self, node: NodeId) {
        self.css.push(node);
    }

    pub fn append_js(&mut self, node: NodeId) {
        self.js.push(node);
    }

    /// Record a nested component. Returns the untyped handle to put on a node.
    pub fn add_component<T: Component>(&mut self, instance: &Rc<RefCell<T>>) -> ComponentRef {
        let component: ComponentRef = instance.clone();
        self.components.push(component.clone());
        component
    }
}

impl fmt::Debug for BuildOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOutput")
            .field("nodes", &self.nodes.len())
            .field("out", &self.out)
            .field("css", &self.css)
            .field("js", &self.js)
            .field("components", &self.components.len())
            .finish()
    }
}
