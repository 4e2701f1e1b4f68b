use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use vellum_core::{BuildOutput, ComponentId, ComponentRef};

/// Every component output of one build pass.
#[derive(Default)]
pub struct BuildResults {
    root: Option<ComponentId>,
    outputs: FxHashMap<ComponentId, BuildOutput>,
    order: Vec<ComponentRef>,
}

impl BuildResults {
    /// Output of the root component.
    pub fn out(&self) -> Option<&BuildOutput> {
        self.root.and_then(|id| self.outputs.get(&id))
    }

    pub fn root_id(&self) -> Option<ComponentId> {
        self.root
    }

    pub fn result_for<T: ?Sized>(&self, component: &Rc<RefCell<T>>) -> Option<&BuildOutput> {
        self.outputs.get(&ComponentId::of(component))
    }

    pub fn result_for_id(&self, id: ComponentId) -> Option<&BuildOutput> {
        self.outputs.get(&id)
    }

    /// Components in the depth-first order they were built.
    pub fn components(&self) -> impl Iterator<Item = &ComponentRef> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub(crate) fn set_root(&mut self, id: ComponentId) {
        self.root = Some(id);
    }

    pub(crate) fn insert(&mut self, component: &ComponentRef, output: BuildOutput) {
        let id = ComponentId::of(component);
        if self.outputs.insert(id, output).is_none() {
            self.order.push(component.clone());
        }
    }
}

impl std::fmt::Debug for BuildResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildResults")
            .field("root", &self.root)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}
