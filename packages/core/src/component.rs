use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use vellum_common::EventEnv;

use crate::build_in::BuildIn;
use crate::build_out::BuildOutput;

/// A unit of UI that produces virtual nodes from its own state.
///
/// Every hook except `build` is optional. `before_build` runs each pass
/// before `build`; by default it forwards to `compute`.
pub trait Component: Any {
    fn build(&mut self, input: &mut BuildIn<'_>) -> BuildOutput;

    /// First time this instance is seen by the build engine.
    fn init(&mut self, _ctx: &LifecycleCtx) {}

    fn before_build(&mut self, ctx: &LifecycleCtx) {
        self.compute(ctx);
    }

    fn compute(&mut self, _ctx: &LifecycleCtx) {}

    /// After a render pass that included this instance.
    fn rendered(&mut self, _ctx: &RenderedCtx) {}

    /// Once, after the first pass in which this instance was not reachable.
    fn destroy(&mut self, _ctx: &LifecycleCtx) {}
}

pub type ComponentRef = Rc<RefCell<dyn Component>>;

/// Wrap a component for sharing between the tree and the identity cache.
pub fn component<T: Component>(value: T) -> Rc<RefCell<T>> {
    Rc::new(RefCell::new(value))
}

/// Identity of a component instance, stable for as long as the instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(usize);

impl ComponentId {
    pub fn of<T: ?Sized>(component: &Rc<RefCell<T>>) -> Self {
        ComponentId(Rc::as_ptr(component) as *const () as usize)
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleCtx {
    env: EventEnv,
}

impl LifecycleCtx {
    pub fn new(env: EventEnv) -> Self {
        Self { env }
    }

    pub fn event_env(&self) -> &EventEnv {
        &self.env
    }
}

#[derive(Debug, Clone)]
pub struct RenderedCtx {
    env: EventEnv,
    first: bool,
}

impl RenderedCtx {
    pub fn new(env: EventEnv, first: bool) -> Self {
        Self { env, first }
    }

    pub fn event_env(&self) -> &EventEnv {
        &self.env
    }

    /// True on the first render that included this instance.
    pub fn first(&self) -> bool {
        self.first
    }
}
