use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use vellum_common::EventEnv;

use crate::cache::ComponentCache;
use crate::comp_key::CompKey;
use crate::component::Component;

/// Hook applied to each newly created component, typically to inject shared
/// dependencies. It receives the component's `RefCell<T>` as `&dyn Any`.
pub type WireFn = Rc<dyn Fn(&dyn Any)>;

/// Borrow a wired component as its concrete type, if it is one.
pub fn downcast_wire<T: Component>(target: &dyn Any) -> Option<RefMut<'_, T>> {
    target
        .downcast_ref::<RefCell<T>>()
        .and_then(|cell| cell.try_borrow_mut().ok())
}

/// Context handed to [`Component::build`].
pub struct BuildIn<'a> {
    cache: &'a mut ComponentCache,
    position_hash: u64,
    env: &'a EventEnv,
    wire: Option<&'a WireFn>,
}

impl<'a> BuildIn<'a> {
    pub fn new(
        cache: &'a mut ComponentCache,
        position_hash: u64,
        env: &'a EventEnv,
        wire: Option<&'a WireFn>,
    ) -> Self {
        Self {
            cache,
            position_hash,
            env,
            wire,
        }
    }

    /// Position of the component being built. Call sites mix this into their
    /// key id so a moved call site does not reuse an unrelated instance.
    pub fn current_position_hash(&self) -> u64 {
        self.position_hash
    }

    pub fn cached_component<T: Component>(&mut self, key: &CompKey) -> Option<Rc<RefCell<T>>> {
        self.cache.cached_component(key)
    }

    pub fn use_component<T: Component>(&mut self, key: CompKey, instance: &Rc<RefCell<T>>) {
        self.cache.use_component(key, instance);
    }

    /// Run the configured wire hook on a freshly created component.
    pub fn wire_component<T: Component>(&self, instance: &Rc<RefCell<T>>) {
        if let Some(wire) = self.wire {
            let target: &RefCell<T> = instance;
            (wire.as_ref())(target as &dyn Any);
        }
    }

    /// Fetch the cached instance for `key` or create one with `create`, wire
    /// new instances, and mark the result as used.
    pub fn reuse_or_create<T: Component>(
        &mut self,
        key: CompKey,
        create: impl FnOnce() -> T,
    ) -> Rc<RefCell<T>> {
        let instance = match self.cached_component::<T>(&key) {
            Some(instance) => instance,
            None => {
                let instance = Rc::new(RefCell::new(create()));
                self.wire_component(&instance);
                instance
            }
        };
        self.use_component(key, &instance);
        instance
    }

    pub fn event_env(&self) -> &EventEnv {
        self.env
    }
}
