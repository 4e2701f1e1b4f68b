use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::comp_key::CompKey;
use crate::component::Component;

struct CacheEntry {
    instance: Rc<dyn Any>,
}

/// Two generations of component instances keyed by call-site identity.
///
/// `previous` holds what the last pass used; `used` collects what this pass
/// uses. Lookups consume entries from `previous`, so each key can be
/// retrieved at most once per pass.
#[derive(Default)]
pub struct ComponentCache {
    previous: FxHashMap<CompKey, CacheEntry>,
    used: FxHashMap<CompKey, CacheEntry>,
}

impl ComponentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last pass's "used" becomes this pass's "previous"; anything that was
    /// not claimed in the last pass is dropped.
    pub fn start_pass(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.used);
        self.used.clear();
    }

    /// Remove and return the instance stored under `key` by the previous pass.
    /// A second call with the same key in one pass returns `None`, as does a
    /// key whose stored instance is of a different type.
    pub fn cached_component<T: Component>(&mut self, key: &CompKey) -> Option<Rc<RefCell<T>>> {
        let entry = self.previous.remove(key)?;
        match entry.instance.downcast::<RefCell<T>>() {
            Ok(instance) => {
                debug!(key_id = key.id, iter = ?key.iter, "Component cache hit");
                Some(instance)
            }
            Err(_) => {
                debug!(key_id = key.id, iter = ?key.iter, "Component cache type mismatch");
                None
            }
        }
    }

    /// Mark `instance` as in use under `key` for the next pass.
    pub fn use_component<T: Component>(&mut self, key: CompKey, instance: &Rc<RefCell<T>>) {
        self.previous.remove(&key);
        let instance: Rc<dyn Any> = instance.clone();
        self.used.insert(key, CacheEntry { instance });
    }

    pub fn previous_len(&self) -> usize {
        self.previous.len()
    }

    pub fn used_len(&self) -> usize {
        self.used.len()
    }
}
