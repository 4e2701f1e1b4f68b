use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, error, info, instrument, warn};
use vellum_common::EventEnv;
use vellum_core::{
    hash_position, BuildIn, BuildOutput, ComponentCache, ComponentId, ComponentRef, LifecycleCtx,
    WireFn,
};

use crate::error::{BuildError, BuildResult};
use crate::results::BuildResults;

struct LifecycleRecord {
    pass: u64,
    component: ComponentRef,
}

/// Runs build passes over a component tree, keeping instances alive between
/// passes and calling their lifecycle hooks.
pub struct BuildEngine {
    cache: ComponentCache,
    results: BuildResults,
    previous_results: BuildResults,
    lifecycle: FxHashMap<ComponentId, LifecycleRecord>,
    pass_num: u64,
    env: EventEnv,
    wire: Option<WireFn>,
}

impl BuildEngine {
    pub fn new(env: EventEnv) -> Self {
        Self {
            cache: ComponentCache::new(),
            results: BuildResults::default(),
            previous_results: BuildResults::default(),
            lifecycle: FxHashMap::default(),
            pass_num: 0,
            env,
            wire: None,
        }
    }

    /// Apply `wire` to every component created through
    /// [`BuildIn::reuse_or_create`] or [`BuildIn::wire_component`].
    pub fn with_wire(mut self, wire: WireFn) -> Self {
        self.wire = Some(wire);
        self
    }

    pub fn pass_num(&self) -> u64 {
        self.pass_num
    }

    pub fn event_env(&self) -> &EventEnv {
        &self.env
    }

    /// Results of the most recent pass.
    pub fn results(&self) -> &BuildResults {
        &self.results
    }

    /// What `component` produced in the pass before the most recent one.
    pub fn previous_output_for<T: ?Sized>(&self, component: &Rc<RefCell<T>>) -> Option<&BuildOutput> {
        self.previous_results.result_for(component)
    }

    /// Number of live instances the engine is tracking.
    pub fn live_components(&self) -> usize {
        self.lifecycle.len()
    }

    #[instrument(skip(self, root), fields(pass = self.pass_num + 1))]
    pub fn run_build(&mut self, root: &ComponentRef) -> BuildResult<&BuildResults> {
        self.cache.start_pass();
        self.previous_results = std::mem::take(&mut self.results);
        self.pass_num += 1;

        let mut hashes = vec![0u64];
        let mut path = Vec::new();
        self.build_component(root, &mut hashes, &mut path)?;
        hashes.pop();
        if !hashes.is_empty() {
            error!(depth = hashes.len(), "Position hash stack not empty after build walk");
            return Err(BuildError::UnbalancedPositionStack {
                depth: hashes.len(),
            });
        }

        self.results.set_root(ComponentId::of(root));
        let destroyed = self.destroy_unreachable();

        info!(
            pass = self.pass_num,
            components = self.results.len(),
            destroyed,
            "Build pass complete"
        );
        Ok(&self.results)
    }

    fn build_component(
        &mut self,
        component: &ComponentRef,
        hashes: &mut Vec<u64>,
        path: &mut Vec<ComponentId>,
    ) -> BuildResult<()> {
        let id = ComponentId::of(component);
        if path.contains(&id) {
            error!(?id, depth = path.len(), "Component nested inside itself");
            return Err(BuildError::RecursiveComponent {
                id,
                depth: path.len(),
            });
        }

        let position_hash = hashes.last().copied().unwrap_or_default();
        let ctx = LifecycleCtx::new(self.env.clone());
        let output = {
            let mut instance = component
                .try_borrow_mut()
                .map_err(|_| BuildError::ComponentBusy { id })?;

            match self.lifecycle.get_mut(&id) {
                Some(record) => record.pass = self.pass_num,
                None => {
                    debug!(?id, "Initializing component");
                    instance.init(&ctx);
                    self.lifecycle.insert(
                        id,
                        LifecycleRecord {
                            pass: self.pass_num,
                            component: component.clone(),
                        },
                    );
                }
            }

            instance.before_build(&ctx);
            let mut input =
                BuildIn::new(&mut self.cache, position_hash, &self.env, self.wire.as_ref());
            instance.build(&mut input)
        };

        let children = output.components.clone();
        self.results.insert(component, output);

        if !children.is_empty() {
            path.push(id);
            hashes.push(hash_position(position_hash));
            for child in &children {
                if let Some(last) = hashes.last_mut() {
                    *last = last.wrapping_add(1);
                }
                self.build_component(child, hashes, path)?;
            }
            hashes.pop();
            path.pop();
        }

        Ok(())
    }

    fn destroy_unreachable(&mut self) -> usize {
        let pass = self.pass_num;
        let mut stale: Vec<ComponentId> = self
            .lifecycle
            .iter()
            .filter(|(_, record)| record.pass != pass)
            .map(|(id, _)| *id)
            .collect();
        stale.sort();

        let ctx = LifecycleCtx::new(self.env.clone());
        let mut destroyed = 0;
        for id in stale {
            let Some(record) = self.lifecycle.remove(&id) else {
                continue;
            };
            let destroyed_now = match record.component.try_borrow_mut() {
                Ok(mut instance) => {
                    debug!(?id, last_pass = record.pass, "Destroying component");
                    instance.destroy(&ctx);
                    true
                }
                Err(_) => false,
            };
            if destroyed_now {
                destroyed += 1;
            } else {
                // Still stale next pass, so the hook is retried then.
                warn!(?id, "Component borrowed during teardown, destroy deferred");
                self.lifecycle.insert(id, record);
            }
        }
        destroyed
    }
}
