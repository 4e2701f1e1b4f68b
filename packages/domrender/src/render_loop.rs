use tracing::{debug, error, info};
use vellum_build::BuildEngine;
use vellum_common::{event_env, RenderSignals};
use vellum_core::{ComponentRef, WireFn};

use crate::config::RendererConfig;
use crate::error::RenderResult;
use crate::host::Host;
use crate::renderer::DomRenderer;

/// Drives `build -> render -> wait` for one root component.
pub struct RenderLoop<H: Host> {
    engine: BuildEngine,
    renderer: DomRenderer<H>,
    signals: RenderSignals,
    root: ComponentRef,
}

impl<H: Host> RenderLoop<H> {
    pub fn new(root: ComponentRef, host: H, config: RendererConfig) -> Self {
        let (env, signals) = event_env(config.signal_capacity);
        Self {
            engine: BuildEngine::new(env.clone()),
            renderer: DomRenderer::new(host, env, config),
            signals,
            root,
        }
    }

    pub fn with_wire(mut self, wire: WireFn) -> Self {
        self.engine = self.engine.with_wire(wire);
        self
    }

    pub fn engine(&self) -> &BuildEngine {
        &self.engine
    }

    pub fn renderer(&self) -> &DomRenderer<H> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut DomRenderer<H> {
        &mut self.renderer
    }

    pub fn signals_mut(&mut self) -> &mut RenderSignals {
        &mut self.signals
    }

    /// Build the tree under the read lock and render it.
    pub fn render_once(&mut self) -> RenderResult<()> {
        let env = self.renderer.event_env().clone();
        let results = {
            let _guard = env.read();
            self.engine.run_build(&self.root)?
        };
        self.renderer.render(results)
    }

    /// Render the pass that is already requested, if any, without waiting.
    /// Returns false once the loop should stop. For hosts that drive rendering
    /// from their own event loop instead of [`RenderLoop::run`].
    pub fn pump(&mut self) -> RenderResult<bool> {
        match self.signals.try_wait() {
            None => return Ok(true),
            Some(false) => return Ok(false),
            Some(true) => {}
        }
        let coalesced = self.signals.drain();
        debug!(coalesced, "Render requested");
        if self.renderer.event_env().is_exit_requested() {
            return Ok(false);
        }

        match self.render_once() {
            Ok(()) => Ok(true),
            Err(err) if err.is_host_unavailable() => Ok(false),
            Err(err) => {
                error!(%err, "Render pass failed");
                Err(err)
            }
        }
    }

    /// Render until the host goes away or an exit is requested. Queued render
    /// requests are coalesced into a single pass.
    pub async fn run(&mut self) -> RenderResult<()> {
        loop {
            match self.render_once() {
                Ok(()) => {}
                Err(err) if err.is_host_unavailable() => {
                    info!("Host unavailable, render loop stopping");
                    return Ok(());
                }
                Err(err) => {
                    error!(%err, "Render pass failed");
                    return Err(err);
                }
            }

            let renderer = &self.renderer;
            let keep_going = self.signals.wait(&|| renderer.is_host_alive()).await;
            if !keep_going {
                info!(pass = renderer.render_pass(), "Render loop finished");
                return Ok(());
            }
            let coalesced = self.signals.drain();
            debug!(coalesced, "Render requested");
            if renderer.event_env().is_exit_requested() {
                info!("Exit requested, render loop stopping");
                return Ok(());
            }
        }
    }
}
