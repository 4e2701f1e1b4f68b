use tracing::debug;
use vellum_core::ElementHandle;

use crate::error::RenderResult;
use crate::instructions::FlushSink;

/// A callback the host queued while applying a batch. `element` is set for
/// last-element callbacks.
#[derive(Debug, Clone)]
pub struct HostCallback {
    pub id: u32,
    pub element: Option<ElementHandle>,
}

/// The environment that interprets instruction batches.
pub trait Host {
    /// Apply one batch. `batch` ends with the end marker. Callbacks the batch
    /// asked for are returned in order rather than invoked re-entrantly.
    fn apply(&mut self, batch: &[u8]) -> RenderResult<Vec<HostCallback>>;

    /// Whether the host can still accept batches.
    fn is_alive(&self) -> bool;
}

impl<H: Host + ?Sized> Host for Box<H> {
    fn apply(&mut self, batch: &[u8]) -> RenderResult<Vec<HostCallback>> {
        (**self).apply(batch)
    }

    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }
}

/// Flush sink that forwards batches to a [`Host`] and collects the callbacks
/// it returns until the renderer is ready to run them.
pub struct HostSink<H> {
    host: H,
    pending: Vec<HostCallback>,
    flushes: usize,
}

impl<H: Host> HostSink<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            pending: Vec::new(),
            flushes: 0,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Number of batches sent so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn take_pending(&mut self) -> Vec<HostCallback> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

impl<H: Host> FlushSink for HostSink<H> {
    fn flush(&mut self, buf: &mut [u8], len: usize) -> RenderResult<()> {
        buf[len] = 0;
        self.flushes += 1;
        let callbacks = self.host.apply(&buf[..=len])?;
        debug!(len, callbacks = callbacks.len(), "Applied instruction batch");
        self.pending.extend(callbacks);
        Ok(())
    }
}
