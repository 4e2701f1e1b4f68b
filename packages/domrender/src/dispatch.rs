use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, instrument};
use vellum_core::DomEvent;

use crate::error::{RenderError, RenderResult};
use crate::host::Host;
use crate::renderer::DomRenderer;

/// Event as serialized by the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventPayload {
    pub position_id: String,
    pub event_type: String,
    #[serde(default)]
    pub capture: bool,
    #[serde(default)]
    pub passive: bool,
    #[serde(default)]
    pub event_summary: Map<String, Value>,
}

impl<H: Host> DomRenderer<H> {
    /// Dispatch a host event buffer: a 4-byte big-endian length followed by
    /// that many bytes of JSON.
    pub fn dispatch_event_buffer(&self, buf: &[u8]) -> RenderResult<()> {
        let Some(prefix) = buf.get(..4) else {
            return Err(RenderError::TruncatedEvent { len: buf.len() });
        };
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let limit = self.config.event_buffer_size;
        if len > limit {
            return Err(RenderError::EventTooLarge { size: len, limit });
        }
        let json = 4usize
            .checked_add(len)
            .and_then(|end| buf.get(4..end))
            .ok_or(RenderError::TruncatedEvent { len: buf.len() })?;
        self.dispatch_event(json)
    }

    /// Decode and dispatch one JSON event payload.
    pub fn dispatch_event(&self, json: &[u8]) -> RenderResult<()> {
        let limit = self.config.event_buffer_size;
        if json.len() > limit {
            return Err(RenderError::EventTooLarge {
                size: json.len(),
                limit,
            });
        }
        let payload: EventPayload = serde_json::from_slice(json)?;
        self.dispatch(payload)
    }

    /// Run the listener registered for the event's position while holding the
    /// write side of the coordinator, then ask for a render. A listener that
    /// panics releases the lock without a render and stops the render loop.
    #[instrument(skip(self, payload), fields(position_id = %payload.position_id, event_type = %payload.event_type))]
    pub fn dispatch(&self, payload: EventPayload) -> RenderResult<()> {
        let handler = self
            .listeners
            .get(&payload.position_id)
            .and_then(|specs| {
                specs
                    .iter()
                    .find(|s| s.event_type == payload.event_type && s.capture == payload.capture)
            })
            .map(|spec| spec.handler.clone());

        let Some(handler) = handler else {
            error!(capture = payload.capture, "No listener registered for event");
            return Err(RenderError::NoListener {
                position_id: payload.position_id,
                event_type: payload.event_type,
                capture: payload.capture,
            });
        };

        let event = DomEvent::new(
            payload.position_id.clone(),
            payload.event_type.clone(),
            payload.event_summary,
            self.env.clone(),
        );

        let guard = self.env.lock();
        match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
            Ok(()) => {
                guard.unlock_render();
                debug!("Event handled");
                Ok(())
            }
            Err(_) => {
                guard.unlock_only();
                self.env.request_exit();
                error!("Event listener panicked, stopping render loop");
                Err(RenderError::HandlerPanicked {
                    position_id: payload.position_id,
                    event_type: payload.event_type,
                })
            }
        }
    }
}
