use serde_json::{Map, Value};
use vellum_common::EventEnv;

/// A host event delivered to a listener.
///
/// The summary is the flattened set of primitive values the host copied from
/// its native event, with the target's primitives nested under `"target"`.
#[derive(Debug, Clone)]
pub struct DomEvent {
    position_id: String,
    event_type: String,
    summary: Map<String, Value>,
    env: EventEnv,
}

impl DomEvent {
    pub fn new(
        position_id: impl Into<String>,
        event_type: impl Into<String>,
        summary: Map<String, Value>,
        env: EventEnv,
    ) -> Self {
        Self {
            position_id: position_id.into(),
            event_type: event_type.into(),
            summary,
            env,
        }
    }

    pub fn position_id(&self) -> &str {
        &self.position_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn summary(&self) -> &Map<String, Value> {
        &self.summary
    }

    /// Look up a value by path, e.g. `["target", "value"]`.
    pub fn prop(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut value = self.summary.get(*first)?;
        for key in rest {
            value = value.as_object()?.get(*key)?;
        }
        Some(value)
    }

    pub fn prop_str(&self, path: &[&str]) -> Option<&str> {
        self.prop(path).and_then(Value::as_str)
    }

    pub fn prop_f64(&self, path: &[&str]) -> Option<f64> {
        self.prop(path).and_then(Value::as_f64)
    }

    pub fn prop_bool(&self, path: &[&str]) -> Option<bool> {
        self.prop(path).and_then(Value::as_bool)
    }

    /// The coordinator this event was dispatched through. Handlers already run
    /// under its write lock and must not lock it again.
    pub fn event_env(&self) -> &EventEnv {
        &self.env
    }
}
