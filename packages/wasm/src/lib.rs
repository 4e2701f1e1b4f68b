//! Browser bindings. `js/vellum.js` interprets instruction batches on the page;
//! this crate owns the mounted render loop and forwards host events into it.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, error, info};
use vellum_core::{ComponentRef, ElementHandle};
use vellum_domrender::{Host, HostCallback, RenderError, RenderLoop, RenderResult, RendererConfig};
use wasm_bindgen::prelude::*;

#[wasm_bindgen(module = "/js/vellum.js")]
extern "C" {
    /// Apply a batch and return how many callbacks it queued.
    #[wasm_bindgen(js_name = applyBatch, catch)]
    fn apply_batch(batch: &[u8]) -> Result<u32, JsValue>;

    #[wasm_bindgen(js_name = isAlive)]
    fn host_is_alive() -> bool;

    #[wasm_bindgen(js_name = callbackId)]
    fn callback_id(index: u32) -> u32;

    /// The element of a last-element callback, `undefined` otherwise.
    #[wasm_bindgen(js_name = callbackElement)]
    fn callback_element(index: u32) -> JsValue;

    #[wasm_bindgen(js_name = setEventHandler)]
    fn set_event_handler(handler: &JsValue);
}

/// Host backed by the page script. Element handles carry the DOM node as a
/// [`JsValue`].
pub struct JsHost;

impl Host for JsHost {
    fn apply(&mut self, batch: &[u8]) -> RenderResult<Vec<HostCallback>> {
        let count = apply_batch(batch).map_err(|err| RenderError::HostRejected {
            message: format!("{err:?}"),
        })?;

        Ok((0..count)
            .map(|i| HostCallback {
                id: callback_id(i),
                element: element_handle(callback_element(i)),
            })
            .collect())
    }

    fn is_alive(&self) -> bool {
        host_is_alive()
    }
}

fn element_handle(value: JsValue) -> Option<ElementHandle> {
    if value.is_undefined() || value.is_null() {
        None
    } else {
        Some(ElementHandle::new(value))
    }
}

/// Work that arrived while the render loop was in use, e.g. a `blur` fired
/// synchronously by a node the current batch removed.
enum Deferred {
    Event(Vec<u8>),
    Unmount,
}

thread_local! {
    static APP: RefCell<Option<RenderLoop<JsHost>>> = const { RefCell::new(None) };
    static DEFERRED: RefCell<VecDeque<Deferred>> = const { RefCell::new(VecDeque::new()) };
}

fn to_js(err: RenderError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn is_busy() -> bool {
    APP.with(|app| app.try_borrow_mut().is_err())
}

fn defer(work: Deferred) {
    DEFERRED.with(|queue| queue.borrow_mut().push_back(work));
}

fn enter<T>(f: impl FnOnce(&mut RenderLoop<JsHost>) -> Result<T, JsValue>) -> Result<T, JsValue> {
    APP.with(|app| {
        let mut slot = app
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("Render loop is busy"))?;
        match slot.as_mut() {
            Some(render_loop) => f(render_loop),
            None => Err(JsValue::from_str("No component is mounted")),
        }
    })
}

/// Run `f` against the mounted loop, then whatever was deferred meanwhile.
fn with_app<T>(f: impl FnOnce(&mut RenderLoop<JsHost>) -> Result<T, JsValue>) -> Result<T, JsValue> {
    let result = enter(f);
    drain_deferred();
    result
}

fn drain_deferred() {
    // A nested call leaves the queue to the outermost one.
    if is_busy() {
        return;
    }
    while let Some(work) = DEFERRED.with(|queue| queue.borrow_mut().pop_front()) {
        match work {
            Deferred::Event(buf) => {
                if let Err(err) = enter(|render_loop| dispatch_and_pump(render_loop, &buf)) {
                    error!(?err, "Deferred event failed");
                }
            }
            Deferred::Unmount => unmount(),
        }
    }
}

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    let handler = Closure::<dyn FnMut(Vec<u8>)>::new(|buf: Vec<u8>| {
        // Failures are already logged by the dispatcher.
        let _ = handle_event(&buf);
    });
    set_event_handler(handler.as_ref());
    handler.forget();
}

/// Parse a renderer config, as found in `vellum.config.json`.
pub fn parse_config(json: &str) -> Result<RendererConfig, JsValue> {
    RendererConfig::from_json_str(json).map_err(|err| JsValue::from_str(&format!("{err:#}")))
}

/// Mount `root` on the page and render the first pass. Replaces any
/// previously mounted component.
pub fn mount(root: ComponentRef, config: RendererConfig) -> Result<(), JsValue> {
    if is_busy() {
        return Err(JsValue::from_str("Cannot mount while rendering"));
    }
    let mut render_loop = RenderLoop::new(root, JsHost, config);
    render_loop.render_once().map_err(to_js)?;
    info!(selector = %render_loop.renderer().config().mount_point_selector, "Mounted");
    APP.with(|app| *app.borrow_mut() = Some(render_loop));
    drain_deferred();
    Ok(())
}

/// Drop the mounted component. Later events are rejected.
#[wasm_bindgen]
pub fn unmount() {
    if is_busy() {
        defer(Deferred::Unmount);
        return;
    }
    if let Some(render_loop) = APP.with(|app| app.borrow_mut().take()) {
        render_loop.renderer().event_env().request_exit();
    }
}

/// Dispatch a length-prefixed event buffer and render if it asked for it.
/// Events arriving mid-render are queued and handled once it finishes.
#[wasm_bindgen(js_name = handleEvent)]
pub fn handle_event(buf: &[u8]) -> Result<(), JsValue> {
    if is_busy() {
        debug!(len = buf.len(), "Render loop busy, event deferred");
        defer(Deferred::Event(buf.to_vec()));
        return Ok(());
    }
    with_app(|render_loop| dispatch_and_pump(render_loop, buf))
}

fn dispatch_and_pump(render_loop: &mut RenderLoop<JsHost>, buf: &[u8]) -> Result<(), JsValue> {
    if let Err(err) = render_loop.renderer().dispatch_event_buffer(buf) {
        error!(%err, "Event dispatch failed");
        return Err(to_js(err));
    }
    pump(render_loop)
}

/// Run a callback the host deferred past its batch.
#[wasm_bindgen(js_name = handleCallback)]
pub fn handle_callback(id: u32, element: JsValue) -> Result<(), JsValue> {
    with_app(|render_loop| {
        render_loop
            .renderer_mut()
            .handle_callback(id, element_handle(element))
            .map_err(to_js)
    })
}

/// Render any pass requested from outside an event, e.g. by a timer.
#[wasm_bindgen]
pub fn render() -> Result<(), JsValue> {
    with_app(pump)
}

fn pump(render_loop: &mut RenderLoop<JsHost>) -> Result<(), JsValue> {
    let running = render_loop.pump().map_err(to_js)?;
    if !running {
        info!("Render loop stopped");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderStats {
    render_pass: u64,
    batches_sent: usize,
    listeners: usize,
}

/// JSON summary of the mounted renderer.
#[wasm_bindgen(js_name = renderStats)]
pub fn render_stats() -> Result<String, JsValue> {
    with_app(|render_loop| {
        let renderer = render_loop.renderer();
        let stats = RenderStats {
            render_pass: renderer.render_pass(),
            batches_sent: renderer.batches_sent(),
            listeners: renderer.listener_positions().count(),
        };
        serde_json::to_string(&stats).map_err(|err| JsValue::from_str(&err.to_string()))
    })
}
