//! Synchronizes the host document with the output of a build pass.
//!
//! The renderer keeps no copy of the previous tree. Every pass walks the whole
//! tree and writes "set" instructions followed by "remove others" markers, so
//! the host prunes whatever it holds that the pass did not mention and leaves
//! matching nodes in place. Before anything is written the reachable tree is
//! validated into a plan, so a malformed tree never produces a partial batch.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, instrument, warn};
use vellum_build::BuildResults;
use vellum_common::{EnvError, EventEnv};
use vellum_core::{
    Component, ComponentId, DomEventHandlerSpec, ElementHandle, NodeArena, NodeId, NodeKind,
    RenderedCtx, VNode,
};

use crate::callbacks::CallbackTable;
use crate::config::RendererConfig;
use crate::error::{RenderError, RenderResult};
use crate::host::{Host, HostSink};
use crate::instructions::InstructionList;
use crate::namespace::namespace_to_uri;

const CSS_CHANNEL: &str = "css";
const JS_CHANNEL: &str = "js";

struct RenderedRecord {
    pass: u64,
    // Keeps the allocation, and with it the id, from being reused while tracked.
    _instance: Weak<RefCell<dyn Component>>,
}

pub struct DomRenderer<H: Host> {
    pub(crate) config: RendererConfig,
    pub(crate) instructions: InstructionList<HostSink<H>>,
    pub(crate) env: EventEnv,
    pub(crate) listeners: FxHashMap<String, Vec<DomEventHandlerSpec>>,
    callbacks: CallbackTable,
    rendered: FxHashMap<ComponentId, RenderedRecord>,
    render_pass: u64,
}

impl<H: Host> DomRenderer<H> {
    pub fn new(host: H, env: EventEnv, config: RendererConfig) -> Self {
        let instructions = InstructionList::new(config.instruction_buffer_size, HostSink::new(host));
        Self {
            config,
            instructions,
            env,
            listeners: FxHashMap::default(),
            callbacks: CallbackTable::new(),
            rendered: FxHashMap::default(),
            render_pass: 0,
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn event_env(&self) -> &EventEnv {
        &self.env
    }

    pub fn host(&self) -> &H {
        self.instructions.sink().host()
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.instructions.sink_mut().host_mut()
    }

    pub fn is_host_alive(&self) -> bool {
        self.host().is_alive()
    }

    /// Number of completed or attempted render passes.
    pub fn render_pass(&self) -> u64 {
        self.render_pass
    }

    /// Instruction batches handed to the host so far.
    pub fn batches_sent(&self) -> usize {
        self.instructions.sink().flushes()
    }

    /// Positions that currently have listeners registered.
    pub fn listener_positions(&self) -> impl Iterator<Item = &str> {
        self.listeners.keys().map(String::as_str)
    }

    /// Run an element callback the host reported outside of a render batch.
    pub fn handle_callback(&mut self, id: u32, element: Option<ElementHandle>) -> RenderResult<()> {
        self.callbacks.invoke(id, element)
    }

    #[instrument(skip(self, results), fields(pass = self.render_pass + 1))]
    pub fn render(&mut self, results: &BuildResults) -> RenderResult<()> {
        if !self.is_host_alive() {
            return Err(EnvError::HostUnavailable.into());
        }
        self.render_pass += 1;

        let env = self.env.clone();
        let guard = env.read();

        let plan = Planner::new(results).plan()?;

        self.instructions.reset();
        self.instructions.sink_mut().clear_pending();
        self.callbacks.start_pass(self.render_pass);

        let mut emitter = Emitter {
            instructions: &mut self.instructions,
            callbacks: &mut self.callbacks,
            listeners: FxHashMap::default(),
        };
        emitter.emit(&plan, &self.config.mount_point_selector)?;
        let listeners = emitter.listeners;
        self.instructions.flush()?;
        self.listeners = listeners;
        drop(guard);

        for callback in self.instructions.sink_mut().take_pending() {
            self.callbacks.invoke(callback.id, callback.element)?;
        }
        self.run_rendered_hooks(results, &plan.components);

        info!(
            pass = self.render_pass,
            components = plan.components.len(),
            listeners = self.listeners.len(),
            callbacks = self.callbacks.len(),
            "Render pass complete"
        );
        Ok(())
    }

    fn run_rendered_hooks(&mut self, results: &BuildResults, visited: &FxHashSet<ComponentId>) {
        let pass = self.render_pass;
        for component in results.components() {
            let id = ComponentId::of(component);
            if !visited.contains(&id) {
                continue;
            }

            let first = match self.rendered.get_mut(&id) {
                Some(record) => {
                    record.pass = pass;
                    false
                }
                None => {
                    self.rendered.insert(
                        id,
                        RenderedRecord {
                            pass,
                            _instance: Rc::downgrade(component),
                        },
                    );
                    true
                }
            };

            let ctx = RenderedCtx::new(self.env.clone(), first);
            match component.try_borrow_mut() {
                Ok(mut instance) => instance.rendered(&ctx),
                Err(_) => warn!(?id, "Component borrowed during render, rendered hook skipped"),
            }
        }
        self.rendered.retain(|_, record| record.pass == pass);
    }
}

impl<H: Host> std::fmt::Debug for DomRenderer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomRenderer")
            .field("render_pass", &self.render_pass)
            .field("listeners", &self.listeners.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanKind {
    Element,
    Text,
    Comment,
}

struct PlanNode<'a> {
    node: &'a VNode,
    kind: PlanKind,
    position: String,
    children: Vec<PlanNode<'a>>,
}

enum Shape<'a> {
    Mount(PlanNode<'a>),
    Document {
        html: &'a VNode,
        head: Option<&'a VNode>,
        body: Option<(&'a VNode, PlanNode<'a>)>,
    },
}

#[derive(Debug, PartialEq, Eq)]
struct SideTag {
    tag: String,
    text: String,
    attrs: Vec<(String, String)>,
}

struct Plan<'a> {
    shape: Shape<'a>,
    css: Vec<SideTag>,
    js: Vec<SideTag>,
    components: FxHashSet<ComponentId>,
}

/// Validates the reachable tree and resolves component delegation and
/// fragments into a flat plan of what the host should hold.
struct Planner<'a> {
    results: &'a BuildResults,
    path: Vec<ComponentId>,
    visited: FxHashSet<ComponentId>,
}

impl<'a> Planner<'a> {
    fn new(results: &'a BuildResults) -> Self {
        Self {
            results,
            path: Vec::new(),
            visited: FxHashSet::default(),
        }
    }

    fn plan(mut self) -> RenderResult<Plan<'a>> {
        let results = self.results;
        let out = results.out().ok_or(RenderError::MissingOutput)?;
        let root = match out.out.as_slice() {
            [root] => *root,
            other => return Err(RenderError::RootCount { count: other.len() }),
        };
        if let Some(id) = results.root_id() {
            self.visited.insert(id);
            self.path.push(id);
        }

        let (arena, root) = self.resolve(&out.nodes, root)?;
        let node = &arena[root];
        if !node.is_element() {
            return Err(RenderError::RootNotElement { kind: node.kind });
        }

        let shape = if node.data.eq_ignore_ascii_case("html") {
            self.plan_document(arena, root)?
        } else {
            Shape::Mount(self.plan_element(arena, root, "0".to_string())?)
        };
        let (css, js) = self.side_tags()?;

        Ok(Plan {
            shape,
            css,
            js,
            components: self.visited,
        })
    }

    fn plan_document(&mut self, arena: &'a NodeArena, html: NodeId) -> RenderResult<Shape<'a>> {
        let mut head = None;
        let mut body = None;

        for child in arena.children(html) {
            let depth = self.path.len();
            let (child_arena, child) = self.resolve(arena, child)?;
            let node = &child_arena[child];
            match node.kind {
                NodeKind::Text if node.data.trim().is_empty() => {}
                NodeKind::Element if node.data.eq_ignore_ascii_case("head") => head = Some(node),
                NodeKind::Element if node.data.eq_ignore_ascii_case("body") => {
                    body = Some((node, self.plan_body(child_arena, child)?));
                }
                NodeKind::Element => {
                    return Err(RenderError::UnexpectedHtmlChild {
                        found: format!("<{}>", node.data),
                    })
                }
                kind => {
                    return Err(RenderError::UnexpectedHtmlChild {
                        found: format!("{kind:?} node"),
                    })
                }
            }
            self.path.truncate(depth);
        }

        Ok(Shape::Document {
            html: &arena[html],
            head,
            body,
        })
    }

    fn plan_body(&mut self, arena: &'a NodeArena, body: NodeId) -> RenderResult<PlanNode<'a>> {
        let mut nodes = Vec::new();
        // Numbered like any other child so the mount never shares body's id.
        for (i, child) in arena.children(body).enumerate() {
            self.plan_into(arena, child, format!("body_{}", i + 1), &mut nodes)?;
        }
        if nodes.len() != 1 {
            return Err(RenderError::BodyChildCount { count: nodes.len() });
        }

        let mount = nodes.remove(0);
        if mount.kind != PlanKind::Element {
            return Err(RenderError::MountNotElement {
                position: mount.position,
                kind: mount.node.kind,
            });
        }
        Ok(mount)
    }

    fn plan_element(&mut self, arena: &'a NodeArena, id: NodeId, position: String) -> RenderResult<PlanNode<'a>> {
        let node = &arena[id];
        let children = if node.inner_html.is_some() {
            Vec::new()
        } else {
            let mut children = Vec::new();
            for (i, child) in arena.children(id).enumerate() {
                self.plan_into(arena, child, format!("{position}_{}", i + 1), &mut children)?;
            }
            children
        };

        Ok(PlanNode {
            node,
            kind: PlanKind::Element,
            position,
            children,
        })
    }

    /// Plan `id` and push the result onto `out`. Fragments push their children
    /// in their place.
    fn plan_into(
        &mut self,
        arena: &'a NodeArena,
        id: NodeId,
        position: String,
        out: &mut Vec<PlanNode<'a>>,
    ) -> RenderResult<()> {
        let depth = self.path.len();
        let (arena, id) = self.resolve(arena, id)?;
        let node = &arena[id];

        match node.kind {
            NodeKind::Fragment => {
                for (j, child) in arena.children(id).enumerate() {
                    self.plan_into(arena, child, format!("{position}t{}", j + 1), out)?;
                }
            }
            NodeKind::Text | NodeKind::Comment => out.push(PlanNode {
                node,
                kind: if node.kind == NodeKind::Text {
                    PlanKind::Text
                } else {
                    PlanKind::Comment
                },
                position,
                children: Vec::new(),
            }),
            NodeKind::Element => out.push(self.plan_element(arena, id, position)?),
        }

        self.path.truncate(depth);
        Ok(())
    }

    /// Follow component delegation until a plain node is reached. Components
    /// entered are pushed onto the path; the caller truncates it.
    fn resolve(&mut self, arena: &'a NodeArena, id: NodeId) -> RenderResult<(&'a NodeArena, NodeId)> {
        let results = self.results;
        let mut arena = arena;
        let mut id = id;
        loop {
            let node = arena.get(id).ok_or(RenderError::DanglingNode { node: id })?;
            let Some(component) = node.component_ref() else {
                return Ok((arena, id));
            };

            let component_id = ComponentId::of(component);
            if self.path.contains(&component_id) {
                return Err(RenderError::DelegationCycle { id: component_id });
            }
            let output = results
                .result_for_id(component_id)
                .ok_or(RenderError::MissingComponentOutput { id: component_id })?;
            let root = match output.out.as_slice() {
                [root] => *root,
                other => {
                    return Err(RenderError::ComponentRootCount {
                        id: component_id,
                        count: other.len(),
                    })
                }
            };

            self.path.push(component_id);
            self.visited.insert(component_id);
            arena = &output.nodes;
            id = root;
        }
    }

    /// Collect CSS and JS side tags from every output in build order,
    /// dropping exact duplicates.
    fn side_tags(&self) -> RenderResult<(Vec<SideTag>, Vec<SideTag>)> {
        let mut css = Vec::new();
        let mut js = Vec::new();

        for component in self.results.components() {
            let Some(output) = self.results.result_for(component) else {
                continue;
            };
            for id in &output.css {
                let tag = side_tag(&output.nodes, *id, CSS_CHANNEL, &["style", "link"])?;
                if !css.contains(&tag) {
                    css.push(tag);
                }
            }
            for id in &output.js {
                let tag = side_tag(&output.nodes, *id, JS_CHANNEL, &["script"])?;
                if !js.contains(&tag) {
                    js.push(tag);
                }
            }
        }
        Ok((css, js))
    }
}

fn side_tag(arena: &NodeArena, id: NodeId, channel: &'static str, allowed: &[&str]) -> RenderResult<SideTag> {
    let node = arena.get(id).ok_or(RenderError::DanglingNode { node: id })?;
    if !node.is_element() || !allowed.contains(&node.data.as_str()) {
        return Err(RenderError::InvalidSideTag {
            tag: node.data.clone(),
            channel,
        });
    }

    let mut text = String::new();
    for child in arena.children(id) {
        let child = &arena[child];
        if child.kind != NodeKind::Text || child.is_component() {
            return Err(RenderError::SideTagContent {
                tag: node.data.clone(),
                channel,
            });
        }
        text.push_str(&child.data);
    }

    Ok(SideTag {
        tag: node.data.clone(),
        text,
        attrs: node
            .attrs
            .iter()
            .map(|attr| (attr.key.clone(), attr.val.clone()))
            .collect(),
    })
}

/// Writes a validated plan as instructions.
struct Emitter<'r, H: Host> {
    instructions: &'r mut InstructionList<HostSink<H>>,
    callbacks: &'r mut CallbackTable,
    listeners: FxHashMap<String, Vec<DomEventHandlerSpec>>,
}

impl<H: Host> Emitter<'_, H> {
    fn emit(&mut self, plan: &Plan<'_>, mount_point_selector: &str) -> RenderResult<()> {
        for tag in &plan.css {
            self.instructions
                .write_set_css_tag(&tag.tag, &tag.text, &tag.attrs)?;
        }
        self.instructions.write_remove_other_css_tags()?;

        for tag in &plan.js {
            self.instructions
                .write_set_js_tag(&tag.tag, &tag.text, &tag.attrs)?;
        }
        self.instructions.write_remove_other_js_tags()?;

        self.instructions.write_clear_el()?;
        match &plan.shape {
            Shape::Mount(root) => {
                self.instructions
                    .write_select_mount_point(mount_point_selector, &root.node.data)?;
                self.emit_element_body(root)
            }
            Shape::Document { html, head, body } => {
                self.instructions.write_select_query("html")?;
                self.sync_element(html, "html")?;

                if let Some(head) = head {
                    self.instructions.write_select_query("head")?;
                    self.sync_element(head, "head")?;
                }

                if let Some((body, mount)) = body {
                    self.instructions.write_select_query("body")?;
                    self.sync_element(body, "body")?;
                    self.instructions
                        .write_select_mount_point(mount_point_selector, &mount.node.data)?;
                    self.emit_element_body(mount)?;
                }
                Ok(())
            }
        }
    }

    fn emit_node(&mut self, plan: &PlanNode<'_>) -> RenderResult<()> {
        let node = plan.node;
        match plan.kind {
            PlanKind::Text => self.instructions.write_set_text(&node.data),
            PlanKind::Comment => self.instructions.write_set_comment(&node.data),
            PlanKind::Element => {
                if node.namespace.is_empty() {
                    self.instructions.write_set_element(&node.data)?;
                } else {
                    self.instructions
                        .write_set_element_ns(&node.data, namespace_to_uri(&node.namespace))?;
                }
                self.emit_element_body(plan)
            }
        }
    }

    /// Everything after the element itself is selected: attributes,
    /// properties, listeners, callbacks and content.
    fn emit_element_body(&mut self, plan: &PlanNode<'_>) -> RenderResult<()> {
        let node = plan.node;
        self.sync_element(node, &plan.position)?;

        let (create_id, populate_id) = self
            .callbacks
            .register(node.js_create.clone(), node.js_populate.clone())?;
        if let Some(id) = create_id {
            self.instructions.write_callback_last_element(id)?;
        }

        if let Some(html) = &node.inner_html {
            self.instructions.write_set_inner_html(html)?;
        } else if !plan.children.is_empty() {
            self.instructions.write_move_to_first_child()?;
            for child in &plan.children {
                self.emit_node(child)?;
                self.instructions.write_move_to_next_sibling()?;
            }
            self.instructions.write_move_to_parent()?;
        } else if create_id.is_none() {
            // Clears host children left over from a previous pass.
            self.instructions.write_set_inner_html("")?;
        }

        if let Some(id) = populate_id {
            self.instructions.write_callback(id)?;
        }
        Ok(())
    }

    fn sync_element(&mut self, node: &VNode, position: &str) -> RenderResult<()> {
        for attr in &node.attrs {
            if !attr.namespace.is_empty() {
                self.instructions.write_set_attr_ns_str(
                    namespace_to_uri(&attr.namespace),
                    &attr.key,
                    &attr.val,
                )?;
            } else if node.namespace.is_empty() || attr.key != "xmlns" {
                self.instructions.write_set_attr_str(&attr.key, &attr.val)?;
            }
        }
        self.instructions.write_remove_other_attrs()?;

        for prop in &node.props {
            self.instructions.write_set_property(&prop.key, &prop.json_val)?;
        }

        if !node.listeners.is_empty() {
            for (i, listener) in node.listeners.iter().enumerate() {
                let shadowed = node.listeners[..i]
                    .iter()
                    .any(|l| l.event_type == listener.event_type && l.capture == listener.capture);
                if shadowed {
                    warn!(
                        position,
                        event_type = %listener.event_type,
                        capture = listener.capture,
                        "Listener only differs in passive flag, dispatch reaches the first one"
                    );
                }
                self.instructions.write_set_event_listener(
                    position,
                    &listener.event_type,
                    listener.capture,
                    listener.passive,
                )?;
            }
            debug!(position, count = node.listeners.len(), "Registered listeners");
            self.listeners
                .insert(position.to_string(), node.listeners.clone());
        }
        self.instructions.write_remove_other_event_listeners(position)
    }
}
