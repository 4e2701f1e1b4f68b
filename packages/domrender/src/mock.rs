//! In-memory host that interprets instruction batches against a small
//! document model. Used by tests and benchmarks to check what a real host
//! would end up holding.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::trace;
use vellum_core::{BuildIn, BuildOutput, Component, ElementHandle};

use crate::error::{RenderError, RenderResult};
use crate::host::{Host, HostCallback};
use crate::instructions::Opcode;

type BuildFn = Box<dyn Fn(&mut BuildIn<'_>) -> BuildOutput>;

/// Component whose output comes from a replaceable closure.
pub struct FnComponent {
    build: BuildFn,
}

impl FnComponent {
    pub fn new(build: impl Fn(&mut BuildIn<'_>) -> BuildOutput + 'static) -> Self {
        Self {
            build: Box::new(build),
        }
    }

    pub fn set(&mut self, build: impl Fn(&mut BuildIn<'_>) -> BuildOutput + 'static) {
        self.build = Box::new(build);
    }
}

impl Component for FnComponent {
    fn build(&mut self, input: &mut BuildIn<'_>) -> BuildOutput {
        (self.build)(input)
    }
}

/// Index of a node in a [`MockHost`] document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockKind {
    Element { tag: String, namespace: Option<String> },
    Text,
    Comment,
}

#[derive(Debug, Clone)]
pub struct MockNode {
    pub kind: MockKind,
    /// Content of text and comment nodes.
    pub text: String,
    pub attrs: BTreeMap<String, String>,
    pub props: BTreeMap<String, Value>,
    /// Listener keys (`type|capture|passive`) mapped to their position id.
    pub listeners: BTreeMap<String, String>,
    pub inner_html: Option<String>,
    /// Side tags the host created itself, as opposed to ones already on the page.
    pub host_created: bool,
    parent: Option<MockId>,
    children: Vec<MockId>,
}

impl MockNode {
    fn new(kind: MockKind) -> Self {
        Self {
            kind,
            text: String::new(),
            attrs: BTreeMap::new(),
            props: BTreeMap::new(),
            listeners: BTreeMap::new(),
            inner_html: None,
            host_created: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            MockKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    fn is_tag(&self, name: &str) -> bool {
        self.tag().is_some_and(|tag| tag.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    FirstChild,
    NextSibling,
}

#[derive(Debug, Default)]
struct Interp {
    el: Option<MockId>,
    next_move: Option<Move>,
    attr_names: BTreeSet<String>,
    event_keys: BTreeSet<String>,
    mount_point: Option<MockId>,
    inner_html_buffer: String,
    css_seen: Vec<MockId>,
    js_seen: Vec<MockId>,
    listener_map: BTreeMap<String, BTreeSet<String>>,
}

pub struct MockHost {
    nodes: Vec<MockNode>,
    root: MockId,
    state: Interp,
    alive: bool,
    batches: Vec<Vec<u8>>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    /// A page of `<html><head></head><body><div id="vellum_mount_point">`.
    pub fn new() -> Self {
        Self::with_mount_point("div", "vellum_mount_point")
    }

    pub fn with_mount_point(tag: &str, id: &str) -> Self {
        let mut host = Self {
            nodes: Vec::new(),
            root: MockId(0),
            state: Interp::default(),
            alive: true,
            batches: Vec::new(),
        };
        let html = host.create_element("html", None);
        let head = host.create_element("head", None);
        let body = host.create_element("body", None);
        let mount = host.create_element(tag, None);
        host.nodes[mount.0].attrs.insert("id".to_string(), id.to_string());
        host.root = html;
        host.append_child(html, head);
        host.append_child(html, body);
        host.append_child(body, mount);
        host
    }

    pub fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    /// Every batch applied so far, end marker included.
    pub fn batches(&self) -> &[Vec<u8>] {
        &self.batches
    }

    pub fn node(&self, id: MockId) -> &MockNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: MockId) -> &mut MockNode {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: MockId) -> &[MockId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: MockId) -> Option<MockId> {
        self.nodes[id.0].parent
    }

    pub fn document(&self) -> MockId {
        self.root
    }

    /// Add a page-owned element, as if it had been in the served HTML.
    pub fn insert_element(&mut self, parent: MockId, tag: &str, text: &str) -> MockId {
        let el = self.create_element(tag, None);
        if !text.is_empty() {
            let content = self.create_char_data(MockKind::Text, text);
            self.append_child(el, content);
        }
        self.append_child(parent, el);
        el
    }

    pub fn head(&self) -> MockId {
        self.query("head").unwrap_or(self.root)
    }

    pub fn body(&self) -> MockId {
        self.query("body").unwrap_or(self.root)
    }

    /// The mount point, as most recently selected, or as found on the page.
    pub fn mount(&self) -> MockId {
        self.state
            .mount_point
            .or_else(|| self.query("#vellum_mount_point"))
            .unwrap_or(self.root)
    }

    pub fn mount_html(&self) -> String {
        self.to_html(self.mount())
    }

    /// Nodes reachable from the document root, in document order.
    pub fn attached(&self) -> Vec<MockId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        out
    }

    /// Supports `html`, `head`, `body`, `#id` and bare tag names.
    pub fn query(&self, selector: &str) -> Option<MockId> {
        let attached = self.attached();
        if let Some(id) = selector.strip_prefix('#') {
            return attached.into_iter().find(|n| {
                self.nodes[n.0].tag().is_some()
                    && self.nodes[n.0].attrs.get("id").map(String::as_str) == Some(id)
            });
        }
        attached.into_iter().find(|n| self.nodes[n.0].is_tag(selector))
    }

    pub fn query_all(&self, tag: &str) -> Vec<MockId> {
        self.attached()
            .into_iter()
            .filter(|n| self.nodes[n.0].is_tag(tag))
            .collect()
    }

    /// Serialize a subtree. Attributes come out sorted, properties and
    /// listeners are left out.
    pub fn to_html(&self, id: MockId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: MockId, out: &mut String) {
        let node = &self.nodes[id.0];
        match &node.kind {
            MockKind::Text => out.push_str(&node.text),
            MockKind::Comment => {
                out.push_str("<!--");
                out.push_str(&node.text);
                out.push_str("-->");
            }
            MockKind::Element { tag, .. } => {
                out.push('<');
                out.push_str(tag);
                for (k, v) in &node.attrs {
                    out.push_str(&format!(" {k}=\"{v}\""));
                }
                out.push('>');
                if let Some(html) = &node.inner_html {
                    out.push_str(html);
                }
                for child in &node.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    /// Build the event buffer the host would send for `event_type` on `id`:
    /// a 4-byte big-endian length followed by the JSON payload. `None` if the
    /// element has no matching listener.
    pub fn fire(&self, id: MockId, event_type: &str, capture: bool, summary: Value) -> Option<Vec<u8>> {
        let node = &self.nodes[id.0];
        let prefix = format!("{event_type}|{}|", u8::from(capture));
        let (key, position_id) = node.listeners.iter().find(|(k, _)| k.starts_with(&prefix))?;
        let passive = key.ends_with("|1");

        let payload = json!({
            "position_id": position_id,
            "event_type": event_type,
            "capture": capture,
            "passive": passive,
            "event_summary": summary,
        });
        let json = serde_json::to_vec(&payload).ok()?;
        let mut buf = (json.len() as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(&json);
        Some(buf)
    }

    fn create_element(&mut self, tag: &str, namespace: Option<String>) -> MockId {
        self.push_node(MockNode::new(MockKind::Element {
            tag: tag.to_string(),
            namespace,
        }))
    }

    fn create_char_data(&mut self, kind: MockKind, text: &str) -> MockId {
        let mut node = MockNode::new(kind);
        node.text = text.to_string();
        self.push_node(node)
    }

    fn push_node(&mut self, node: MockNode) -> MockId {
        let id = MockId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn append_child(&mut self, parent: MockId, child: MockId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let parent_node = &mut self.nodes[parent.0];
        parent_node.inner_html = None;
        parent_node.children.push(child);
    }

    fn detach(&mut self, id: MockId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    fn replace(&mut self, old: MockId, new: MockId) -> RenderResult<()> {
        let parent = self.nodes[old.0]
            .parent
            .ok_or_else(|| rejected("replaced node has no parent"))?;
        let children = &mut self.nodes[parent.0].children;
        if let Some(slot) = children.iter_mut().find(|c| **c == old) {
            *slot = new;
        }
        self.nodes[old.0].parent = None;
        self.nodes[new.0].parent = Some(parent);
        Ok(())
    }

    fn first_child(&self, id: MockId) -> Option<MockId> {
        self.nodes[id.0].children.first().copied()
    }

    fn next_sibling(&self, id: MockId) -> Option<MockId> {
        let parent = self.nodes[id.0].parent?;
        let siblings = &self.nodes[parent.0].children;
        let index = siblings.iter().position(|c| *c == id)?;
        siblings.get(index + 1).copied()
    }

    fn current(&self) -> RenderResult<MockId> {
        self.state.el.ok_or_else(|| rejected("no element selected"))
    }

    fn run_pending_move(&mut self) -> RenderResult<()> {
        if let Some(pending) = self.state.next_move.take() {
            let el = self.current()?;
            let target = match pending {
                Move::FirstChild => self.first_child(el),
                Move::NextSibling => self.next_sibling(el),
            };
            self.state.el = Some(target.ok_or_else(|| rejected("move target missing"))?);
        }
        Ok(())
    }

    /// Shared handling of the set-node instructions: follow a pending move,
    /// creating the node if the target is missing. Returns the node to verify
    /// when an existing one was found, `None` when a new one was created.
    fn select_or_create(&mut self, create: impl FnOnce(&mut Self) -> MockId) -> RenderResult<Option<MockId>> {
        match self.state.next_move.take() {
            Some(Move::FirstChild) => {
                let el = self.current()?;
                match self.first_child(el) {
                    Some(child) => {
                        self.state.el = Some(child);
                        Ok(Some(child))
                    }
                    None => {
                        let new = create(self);
                        self.append_child(el, new);
                        self.state.el = Some(new);
                        Ok(None)
                    }
                }
            }
            Some(Move::NextSibling) => {
                let el = self.current()?;
                match self.next_sibling(el) {
                    Some(sibling) => {
                        self.state.el = Some(sibling);
                        Ok(Some(sibling))
                    }
                    None => {
                        let parent = self.nodes[el.0]
                            .parent
                            .ok_or_else(|| rejected("sibling move without parent"))?;
                        let new = create(self);
                        self.append_child(parent, new);
                        self.state.el = Some(new);
                        Ok(None)
                    }
                }
            }
            None => self.current().map(Some),
        }
    }

    fn set_element(&mut self, tag: &str, namespace: Option<String>) -> RenderResult<()> {
        self.state.attr_names.clear();
        self.state.event_keys.clear();

        let ns = namespace.clone();
        let Some(existing) = self.select_or_create(|host| host.create_element(tag, ns))? else {
            return Ok(());
        };
        if !self.nodes[existing.0].is_tag(tag) {
            let new = self.create_element(tag, namespace);
            self.replace(existing, new)?;
            self.state.el = Some(new);
        }
        Ok(())
    }

    fn set_char_data(&mut self, kind: MockKind, text: &str) -> RenderResult<()> {
        let create_kind = kind.clone();
        let Some(existing) = self.select_or_create(|host| host.create_char_data(create_kind, text))? else {
            return Ok(());
        };
        if self.nodes[existing.0].kind == kind {
            self.nodes[existing.0].text = text.to_string();
        } else {
            let new = self.create_char_data(kind, text);
            self.replace(existing, new)?;
            self.state.el = Some(new);
        }
        Ok(())
    }

    fn select_mount_point(&mut self, selector: &str, tag: &str) -> RenderResult<()> {
        self.state.attr_names.clear();
        self.state.event_keys.clear();

        let mut el = match self.state.mount_point {
            Some(el) => el,
            None => self
                .query(selector)
                .ok_or_else(|| rejected(format!("mount point selector not found: {selector}")))?,
        };
        if !self.nodes[el.0].is_tag(tag) {
            let new = self.create_element(tag, None);
            self.replace(el, new)?;
            el = new;
        }
        self.state.mount_point = Some(el);
        self.state.el = Some(el);
        self.state.next_move = None;
        Ok(())
    }

    fn move_to_parent(&mut self) -> RenderResult<()> {
        if self.state.next_move == Some(Move::FirstChild) {
            self.state.next_move = None;
            return Ok(());
        }
        let el = self.current()?;
        let parent = self.nodes[el.0]
            .parent
            .ok_or_else(|| rejected("move to parent without parent"))?;
        while let Some(extra) = self.next_sibling(el) {
            self.detach(extra);
        }
        self.state.el = Some(parent);
        self.state.next_move = None;
        Ok(())
    }

    fn remove_other_attrs(&mut self) -> RenderResult<()> {
        if self.state.next_move.is_some() {
            return Err(rejected("remove other attributes with a pending move"));
        }
        let el = self.current()?;
        let keep = &self.state.attr_names;
        self.nodes[el.0].attrs.retain(|k, _| keep.contains(k));
        Ok(())
    }

    fn set_inner_html(&mut self, html: &str) -> RenderResult<()> {
        if self.state.next_move.is_some() {
            return Err(rejected("set inner html with a pending move"));
        }
        let el = self.current()?;
        if self.nodes[el.0].tag().is_none() {
            return Err(rejected("set inner html on a non-element"));
        }
        let mut content = std::mem::take(&mut self.state.inner_html_buffer);
        content.push_str(html);
        for child in std::mem::take(&mut self.nodes[el.0].children) {
            self.nodes[child.0].parent = None;
        }
        self.nodes[el.0].inner_html = if content.is_empty() { None } else { Some(content) };
        Ok(())
    }

    fn set_event_listener(&mut self, position_id: String, event_type: &str, capture: u8, passive: u8) -> RenderResult<()> {
        let el = self.current()?;
        let key = format!("{event_type}|{}|{}", u8::from(capture != 0), u8::from(passive != 0));
        self.state.event_keys.insert(key.clone());
        self.state
            .listener_map
            .entry(position_id.clone())
            .or_default()
            .insert(key.clone());
        self.nodes[el.0].listeners.insert(key, position_id);
        Ok(())
    }

    fn remove_other_event_listeners(&mut self, position_id: &str) -> RenderResult<()> {
        let Some(keys) = self.state.listener_map.get_mut(position_id) else {
            return Ok(());
        };
        let stale: Vec<String> = keys
            .iter()
            .filter(|k| !self.state.event_keys.contains(*k))
            .cloned()
            .collect();
        for key in &stale {
            keys.remove(key);
        }
        if keys.is_empty() {
            self.state.listener_map.remove(position_id);
        }
        if let Some(el) = self.state.el {
            let listeners = &mut self.nodes[el.0].listeners;
            for key in &stale {
                listeners.remove(key);
            }
        }
        Ok(())
    }

    fn side_tag_key(&self, id: MockId, key_attr: &str) -> String {
        let node = &self.nodes[id.0];
        match node.attrs.get(key_attr) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => node
                .children
                .iter()
                .map(|c| self.nodes[c.0].text.as_str())
                .collect(),
        }
    }

    fn set_side_tag(
        &mut self,
        tag: &str,
        text: &str,
        attrs: BTreeMap<String, String>,
        key_attr: &str,
        css: bool,
    ) -> RenderResult<()> {
        let key = match attrs.get(key_attr) {
            Some(val) if tag != "style" => val.clone(),
            _ => text.to_string(),
        };
        if key.is_empty() {
            trace!(tag, "Side tag ignored, empty key");
            return Ok(());
        }

        let found = self
            .query_all(tag)
            .into_iter()
            .find(|id| self.side_tag_key(*id, key_attr) == key);
        let id = match found {
            Some(id) => id,
            None => {
                let id = self.create_element(tag, None);
                self.nodes[id.0].attrs = attrs;
                self.nodes[id.0].host_created = true;
                if !text.is_empty() {
                    let text = self.create_char_data(MockKind::Text, text);
                    self.append_child(id, text);
                }
                let head = self.head();
                self.append_child(head, id);
                id
            }
        };
        if css {
            self.state.css_seen.push(id);
        } else {
            self.state.js_seen.push(id);
        }
        Ok(())
    }

    fn remove_other_side_tags(&mut self, tags: &[&str], css: bool) {
        let seen = if css {
            std::mem::take(&mut self.state.css_seen)
        } else {
            std::mem::take(&mut self.state.js_seen)
        };
        let stale: Vec<MockId> = self
            .attached()
            .into_iter()
            .filter(|id| {
                let node = &self.nodes[id.0];
                node.host_created && tags.iter().any(|t| node.is_tag(t)) && !seen.contains(id)
            })
            .collect();
        for id in stale {
            self.detach(id);
        }
    }

    fn execute(&mut self, batch: &[u8]) -> RenderResult<Vec<HostCallback>> {
        let mut callbacks = Vec::new();
        let mut d = Decoder { buf: batch, pos: 0 };

        loop {
            let raw = d.u8()?;
            let op = Opcode::try_from(raw).map_err(|op| rejected(format!("invalid opcode {op}")))?;
            trace!(?op, "Mock host executing");
            match op {
                Opcode::End => break,
                Opcode::ClearEl => {
                    self.state.el = None;
                    self.state.next_move = None;
                }
                Opcode::SelectQuery => {
                    let selector = d.string()?;
                    self.state.el = self.query(&selector);
                    self.state.next_move = None;
                    self.state.attr_names.clear();
                    self.state.event_keys.clear();
                }
                Opcode::SetAttrStr => {
                    let key = d.string()?;
                    let val = d.string()?;
                    let el = self.current()?;
                    self.nodes[el.0].attrs.insert(key.clone(), val);
                    self.state.attr_names.insert(key);
                }
                Opcode::SetAttrNsStr => {
                    let _namespace = d.string()?;
                    let key = d.string()?;
                    let val = d.string()?;
                    let el = self.current()?;
                    self.nodes[el.0].attrs.insert(key.clone(), val);
                    self.state.attr_names.insert(key);
                }
                Opcode::RemoveOtherAttrs => self.remove_other_attrs()?,
                Opcode::SetProperty => {
                    let key = d.string()?;
                    let json = d.bytes()?;
                    let value: Value = serde_json::from_slice(json)
                        .map_err(|err| rejected(format!("bad property json: {err}")))?;
                    let el = self.current()?;
                    self.nodes[el.0].props.insert(key, value);
                }
                Opcode::SelectMountPoint => {
                    let selector = d.string()?;
                    let tag = d.string()?;
                    self.select_mount_point(&selector, &tag)?;
                }
                Opcode::MoveToFirstChild => {
                    self.run_pending_move()?;
                    self.current()?;
                    self.state.next_move = Some(Move::FirstChild);
                }
                Opcode::MoveToNextSibling => {
                    self.run_pending_move()?;
                    self.current()?;
                    self.state.next_move = Some(Move::NextSibling);
                }
                Opcode::MoveToParent => self.move_to_parent()?,
                Opcode::SetElement => {
                    let tag = d.string()?;
                    self.set_element(&tag, None)?;
                }
                Opcode::SetElementNs => {
                    let tag = d.string()?;
                    let namespace = d.string()?;
                    self.set_element(&tag, Some(namespace))?;
                }
                Opcode::SetText => {
                    let text = d.string()?;
                    self.set_char_data(MockKind::Text, &text)?;
                }
                Opcode::SetComment => {
                    let text = d.string()?;
                    self.set_char_data(MockKind::Comment, &text)?;
                }
                Opcode::BufferInnerHtml => {
                    let chunk = d.string()?;
                    self.state.inner_html_buffer.push_str(&chunk);
                }
                Opcode::SetInnerHtml => {
                    let html = d.string()?;
                    self.set_inner_html(&html)?;
                }
                Opcode::SetEventListener => {
                    let position_id = d.string()?;
                    let event_type = d.string()?;
                    let capture = d.u8()?;
                    let passive = d.u8()?;
                    self.set_event_listener(position_id, &event_type, capture, passive)?;
                }
                Opcode::RemoveOtherEventListeners => {
                    let position_id = d.string()?;
                    self.remove_other_event_listeners(&position_id)?;
                }
                Opcode::SetCssTag | Opcode::SetJsTag => {
                    let tag = d.string()?;
                    let text = d.string()?;
                    let count = d.u8()?;
                    if count % 2 != 0 {
                        return Err(rejected(format!("odd attribute string count {count}")));
                    }
                    let mut attrs = BTreeMap::new();
                    for _ in 0..count / 2 {
                        let k = d.string()?;
                        let v = d.string()?;
                        attrs.insert(k, v);
                    }
                    if op == Opcode::SetCssTag {
                        self.set_side_tag(&tag, &text, attrs, "href", true)?;
                    } else {
                        self.set_side_tag(&tag, &text, attrs, "src", false)?;
                    }
                }
                Opcode::RemoveOtherCssTags => self.remove_other_side_tags(&["style", "link"], true),
                Opcode::RemoveOtherJsTags => self.remove_other_side_tags(&["script"], false),
                Opcode::CallbackLastElement => {
                    let id = d.u32()?;
                    let el = self.current()?;
                    callbacks.push(HostCallback {
                        id,
                        element: Some(ElementHandle::new(el)),
                    });
                }
                Opcode::Callback => {
                    let id = d.u32()?;
                    callbacks.push(HostCallback { id, element: None });
                }
            }
        }
        Ok(callbacks)
    }
}

impl Host for MockHost {
    fn apply(&mut self, batch: &[u8]) -> RenderResult<Vec<HostCallback>> {
        if !self.alive {
            return Err(rejected("host is gone"));
        }
        self.batches.push(batch.to_vec());
        self.execute(batch)
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn take(&mut self, len: usize) -> RenderResult<&'a [u8]> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or_else(|| rejected(format!("batch truncated at byte {}", self.pos)))?;
        self.pos += len;
        Ok(bytes)
    }

    fn u8(&mut self) -> RenderResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> RenderResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn bytes(&mut self) -> RenderResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> RenderResult<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|err| rejected(format!("invalid utf-8: {err}")))
    }
}

fn rejected(message: impl Into<String>) -> RenderError {
    RenderError::HostRejected {
        message: message.into(),
    }
}
