use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use vellum_common::{event_env, DEFAULT_SIGNAL_CAPACITY};
use vellum_core::{
    component, downcast_wire, BuildIn, BuildOutput, CompKey, Component, ComponentId, ComponentRef,
    LifecycleCtx, VNode, WireFn,
};

use crate::engine::BuildEngine;
use crate::error::BuildError;

type Log = Rc<RefCell<Vec<String>>>;

struct Item {
    label: String,
    log: Log,
    positions: Vec<u64>,
    computed: u32,
    wired: bool,
}

impl Item {
    fn new(label: String, log: Log) -> Self {
        Self {
            label,
            log,
            positions: Vec::new(),
            computed: 0,
            wired: false,
        }
    }
}

impl Component for Item {
    fn build(&mut self, input: &mut BuildIn<'_>) -> BuildOutput {
        self.positions.push(input.current_position_hash());
        let mut out = BuildOutput::new();
        let li = out.nodes.add(VNode::element("li"));
        out.nodes.add_child(li, VNode::text(self.label.clone())).unwrap();
        out.out.push(li);
        out
    }

    fn init(&mut self, _ctx: &LifecycleCtx) {
        self.log.borrow_mut().push(format!("init {}", self.label));
    }

    fn compute(&mut self, _ctx: &LifecycleCtx) {
        self.computed += 1;
    }

    fn destroy(&mut self, _ctx: &LifecycleCtx) {
        self.log.borrow_mut().push(format!("destroy {}", self.label));
    }
}

struct List {
    items: Vec<String>,
    log: Log,
    built: Vec<Rc<RefCell<Item>>>,
}

impl List {
    fn new(items: &[&str], log: Log) -> Self {
        Self {
            items: items.iter().map(|s| s.to_string()).collect(),
            log,
            built: Vec::new(),
        }
    }
}

impl Component for List {
    fn build(&mut self, input: &mut BuildIn<'_>) -> BuildOutput {
        let mut out = BuildOutput::new();
        let ul = out.nodes.add(VNode::element("ul"));
        self.built.clear();
        for item in &self.items {
            let key = CompKey::new(0x4A26_5D79 ^ input.current_position_hash(), item.clone());
            let log = self.log.clone();
            let label = item.clone();
            let row = input.reuse_or_create(key, move || Item::new(label, log));
            let handle = out.add_component(&row);
            out.nodes.add_child(ul, VNode::component(handle)).unwrap();
            self.built.push(row);
        }
        out.out.push(ul);
        out
    }

    fn init(&mut self, _ctx: &LifecycleCtx) {
        self.log.borrow_mut().push("init list".to_string());
    }

    fn destroy(&mut self, _ctx: &LifecycleCtx) {
        self.log.borrow_mut().push("destroy list".to_string());
    }
}

struct Selfish {
    me: Option<ComponentRef>,
}

impl Component for Selfish {
    fn build(&mut self, _input: &mut BuildIn<'_>) -> BuildOutput {
        let mut out = BuildOutput::new();
        let div = out.nodes.add(VNode::element("div"));
        out.out.push(div);
        if let Some(me) = &self.me {
            out.components.push(me.clone());
        }
        out
    }
}

fn setup(items: &[&str]) -> (BuildEngine, Rc<RefCell<List>>, ComponentRef, Log) {
    let (env, _signals) = event_env(DEFAULT_SIGNAL_CAPACITY);
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let list = component(List::new(items, log.clone()));
    let root: ComponentRef = list.clone();
    (BuildEngine::new(env), list, root, log)
}

fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

#[test]
fn test_first_pass_initializes_everything() {
    let (mut engine, list, root, log) = setup(&["a", "b"]);

    let results = engine.run_build(&root).unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results.root_id(), Some(ComponentId::of(&root)));
    let out = results.out().unwrap();
    assert_eq!(out.nodes[out.root().unwrap()].data, "ul");
    for item in &list.borrow().built {
        let item_out = results.result_for(item).unwrap();
        assert_eq!(item_out.out.len(), 1);
    }
    let order: Vec<ComponentId> = results.components().map(ComponentId::of).collect();
    assert_eq!(order[0], ComponentId::of(&root));
    assert_eq!(drain(&log), vec!["init list", "init a", "init b"]);
    assert_eq!(engine.pass_num(), 1);
    assert_eq!(engine.live_components(), 3);
}

#[test]
fn test_instances_survive_between_passes() {
    let (mut engine, list, root, log) = setup(&["a", "b"]);
    engine.run_build(&root).unwrap();
    let first: Vec<ComponentId> = list.borrow().built.iter().map(ComponentId::of).collect();
    drain(&log);

    engine.run_build(&root).unwrap();
    let second: Vec<ComponentId> = list.borrow().built.iter().map(ComponentId::of).collect();

    assert_eq!(first, second);
    assert!(drain(&log).is_empty());
    for item in &list.borrow().built {
        assert_eq!(item.borrow().computed, 2);
    }
}

#[test]
fn test_removed_instance_destroyed_exactly_once() {
    let (mut engine, list, root, log) = setup(&["a", "b", "c"]);
    engine.run_build(&root).unwrap();
    drain(&log);

    list.borrow_mut().items = vec!["a".to_string(), "c".to_string()];
    engine.run_build(&root).unwrap();
    assert_eq!(drain(&log), vec!["destroy b"]);

    engine.run_build(&root).unwrap();
    assert!(drain(&log).is_empty());
    assert_eq!(engine.live_components(), 3);
}

#[test]
fn test_borrowed_instance_is_destroyed_on_a_later_pass() {
    let (mut engine, list, root, log) = setup(&["a", "b"]);
    engine.run_build(&root).unwrap();
    drain(&log);
    let b = list.borrow().built[1].clone();

    let guard = b.borrow();
    list.borrow_mut().items = vec!["a".to_string()];
    engine.run_build(&root).unwrap();
    drop(guard);

    assert!(drain(&log).is_empty());
    assert_eq!(engine.live_components(), 3);

    engine.run_build(&root).unwrap();
    assert_eq!(drain(&log), vec!["destroy b"]);
    assert_eq!(engine.live_components(), 2);
}

#[test]
fn test_readded_item_is_a_new_instance() {
    let (mut engine, list, root, log) = setup(&["a"]);
    engine.run_build(&root).unwrap();

    list.borrow_mut().items.clear();
    engine.run_build(&root).unwrap();
    list.borrow_mut().items = vec!["a".to_string()];
    engine.run_build(&root).unwrap();

    assert_eq!(
        drain(&log),
        vec!["init list", "init a", "destroy a", "init a"]
    );
    assert_eq!(list.borrow().built.len(), 1);
}

#[test]
fn test_sibling_positions_differ_and_are_stable() {
    let (mut engine, list, root, _log) = setup(&["a", "b"]);
    engine.run_build(&root).unwrap();
    engine.run_build(&root).unwrap();

    let built = list.borrow().built.clone();
    let a = built[0].borrow().positions.clone();
    let b = built[1].borrow().positions.clone();
    assert_eq!(a.len(), 2);
    assert_eq!(a[0], a[1]);
    assert_eq!(b[0], b[1]);
    assert_ne!(a[0], b[0]);
    assert_eq!(b[0], a[0].wrapping_add(1));
}

#[test]
fn test_previous_output_kept_for_one_pass() {
    let (mut engine, _list, root, _log) = setup(&["a"]);
    engine.run_build(&root).unwrap();
    assert!(engine.previous_output_for(&root).is_none());

    engine.run_build(&root).unwrap();
    let previous = engine.previous_output_for(&root).unwrap();
    assert_eq!(previous.components.len(), 1);
}

#[test]
fn test_root_removal_destroys_whole_tree() {
    let (mut engine, _list, root, log) = setup(&["a"]);
    engine.run_build(&root).unwrap();
    drain(&log);

    let (_, other_list, other_root, _) = setup(&[]);
    engine.run_build(&other_root).unwrap();
    let mut destroyed = drain(&log);
    destroyed.sort();

    assert_eq!(destroyed, vec!["destroy a", "destroy list"]);
    assert!(other_list.borrow().built.is_empty());
}

#[test]
fn test_busy_component_is_an_error() {
    let (mut engine, list, root, _log) = setup(&["a"]);
    let guard = list.borrow();

    let err = engine.run_build(&root).unwrap_err();
    assert_eq!(
        err,
        BuildError::ComponentBusy {
            id: ComponentId::of(&root)
        }
    );
    drop(guard);
}

#[test]
fn test_self_nesting_is_an_error() {
    let (env, _signals) = event_env(DEFAULT_SIGNAL_CAPACITY);
    let mut engine = BuildEngine::new(env);
    let selfish = component(Selfish { me: None });
    let root: ComponentRef = selfish.clone();
    selfish.borrow_mut().me = Some(root.clone());

    let err = engine.run_build(&root).unwrap_err();
    assert!(matches!(err, BuildError::RecursiveComponent { depth: 1, .. }));

    selfish.borrow_mut().me = None;
}

#[test]
fn test_wire_applies_to_new_instances() {
    let (env, _signals) = event_env(DEFAULT_SIGNAL_CAPACITY);
    let wire: WireFn = Rc::new(|target: &dyn Any| {
        if let Some(mut item) = downcast_wire::<Item>(target) {
            item.wired = true;
        }
    });
    let mut engine = BuildEngine::new(env).with_wire(wire);
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let list = component(List::new(&["x", "y"], log));
    let root: ComponentRef = list.clone();

    engine.run_build(&root).unwrap();

    assert!(list.borrow().built.iter().all(|item| item.borrow().wired));
}
