use std::cell::RefCell;
use std::rc::Rc;

use vellum_build::BuildEngine;
use vellum_common::{event_env, DEFAULT_SIGNAL_CAPACITY};
use vellum_core::{component, BuildIn, BuildOutput, ComponentRef, DomEventHandlerSpec, VNode};

use crate::config::RendererConfig;
use crate::error::{RenderError, RenderResult};
use crate::instructions::Opcode;
use crate::mock::{FnComponent, MockHost};
use crate::renderer::DomRenderer;

fn render_with(
    build: impl Fn(&mut BuildIn<'_>) -> BuildOutput + 'static,
) -> (DomRenderer<MockHost>, RenderResult<()>) {
    let (env, _signals) = event_env(DEFAULT_SIGNAL_CAPACITY);
    let mut engine = BuildEngine::new(env.clone());
    let root: ComponentRef = component(FnComponent::new(build));
    let mut renderer = DomRenderer::new(MockHost::new(), env, RendererConfig::default());
    let results = engine.run_build(&root).unwrap();
    let result = renderer.render(results);
    (renderer, result)
}

/// Decode the opcodes of one batch, skipping their operands.
fn opcodes(batch: &[u8]) -> Vec<u8> {
    let mut ops = Vec::new();
    let mut pos = 0;
    let read_u32 = |pos: &mut usize| {
        let v = u32::from_be_bytes([batch[*pos], batch[*pos + 1], batch[*pos + 2], batch[*pos + 3]]);
        *pos += 4;
        v as usize
    };
    let skip_str = |pos: &mut usize| {
        let len = read_u32(pos);
        *pos += len;
    };

    loop {
        let op = batch[pos];
        pos += 1;
        ops.push(op);
        match Opcode::try_from(op).unwrap() {
            Opcode::End => break,
            Opcode::SetAttrStr | Opcode::SelectMountPoint | Opcode::SetElementNs | Opcode::SetProperty => {
                skip_str(&mut pos);
                skip_str(&mut pos);
            }
            Opcode::SetAttrNsStr => {
                skip_str(&mut pos);
                skip_str(&mut pos);
                skip_str(&mut pos);
            }
            Opcode::SetElement
            | Opcode::SetText
            | Opcode::SetComment
            | Opcode::SetInnerHtml
            | Opcode::BufferInnerHtml
            | Opcode::SelectQuery
            | Opcode::RemoveOtherEventListeners => skip_str(&mut pos),
            Opcode::SetEventListener => {
                skip_str(&mut pos);
                skip_str(&mut pos);
                pos += 2;
            }
            Opcode::SetCssTag | Opcode::SetJsTag => {
                skip_str(&mut pos);
                skip_str(&mut pos);
                let count = batch[pos];
                pos += 1;
                for _ in 0..count {
                    skip_str(&mut pos);
                }
            }
            Opcode::Callback | Opcode::CallbackLastElement => pos += 4,
            _ => {}
        }
    }
    ops
}

fn single_root(out: &mut BuildOutput, node: VNode) -> vellum_core::NodeId {
    let id = out.nodes.add(node);
    out.out.push(id);
    id
}

#[test]
fn test_list_instruction_sequence() {
    let (renderer, result) = render_with(|_| {
        let mut out = BuildOutput::new();
        let ul = single_root(&mut out, VNode::element("ul"));
        let li = out.nodes.add_child(ul, VNode::element("li")).unwrap();
        out.nodes.add_child(li, VNode::text("a")).unwrap();
        out
    });
    result.unwrap();

    let batches = renderer.host().batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        opcodes(&batches[0]),
        vec![31, 33, 1, 7, 5, 27, 20, 21, 5, 27, 20, 23, 26, 25, 26, 25, 0]
    );
    assert_eq!(renderer.host().mount_html(), "<ul><li>a</li></ul>");
}

#[test]
fn test_empty_element_clears_host_children() {
    let (renderer, result) = render_with(|_| {
        let mut out = BuildOutput::new();
        single_root(&mut out, VNode::element("div"));
        out
    });
    result.unwrap();

    assert_eq!(opcodes(&renderer.host().batches()[0]), vec![31, 33, 1, 7, 5, 27, 29, 0]);
}

#[test]
fn test_structural_error_sends_nothing() {
    let (renderer, result) = render_with(|_| {
        let mut out = BuildOutput::new();
        single_root(&mut out, VNode::element("div"));
        single_root(&mut out, VNode::element("div"));
        out
    });

    assert!(matches!(result, Err(RenderError::RootCount { count: 2 })));
    assert!(renderer.host().batches().is_empty());
    assert_eq!(renderer.listener_positions().count(), 0);
}

#[test]
fn test_listener_positions_follow_child_index() {
    let (renderer, result) = render_with(|_| {
        let mut out = BuildOutput::new();
        let div = single_root(&mut out, VNode::element("div"));
        out.nodes.add_child(div, VNode::text("label")).unwrap();
        out.nodes
            .add_child(
                div,
                VNode::element("button").with_listener(DomEventHandlerSpec::new("click", |_| {})),
            )
            .unwrap();
        out
    });
    result.unwrap();

    let positions: Vec<&str> = renderer.listener_positions().collect();
    assert_eq!(positions, vec!["0_2"]);
}

#[test]
fn test_fragment_children_get_distinct_positions() {
    let (renderer, result) = render_with(|_| {
        let mut out = BuildOutput::new();
        let div = single_root(&mut out, VNode::element("div"));
        out.nodes
            .add_child(div, VNode::element("span").with_listener(DomEventHandlerSpec::new("click", |_| {})))
            .unwrap();
        let frag = out.nodes.add_child(div, VNode::fragment()).unwrap();
        out.nodes
            .add_child(frag, VNode::element("em").with_listener(DomEventHandlerSpec::new("click", |_| {})))
            .unwrap();
        out.nodes.add_child(frag, VNode::text("tail")).unwrap();
        out
    });
    result.unwrap();

    let mut positions: Vec<&str> = renderer.listener_positions().collect();
    positions.sort();
    assert_eq!(positions, vec!["0_1", "0_2t1"]);
    assert_eq!(renderer.host().mount_html(), "<div><span></span><em></em>tail</div>");
}

#[test]
fn test_namespaced_element_skips_xmlns() {
    let (renderer, result) = render_with(|_| {
        let mut out = BuildOutput::new();
        let div = single_root(&mut out, VNode::element("div"));
        out.nodes
            .add_child(
                div,
                VNode::element("svg")
                    .with_namespace("svg")
                    .with_attr("xmlns", "http://www.w3.org/2000/svg")
                    .with_attr("width", "10")
                    .with_ns_attr("xlink", "href", "#a"),
            )
            .unwrap();
        out
    });
    result.unwrap();

    let ops = opcodes(&renderer.host().batches()[0]);
    assert!(ops.contains(&39));
    assert!(ops.contains(&38));
    assert_eq!(
        renderer.host().mount_html(),
        "<div><svg href=\"#a\" width=\"10\"></svg></div>"
    );
}

#[test]
fn test_inner_html_supersedes_children() {
    let (renderer, result) = render_with(|_| {
        let mut out = BuildOutput::new();
        let div = single_root(&mut out, VNode::element("div").with_inner_html("<b>raw</b>"));
        out.nodes.add_child(div, VNode::text("ignored")).unwrap();
        out
    });
    result.unwrap();

    assert_eq!(renderer.host().mount_html(), "<div><b>raw</b></div>");
}

#[test]
fn test_element_callbacks_run_after_flush() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let (renderer, result) = {
        let log = log.clone();
        render_with(move |_| {
            let mut out = BuildOutput::new();
            let create_log = log.clone();
            let populate_log = log.clone();
            single_root(
                &mut out,
                VNode::element("canvas")
                    .on_create(move |_| create_log.borrow_mut().push("create"))
                    .on_populate(move |_| populate_log.borrow_mut().push("populate")),
            );
            out
        })
    };
    result.unwrap();

    let ops = opcodes(&renderer.host().batches()[0]);
    assert_eq!(ops, vec![31, 33, 1, 7, 5, 27, 41, 40, 0]);
    assert_eq!(*log.borrow(), vec!["create", "populate"]);
}

#[test]
fn test_properties_reach_host() {
    let (renderer, result) = render_with(|_| {
        let mut out = BuildOutput::new();
        single_root(
            &mut out,
            VNode::element("input").with_prop(vellum_core::VProperty::json("checked", &true).unwrap()),
        );
        out
    });
    result.unwrap();

    let host = renderer.host();
    assert_eq!(host.node(host.mount()).props["checked"], serde_json::json!(true));
}

#[test]
fn test_dead_host_is_not_rendered() {
    let (env, _signals) = event_env(DEFAULT_SIGNAL_CAPACITY);
    let mut engine = BuildEngine::new(env.clone());
    let root: ComponentRef = component(FnComponent::new(|_| {
        let mut out = BuildOutput::new();
        single_root(&mut out, VNode::element("div"));
        out
    }));
    let mut host = MockHost::new();
    host.set_alive(false);
    let mut renderer = DomRenderer::new(host, env, RendererConfig::default());

    let err = renderer.render(engine.run_build(&root).unwrap()).unwrap_err();

    assert!(err.is_host_unavailable());
    assert_eq!(renderer.render_pass(), 0);
}
