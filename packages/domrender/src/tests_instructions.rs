use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{RenderError, RenderResult};
use crate::instructions::*;

type Sent = Rc<RefCell<Vec<Vec<u8>>>>;

/// A list whose sink marks the end, records a copy of the whole buffer and
/// then zeroes it.
fn recording_list(capacity: usize) -> (InstructionList<impl FlushSink>, Sent) {
    let sent: Sent = Rc::new(RefCell::new(Vec::new()));
    let sink = {
        let sent = sent.clone();
        move |buf: &mut [u8], len: usize| -> RenderResult<()> {
            buf[len] = 0;
            sent.borrow_mut().push(buf.to_vec());
            buf.fill(0);
            Ok(())
        }
    };
    (InstructionList::new(capacity, sink), sent)
}

fn prefill(list: &mut InstructionList<impl FlushSink>, pos: usize) {
    list.buffer_mut()[..pos].fill(255);
    list.set_pos(pos);
}

struct InnerHtmlCase {
    position: usize,
    html: Vec<u8>,
    sent: Vec<Vec<u8>>,
    output: Vec<u8>,
}

fn check_inner_html(case: InnerHtmlCase) {
    let (mut list, sent) = recording_list(10);
    prefill(&mut list, case.position);
    let html = String::from_utf8(case.html).unwrap();

    list.write_set_inner_html(&html).unwrap();

    assert_eq!(*sent.borrow(), case.sent);
    assert_eq!(list.buffer(), case.output.as_slice());
}

#[test]
fn test_inner_html_small_message_is_not_buffered() {
    check_inner_html(InnerHtmlCase {
        position: 0,
        html: vec![1, 2, 3, 4],
        sent: vec![],
        output: vec![29, 0, 0, 0, 4, 1, 2, 3, 4, 0],
    });
}

#[test]
fn test_inner_html_buffered_because_of_offset() {
    check_inner_html(InnerHtmlCase {
        position: 3,
        html: vec![1, 2, 3, 4],
        sent: vec![vec![255, 255, 255, 37, 0, 0, 0, 1, 1, 0]],
        output: vec![29, 0, 0, 0, 3, 2, 3, 4, 0, 0],
    });
}

#[test]
fn test_inner_html_split_across_two_buffers() {
    check_inner_html(InnerHtmlCase {
        position: 0,
        html: vec![1, 2, 3, 4, 5, 6],
        sent: vec![vec![37, 0, 0, 0, 4, 1, 2, 3, 4, 0]],
        output: vec![29, 0, 0, 0, 2, 5, 6, 0, 0, 0],
    });
}

#[test]
fn test_inner_html_flushes_previous_contents_first() {
    check_inner_html(InnerHtmlCase {
        position: 8,
        html: vec![1, 2, 3, 4, 5, 6],
        sent: vec![
            vec![255, 255, 255, 255, 255, 255, 255, 255, 0, 0],
            vec![37, 0, 0, 0, 4, 1, 2, 3, 4, 0],
        ],
        output: vec![29, 0, 0, 0, 2, 5, 6, 0, 0, 0],
    });
}

#[test]
fn test_inner_html_split_across_four_buffers() {
    check_inner_html(InnerHtmlCase {
        position: 0,
        html: (1..=20).collect(),
        sent: vec![
            vec![37, 0, 0, 0, 4, 1, 2, 3, 4, 0],
            vec![37, 0, 0, 0, 4, 5, 6, 7, 8, 0],
            vec![37, 0, 0, 0, 4, 9, 10, 11, 12, 0],
            vec![37, 0, 0, 0, 4, 13, 14, 15, 16, 0],
        ],
        output: vec![29, 0, 0, 0, 4, 17, 18, 19, 20, 0],
    });
}

#[test]
fn test_inner_html_chunks_end_on_char_boundaries() {
    let (mut list, sent) = recording_list(10);
    prefill(&mut list, 3);

    list.write_set_inner_html("ééé").unwrap();

    let sent = sent.borrow();
    assert_eq!(sent.len(), 2);
    assert_eq!(&sent[0][..4], &[255, 255, 255, 0]);
    assert_eq!(&sent[1][..5], &[37, 0, 0, 0, 4]);
    assert_eq!(std::str::from_utf8(&sent[1][5..9]).unwrap(), "éé");
    assert_eq!(&list.buffer()[..7], &[29, 0, 0, 0, 2, 0xC3, 0xA9]);
}

#[test]
fn test_inner_html_char_wider_than_chunk_does_not_fit() {
    let (mut list, sent) = recording_list(8);

    let err = list.write_set_inner_html("😀😀").unwrap_err();

    assert!(matches!(
        err,
        RenderError::DoesNotFit {
            required: 9,
            capacity: 8
        }
    ));
    assert!(sent.borrow().is_empty());

    // Pending contents go out once, then the same error.
    let (mut list, sent) = recording_list(8);
    prefill(&mut list, 1);
    let err = list.write_set_inner_html("😀").unwrap_err();
    assert!(matches!(err, RenderError::DoesNotFit { required: 9, .. }));
    assert_eq!(sent.borrow().len(), 1);
}

#[test]
fn test_oversized_instruction_does_not_fit() {
    let (mut list, sent) = recording_list(10);

    let err = list.write_set_text("abcdefgh").unwrap_err();

    assert!(matches!(
        err,
        RenderError::DoesNotFit {
            required: 13,
            capacity: 10
        }
    ));
    // The retry happens after one flush.
    assert_eq!(sent.borrow().len(), 1);
}

#[test]
fn test_instruction_filling_buffer_exactly_fits() {
    let (mut list, sent) = recording_list(10);
    list.write_set_text("abcd").unwrap();
    assert_eq!(list.pending(), 9);
    assert!(sent.borrow().is_empty());

    list.write_clear_el().unwrap();
    assert_eq!(sent.borrow().len(), 1);
    assert_eq!(list.pending(), 1);
}

#[test]
fn test_event_listener_layout() {
    let (mut list, _sent) = recording_list(64);
    list.write_set_event_listener("0_1", "click", true, false).unwrap();

    let mut expected = vec![28, 0, 0, 0, 3];
    expected.extend_from_slice(b"0_1");
    expected.extend_from_slice(&[0, 0, 0, 5]);
    expected.extend_from_slice(b"click");
    expected.extend_from_slice(&[1, 0]);
    assert_eq!(&list.buffer()[..list.pending()], expected.as_slice());
}

#[test]
fn test_callback_and_property_layout() {
    let (mut list, _sent) = recording_list(64);
    list.write_callback_last_element(0x0100_0002).unwrap();
    list.write_callback(7).unwrap();
    list.write_set_property("value", b"\"x\"").unwrap();

    let expected = [
        41, 1, 0, 0, 2, //
        40, 0, 0, 0, 7, //
        35, 0, 0, 0, 5, b'v', b'a', b'l', b'u', b'e', 0, 0, 0, 3, b'"', b'x', b'"',
    ];
    assert_eq!(&list.buffer()[..list.pending()], &expected);
}

#[test]
fn test_css_tag_layout() {
    let (mut list, _sent) = recording_list(64);
    let attrs = vec![("href".to_string(), "a.css".to_string())];
    list.write_set_css_tag("link", "", &attrs).unwrap();

    let mut expected = vec![30, 0, 0, 0, 4];
    expected.extend_from_slice(b"link");
    expected.extend_from_slice(&[0, 0, 0, 0, 2, 0, 0, 0, 4]);
    expected.extend_from_slice(b"href");
    expected.extend_from_slice(&[0, 0, 0, 5]);
    expected.extend_from_slice(b"a.css");
    assert_eq!(&list.buffer()[..list.pending()], expected.as_slice());
}

#[test]
fn test_side_tag_attribute_limit() {
    let (mut list, _sent) = recording_list(64);
    let attrs: Vec<(String, String)> = (0..128).map(|i| (format!("k{i}"), String::new())).collect();

    let err = list.write_set_js_tag("script", "", &attrs).unwrap_err();

    assert!(matches!(err, RenderError::TooManyAttributes { count: 256, .. }));
    assert_eq!(list.pending(), 0);
}

#[test]
fn test_opcode_round_trips_through_u8() {
    assert_eq!(Opcode::try_from(29u8), Ok(Opcode::SetInnerHtml));
    assert_eq!(Opcode::try_from(41u8), Ok(Opcode::CallbackLastElement));
    assert_eq!(Opcode::try_from(2u8), Err(2));
    assert_eq!(Opcode::SetElementNs as u8, 39);
}
