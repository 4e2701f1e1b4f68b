//! Binary instruction stream sent to the host.
//!
//! Each record is a one byte opcode followed by its fields. Strings and byte
//! payloads are a 4-byte big-endian length followed by the raw bytes; flags
//! are single bytes; callback ids are 4-byte big-endian integers. The buffer
//! has a fixed capacity with the last byte reserved for the end marker, which
//! the flush sink writes.

use tracing::trace;

use crate::error::{RenderError, RenderResult};

/// Opcode values are shared with the host interpreter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    End = 0,
    ClearEl = 1,
    RemoveOtherAttrs = 5,
    SetAttrStr = 6,
    SelectMountPoint = 7,
    MoveToFirstChild = 20,
    SetElement = 21,
    SetText = 23,
    SetComment = 24,
    MoveToParent = 25,
    MoveToNextSibling = 26,
    RemoveOtherEventListeners = 27,
    SetEventListener = 28,
    SetInnerHtml = 29,
    SetCssTag = 30,
    RemoveOtherCssTags = 31,
    SetJsTag = 32,
    RemoveOtherJsTags = 33,
    SetProperty = 35,
    SelectQuery = 36,
    BufferInnerHtml = 37,
    SetAttrNsStr = 38,
    SetElementNs = 39,
    Callback = 40,
    CallbackLastElement = 41,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        let op = match value {
            0 => Opcode::End,
            1 => Opcode::ClearEl,
            5 => Opcode::RemoveOtherAttrs,
            6 => Opcode::SetAttrStr,
            7 => Opcode::SelectMountPoint,
            20 => Opcode::MoveToFirstChild,
            21 => Opcode::SetElement,
            23 => Opcode::SetText,
            24 => Opcode::SetComment,
            25 => Opcode::MoveToParent,
            26 => Opcode::MoveToNextSibling,
            27 => Opcode::RemoveOtherEventListeners,
            28 => Opcode::SetEventListener,
            29 => Opcode::SetInnerHtml,
            30 => Opcode::SetCssTag,
            31 => Opcode::RemoveOtherCssTags,
            32 => Opcode::SetJsTag,
            33 => Opcode::RemoveOtherJsTags,
            35 => Opcode::SetProperty,
            36 => Opcode::SelectQuery,
            37 => Opcode::BufferInnerHtml,
            38 => Opcode::SetAttrNsStr,
            39 => Opcode::SetElementNs,
            40 => Opcode::Callback,
            41 => Opcode::CallbackLastElement,
            other => return Err(other),
        };
        Ok(op)
    }
}

/// Maximum number of attribute strings (keys and values) on a CSS or JS tag.
pub const MAX_SIDE_TAG_ATTR_STRINGS: usize = 254;

/// Receives the buffer when it has to be emptied.
///
/// The sink must consume `buf[..len]` and write the end marker at
/// `buf[len]`, which is always inside the buffer.
pub trait FlushSink {
    fn flush(&mut self, buf: &mut [u8], len: usize) -> RenderResult<()>;
}

impl<F> FlushSink for F
where
    F: FnMut(&mut [u8], usize) -> RenderResult<()>,
{
    fn flush(&mut self, buf: &mut [u8], len: usize) -> RenderResult<()> {
        self(buf, len)
    }
}

pub struct InstructionList<S> {
    buf: Vec<u8>,
    pos: usize,
    sink: S,
}

impl<S: FlushSink> InstructionList<S> {
    /// A list with `capacity` bytes. Capacities under 2 are raised to 2 so
    /// there is always room for one byte plus the end marker.
    pub fn new(capacity: usize, sink: S) -> Self {
        Self {
            buf: vec![0; capacity.max(2)],
            pos: 0,
            sink,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written since the last flush.
    pub fn pending(&self) -> usize {
        self.pos
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Drop anything written since the last flush.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Hand the written bytes to the sink and rewind.
    pub fn flush(&mut self) -> RenderResult<()> {
        trace!(len = self.pos, "Flushing instructions");
        let len = self.pos;
        self.pos = 0;
        self.sink.flush(&mut self.buf, len)
    }

    pub fn write_clear_el(&mut self) -> RenderResult<()> {
        self.write_opcode_only(Opcode::ClearEl)
    }

    pub fn write_remove_other_attrs(&mut self) -> RenderResult<()> {
        self.write_opcode_only(Opcode::RemoveOtherAttrs)
    }

    pub fn write_set_attr_str(&mut self, key: &str, val: &str) -> RenderResult<()> {
        self.reserve(1 + str_len(key) + str_len(val))?;
        self.put_opcode(Opcode::SetAttrStr);
        self.put_str(key);
        self.put_str(val);
        Ok(())
    }

    pub fn write_set_attr_ns_str(&mut self, namespace: &str, key: &str, val: &str) -> RenderResult<()> {
        self.reserve(1 + str_len(namespace) + str_len(key) + str_len(val))?;
        self.put_opcode(Opcode::SetAttrNsStr);
        self.put_str(namespace);
        self.put_str(key);
        self.put_str(val);
        Ok(())
    }

    pub fn write_select_query(&mut self, selector: &str) -> RenderResult<()> {
        self.write_opcode_str(Opcode::SelectQuery, selector)
    }

    pub fn write_select_mount_point(&mut self, selector: &str, tag: &str) -> RenderResult<()> {
        self.reserve(1 + str_len(selector) + str_len(tag))?;
        self.put_opcode(Opcode::SelectMountPoint);
        self.put_str(selector);
        self.put_str(tag);
        Ok(())
    }

    pub fn write_move_to_first_child(&mut self) -> RenderResult<()> {
        self.write_opcode_only(Opcode::MoveToFirstChild)
    }

    pub fn write_move_to_parent(&mut self) -> RenderResult<()> {
        self.write_opcode_only(Opcode::MoveToParent)
    }

    pub fn write_move_to_next_sibling(&mut self) -> RenderResult<()> {
        self.write_opcode_only(Opcode::MoveToNextSibling)
    }

    pub fn write_set_element(&mut self, tag: &str) -> RenderResult<()> {
        self.write_opcode_str(Opcode::SetElement, tag)
    }

    pub fn write_set_element_ns(&mut self, tag: &str, namespace: &str) -> RenderResult<()> {
        self.reserve(1 + str_len(tag) + str_len(namespace))?;
        self.put_opcode(Opcode::SetElementNs);
        self.put_str(tag);
        self.put_str(namespace);
        Ok(())
    }

    pub fn write_set_text(&mut self, text: &str) -> RenderResult<()> {
        self.write_opcode_str(Opcode::SetText, text)
    }

    pub fn write_set_comment(&mut self, comment: &str) -> RenderResult<()> {
        self.write_opcode_str(Opcode::SetComment, comment)
    }

    pub fn write_set_event_listener(
        &mut self,
        position_id: &str,
        event_type: &str,
        capture: bool,
        passive: bool,
    ) -> RenderResult<()> {
        self.reserve(1 + str_len(position_id) + str_len(event_type) + 2)?;
        self.put_opcode(Opcode::SetEventListener);
        self.put_str(position_id);
        self.put_str(event_type);
        self.put_u8(u8::from(capture));
        self.put_u8(u8::from(passive));
        Ok(())
    }

    pub fn write_remove_other_event_listeners(&mut self, position_id: &str) -> RenderResult<()> {
        self.write_opcode_str(Opcode::RemoveOtherEventListeners, position_id)
    }

    /// Inner content that does not fit in the space left is sent as a run of
    /// buffered chunks, each flushed right away, and completed by one final
    /// set instruction carrying the remainder. Chunks end on character
    /// boundaries.
    pub fn write_set_inner_html(&mut self, html: &str) -> RenderResult<()> {
        // Room for the opcode, the length and at least one byte.
        self.reserve(6)?;
        let max_len = self.capacity() - 6;

        let mut rest = html;
        while rest.len() > max_len - self.pos {
            let mut take = max_len - self.pos;
            while take > 0 && !rest.is_char_boundary(take) {
                take -= 1;
            }
            if take == 0 {
                if self.pos == 0 {
                    // Not even the first character fits an empty buffer.
                    let char_len = rest.chars().next().map_or(1, char::len_utf8);
                    return Err(RenderError::DoesNotFit {
                        required: char_len + 5,
                        capacity: self.capacity(),
                    });
                }
                self.flush()?;
                continue;
            }

            let (chunk, tail) = rest.split_at(take);
            self.reserve(chunk.len() + 5)?;
            self.put_opcode(Opcode::BufferInnerHtml);
            self.put_str(chunk);
            self.flush()?;
            rest = tail;
        }

        self.write_opcode_str(Opcode::SetInnerHtml, rest)
    }

    /// Write a style or link tag. `attrs` are key/value pairs.
    pub fn write_set_css_tag(&mut self, tag: &str, text: &str, attrs: &[(String, String)]) -> RenderResult<()> {
        self.write_side_tag(Opcode::SetCssTag, tag, text, attrs)
    }

    pub fn write_remove_other_css_tags(&mut self) -> RenderResult<()> {
        self.write_opcode_only(Opcode::RemoveOtherCssTags)
    }

    /// Write a script tag. `attrs` are key/value pairs.
    pub fn write_set_js_tag(&mut self, tag: &str, text: &str, attrs: &[(String, String)]) -> RenderResult<()> {
        self.write_side_tag(Opcode::SetJsTag, tag, text, attrs)
    }

    pub fn write_remove_other_js_tags(&mut self) -> RenderResult<()> {
        self.write_opcode_only(Opcode::RemoveOtherJsTags)
    }

    pub fn write_set_property(&mut self, key: &str, json_val: &[u8]) -> RenderResult<()> {
        self.reserve(1 + str_len(key) + 4 + json_val.len())?;
        self.put_opcode(Opcode::SetProperty);
        self.put_str(key);
        self.put_bytes(json_val);
        Ok(())
    }

    pub fn write_callback(&mut self, id: u32) -> RenderResult<()> {
        self.write_opcode_u32(Opcode::Callback, id)
    }

    pub fn write_callback_last_element(&mut self, id: u32) -> RenderResult<()> {
        self.write_opcode_u32(Opcode::CallbackLastElement, id)
    }

    fn write_side_tag(
        &mut self,
        op: Opcode,
        tag: &str,
        text: &str,
        attrs: &[(String, String)],
    ) -> RenderResult<()> {
        let count = attrs.len() * 2;
        if count > MAX_SIDE_TAG_ATTR_STRINGS {
            return Err(RenderError::TooManyAttributes {
                tag: tag.to_string(),
                count,
            });
        }

        let attrs_len: usize = attrs.iter().map(|(k, v)| str_len(k) + str_len(v)).sum();
        self.reserve(1 + str_len(tag) + str_len(text) + 1 + attrs_len)?;
        self.put_opcode(op);
        self.put_str(tag);
        self.put_str(text);
        // count <= 254 checked above
        self.put_u8(count as u8);
        for (k, v) in attrs {
            self.put_str(k);
            self.put_str(v);
        }
        Ok(())
    }

    fn write_opcode_only(&mut self, op: Opcode) -> RenderResult<()> {
        self.reserve(1)?;
        self.put_opcode(op);
        Ok(())
    }

    fn write_opcode_str(&mut self, op: Opcode, s: &str) -> RenderResult<()> {
        self.reserve(1 + str_len(s))?;
        self.put_opcode(op);
        self.put_str(s);
        Ok(())
    }

    fn write_opcode_u32(&mut self, op: Opcode, v: u32) -> RenderResult<()> {
        self.reserve(5)?;
        self.put_opcode(op);
        self.put_u32(v);
        Ok(())
    }

    fn fits(&self, len: usize) -> bool {
        self.pos + len <= self.buf.len() - 1
    }

    /// Make room for `len` bytes, flushing once if needed.
    fn reserve(&mut self, len: usize) -> RenderResult<()> {
        if self.fits(len) {
            return Ok(());
        }
        self.flush()?;
        if self.fits(len) {
            Ok(())
        } else {
            Err(RenderError::DoesNotFit {
                required: len,
                capacity: self.capacity(),
            })
        }
    }

    fn put_opcode(&mut self, op: Opcode) {
        trace!(?op, pos = self.pos, "Encoding instruction");
        self.put_u8(op as u8);
    }

    fn put_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn put_u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_be_bytes());
        self.pos += 4;
    }

    fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    fn put_bytes(&mut self, b: &[u8]) {
        // Lengths are bounded by the buffer capacity, checked in reserve.
        self.put_u32(b.len() as u32);
        self.buf[self.pos..self.pos + b.len()].copy_from_slice(b);
        self.pos += b.len();
    }
}

fn str_len(s: &str) -> usize {
    4 + s.len()
}

#[cfg(test)]
impl<S: FlushSink> InstructionList<S> {
    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub(crate) fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }
}
