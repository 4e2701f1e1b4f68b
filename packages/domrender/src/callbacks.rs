//! Element callbacks registered during a render pass.
//!
//! Ids carry the low 8 bits of the pass counter in their top byte, so a
//! callback the host delivers after the next pass started is recognized as
//! stale instead of running against the wrong table.

use tracing::debug;
use vellum_core::{ElementCallback, ElementHandle};

use crate::error::{RenderError, RenderResult};

const INDEX_MASK: u32 = 0x00FF_FFFF;

enum Entry {
    Create {
        handler: Option<ElementCallback>,
        element: Option<ElementHandle>,
    },
    Populate {
        handler: ElementCallback,
        create_id: u32,
    },
}

#[derive(Default)]
pub struct CallbackTable {
    generation: u8,
    entries: Vec<Entry>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous pass and start issuing ids for `pass`.
    pub fn start_pass(&mut self, pass: u64) {
        self.generation = (pass & 0xFF) as u8;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register the callbacks of one element. A create id is always allocated
    /// when either callback is present since populate needs the element the
    /// create callback captured.
    pub fn register(
        &mut self,
        create: Option<ElementCallback>,
        populate: Option<ElementCallback>,
    ) -> RenderResult<(Option<u32>, Option<u32>)> {
        if create.is_none() && populate.is_none() {
            return Ok((None, None));
        }

        let create_id = self.push(Entry::Create {
            handler: create,
            element: None,
        })?;
        let populate_id = match populate {
            Some(handler) => Some(self.push(Entry::Populate { handler, create_id })?),
            None => None,
        };
        Ok((Some(create_id), populate_id))
    }

    /// Run the callback for `id`. Create callbacks need the element the host
    /// reported and keep it for the matching populate callback.
    pub fn invoke(&mut self, id: u32, element: Option<ElementHandle>) -> RenderResult<()> {
        let index = self.index_of(id)?;
        let handler = match &self.entries[index] {
            Entry::Create { handler, .. } => {
                let handler = handler.clone();
                let element = element.ok_or(RenderError::CallbackWithoutElement { id })?;
                if let Entry::Create { element: stored, .. } = &mut self.entries[index] {
                    *stored = Some(element.clone());
                }
                handler.map(|h| (h, element))
            }
            Entry::Populate { handler, create_id } => {
                let handler = handler.clone();
                let create_index = self.index_of(*create_id)?;
                match &self.entries[create_index] {
                    Entry::Create {
                        element: Some(element),
                        ..
                    } => Some((handler, element.clone())),
                    _ => return Err(RenderError::CallbackWithoutElement { id }),
                }
            }
        };

        if let Some((handler, element)) = handler {
            debug!(id, "Running element callback");
            handler(&element);
        }
        Ok(())
    }

    fn push(&mut self, entry: Entry) -> RenderResult<u32> {
        let index = self.entries.len() + 1;
        if index > INDEX_MASK as usize {
            return Err(RenderError::TooManyCallbacks);
        }
        self.entries.push(entry);
        Ok((u32::from(self.generation) << 24) | index as u32)
    }

    fn index_of(&self, id: u32) -> RenderResult<usize> {
        if (id >> 24) as u8 != self.generation {
            return Err(RenderError::StaleCallback { id });
        }
        let index = (id & INDEX_MASK) as usize;
        if index == 0 || index > self.entries.len() {
            return Err(RenderError::UnknownCallback { id });
        }
        Ok(index - 1)
    }
}
