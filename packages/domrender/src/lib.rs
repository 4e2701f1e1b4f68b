pub mod callbacks;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod instructions;
pub mod mock;
pub mod namespace;
pub mod render_loop;
pub mod renderer;

#[cfg(test)]
mod tests_instructions;

#[cfg(test)]
mod tests_renderer;

pub use callbacks::CallbackTable;
pub use config::{RendererConfig, DEFAULT_CONFIG_NAME};
pub use dispatch::EventPayload;
pub use error::{RenderError, RenderResult};
pub use host::{Host, HostCallback, HostSink};
pub use instructions::{FlushSink, InstructionList, Opcode};
pub use namespace::namespace_to_uri;
pub use render_loop::RenderLoop;
pub use renderer::DomRenderer;
