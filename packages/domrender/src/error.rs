use thiserror::Error;
use vellum_build::BuildError;
use vellum_common::EnvError;
use vellum_core::{ComponentId, NodeId, NodeKind};

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Error, Debug)]
pub enum RenderError {
    // Protocol and capacity
    #[error("Instruction of {required} bytes does not fit in a {capacity} byte buffer")]
    DoesNotFit { required: usize, capacity: usize },

    #[error("<{tag}> carries {count} attribute strings, at most 254 fit in one instruction")]
    TooManyAttributes { tag: String, count: usize },

    #[error("Host rejected instruction batch: {message}")]
    HostRejected { message: String },

    // Structure
    #[error("Build results have no root output")]
    MissingOutput,

    #[error("Root output must hold exactly one node, found {count}")]
    RootCount { count: usize },

    #[error("Root node must be an element, found {kind:?}")]
    RootNotElement { kind: NodeKind },

    #[error("Unexpected {found} inside <html>, only <head> and <body> are allowed")]
    UnexpectedHtmlChild { found: String },

    #[error("<body> must contain exactly one element child, found {count} children")]
    BodyChildCount { count: usize },

    #[error("Mounted node at position {position} must be an element, found {kind:?}")]
    MountNotElement { position: String, kind: NodeKind },

    #[error("Component {id:?} produced {count} root nodes, exactly one is required")]
    ComponentRootCount { id: ComponentId, count: usize },

    #[error("No build output for component {id:?}")]
    MissingComponentOutput { id: ComponentId },

    #[error("Component {id:?} delegates back into itself")]
    DelegationCycle { id: ComponentId },

    #[error("Node {node:?} is not part of its build output")]
    DanglingNode { node: NodeId },

    #[error("<{tag}> cannot be emitted as a {channel} tag")]
    InvalidSideTag { tag: String, channel: &'static str },

    #[error("{channel} tag <{tag}> may only contain text")]
    SideTagContent { tag: String, channel: &'static str },

    // Host environment
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Build(#[from] BuildError),

    // Events and callbacks
    #[error("Failed to decode event payload: {0}")]
    EventDecode(#[from] serde_json::Error),

    #[error("Event buffer of {len} bytes is truncated")]
    TruncatedEvent { len: usize },

    #[error("Event payload of {size} bytes exceeds the {limit} byte limit")]
    EventTooLarge { size: usize, limit: usize },

    #[error("No listener for '{event_type}' (capture: {capture}) at position {position_id}")]
    NoListener {
        position_id: String,
        event_type: String,
        capture: bool,
    },

    #[error("Listener for '{event_type}' at position {position_id} panicked")]
    HandlerPanicked {
        position_id: String,
        event_type: String,
    },

    #[error("Callback id {id:#x} belongs to another render pass")]
    StaleCallback { id: u32 },

    #[error("Unknown callback id {id:#x}")]
    UnknownCallback { id: u32 },

    #[error("Callback id {id:#x} needs an element but none was provided")]
    CallbackWithoutElement { id: u32 },

    #[error("Too many element callbacks in one render pass")]
    TooManyCallbacks,
}

impl RenderError {
    /// Whether the error means the host went away and the render loop should
    /// stop quietly.
    pub fn is_host_unavailable(&self) -> bool {
        matches!(
            self,
            RenderError::Env(EnvError::HostUnavailable) | RenderError::Env(EnvError::ExitRequested)
        )
    }
}
