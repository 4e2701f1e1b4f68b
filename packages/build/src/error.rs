use thiserror::Error;
use vellum_core::ComponentId;

pub type BuildResult<T> = Result<T, BuildError>;

/// Failures of a build pass. All of them point at a bug in component code or
/// in the engine itself, so the pass is abandoned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Component {id:?} is already borrowed and cannot be built")]
    ComponentBusy { id: ComponentId },

    #[error("Component {id:?} contains itself (nesting depth {depth})")]
    RecursiveComponent { id: ComponentId, depth: usize },

    #[error("Position hash stack still holds {depth} entries after the build walk")]
    UnbalancedPositionStack { depth: usize },
}
