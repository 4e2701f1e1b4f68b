use thiserror::Error;

/// Errors raised by the host environment coordination layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("Host environment is no longer available")]
    HostUnavailable,

    #[error("Render loop was asked to exit")]
    ExitRequested,
}
