pub mod error;
pub mod event_env;
pub mod result;

#[cfg(test)]
mod tests_event_env;

pub use error::*;
pub use event_env::*;
pub use result::*;
