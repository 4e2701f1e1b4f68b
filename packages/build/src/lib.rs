pub mod engine;
pub mod error;
pub mod results;

#[cfg(test)]
mod tests_engine;

pub use engine::BuildEngine;
pub use error::{BuildError, BuildResult};
pub use results::BuildResults;
