//! Pipeline module - dataset split and the per-query routing pipeline.

mod classifier;
mod enricher;
mod executor;
mod loader;
mod normalizer;
mod session;
mod splitter;

pub use classifier::*;
pub use enricher::*;
pub use executor::*;
pub use loader::*;
pub use normalizer::*;
pub use session::*;
pub use splitter::*;
