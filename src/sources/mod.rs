//! Sample source implementations

pub mod replay;
pub mod synthetic;

pub use replay::{EndPolicy, ReplaySource, SPEED_RANGE};
pub use synthetic::Synthesizer;
