//! Replay table support
//!
//! Loads recorded sessions for the replay source so that recorded data flows
//! through the same transmitter path as synthetic data.

pub mod table;

pub use table::{ReplayTable, TableFormat, TableRow};
