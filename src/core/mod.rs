//! Run orchestration: the turn driver, its events and the output framer.

pub mod driver;
pub mod events;
pub mod frame;
pub mod turn_log;
