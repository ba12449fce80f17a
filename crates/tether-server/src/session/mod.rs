//! Agent session bookkeeping

mod registry;
mod sweeper;

pub use registry::{SessionHandle, SessionRegistry};
pub use sweeper::{run_liveness_sweep, sweep_stale_sessions};
