//! Download task execution -- the per-video state machine.
//!
//! Split into focused submodules:
//! - [`context`] - Shared state, state-change events, outcome bookkeeping
//! - [`orchestration`] - Normalize, dedupe, extract, select, transfer
//! - [`finalization`] - Completion bookkeeping and the description sidecar

mod context;
mod finalization;
mod orchestration;


pub(crate) use context::TaskContext;
pub(crate) use orchestration::run_download_task;
