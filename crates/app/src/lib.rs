//! # Tidemark App
//!
//! Demo host for the sync core: wires a log store, three mock jobs and
//! either the periodic scheduler or an in-process queue fan-out.

pub mod context;
pub mod jobs;
pub mod mode;
pub mod queue;

pub use context::AppContext;
pub use mode::Mode;
pub use queue::{run_queue_fan_out, QueueMessage, QueueReport};
