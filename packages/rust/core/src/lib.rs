//! Job orchestration: the verification pipeline, its single-worker queue,
//! cross-validation, and progress reporting.

pub mod crossval;
pub mod pipeline;
pub mod progress;
pub mod queue;

pub use crossval::{CrossValidation, cross_validate};
pub use pipeline::{Orchestrator, StartStage};
pub use progress::percent_complete;
pub use queue::{JobQueue, JobRequest};
