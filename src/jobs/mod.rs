//! Background job orchestration: scheduling, progress reporting, and the
//! document processing pipeline

mod pipeline;
mod reporter;
mod scheduler;
mod service;

pub use pipeline::DocumentPipeline;
pub use reporter::ProgressReporter;
pub use scheduler::{JobRunner, Scheduler};
pub use service::{JobProgress, JobService};
