//! Job queue, per-file processing and the worker pool

mod job_queue;
mod processor;
mod worker;

pub use job_queue::{Job, JobQueue, JobReceiver};
pub use processor::{JobProcessor, JobState};
pub use worker::WorkerPool;
