//! Generation job queue
//!
//! - [`jobs`]: the job record, its stages and state machine
//! - [`store`]: the [`JobStore`] contract every backend honours
//! - [`memory`]: in-process backend (tests, `STORE_BACKEND=memory`)
//! - [`workers`]: the polling loop that claims and drives jobs
//!
//! The Postgres backend lives in `crate::db::jobs`.

pub mod jobs;
pub mod memory;
pub mod store;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

pub use jobs::{
    progress_after, CancelOutcome, ContentLength, GenerationJob, JobInput, JobStatus, NewJob,
    Stage,
};
pub use memory::InMemoryJobStore;
pub use store::JobStore;
pub use workers::Worker;
