//! Staged article pipeline
//!
//! - [`stage`]: the contract between the executor and the stage agents
//! - [`executor`]: runs exactly one stage with its timeout and skip rules
//! - [`orchestrator`]: drives a claimed job through every stage to a
//!   terminal state, persisting progress as it goes

pub mod executor;
pub mod orchestrator;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::StageExecutor;
pub use orchestrator::{JobOutcome, Orchestrator};
pub use stage::{
    PipelineContext, StageAgent, StageError, StageErrorKind, StageInput, StageOutcome, StageOutput,
};
