//! Domain models

pub mod instrument;
pub mod job;

pub use instrument::Instrument;
pub use job::{Job, JobStatus, JobUpdate, PipelineKind};
