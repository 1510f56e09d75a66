#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod safety;
pub mod workers;

pub use config::Config;
pub use engine::{EngineConfig, FinalReport, LoopOutcome, ReactEngine, SessionHistory};
pub use error::{OpsError, Result};
pub use safety::{PolicyEngine, RiskLevel, SafetyVerdict};
pub use workers::{ChatWorker, Instruction, ShellWorker, WorkerRegistry, WorkerResult};
