//! Worker boundary: named executors the engine dispatches instructions to.
//! Workers are stateless collaborators; each call stands alone.

pub mod chat;
pub mod registry;
pub mod shell;
pub mod types;

pub use chat::ChatWorker;
pub use registry::WorkerRegistry;
pub use shell::ShellWorker;
pub use types::{ArgValue, Instruction, WorkerResult};

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// A capability provider the engine can dispatch instructions to.
pub trait Worker: Send + Sync {
    /// Worker name used in instructions (`shell`, `chat`, ...).
    fn name(&self) -> &str;

    /// Action names this worker supports.
    fn get_capabilities(&self) -> Vec<String>;

    /// Execute one action. Domain-level failures (non-zero exit codes)
    /// return `Ok` with `success = false` and structured data; only
    /// system-level problems (missing arguments, unsupported actions)
    /// return `Err`.
    fn execute<'a>(
        &'a self,
        action: &'a str,
        args: &'a BTreeMap<String, ArgValue>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerResult>> + Send + 'a>>;
}
