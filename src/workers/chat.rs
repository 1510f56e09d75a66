use super::types::{ArgValue, WorkerResult};
use super::Worker;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// Terminal worker: delivers a natural-language response to the user and
/// asserts completion. Its `task_completed` flag is what ends the loop after
/// summaries, fallbacks, and plain answers.
#[derive(Default)]
pub struct ChatWorker;

impl ChatWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Worker for ChatWorker {
    fn name(&self) -> &str {
        "chat"
    }

    fn get_capabilities(&self) -> Vec<String> {
        vec!["respond".to_string()]
    }

    fn execute<'a>(
        &'a self,
        action: &'a str,
        args: &'a BTreeMap<String, ArgValue>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerResult>> + Send + 'a>> {
        Box::pin(async move {
            if action != "respond" {
                anyhow::bail!("chat worker does not support action {action}");
            }

            let message = args
                .get("message")
                .and_then(ArgValue::as_str)
                .unwrap_or_default()
                .to_string();

            Ok(WorkerResult::ok(message).completed())
        })
    }
}
