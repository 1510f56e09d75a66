use super::Worker;
use std::collections::HashMap;
use std::sync::Arc;

/// Central registry mapping worker names to instances.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker. Replaces any existing worker with the same name.
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.name().to_string(), worker);
    }

    /// Look up a worker by name. The engine treats a miss as a fatal error;
    /// the registry itself never panics.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Worker>> {
        self.workers.get(name)
    }

    /// Sorted worker names, for prompts and diagnostics.
    pub fn worker_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `worker: action, action, ...` lines describing every registered
    /// capability, embedded into the reasoning system prompt.
    pub fn capabilities_summary(&self) -> String {
        let mut lines: Vec<String> = self
            .workers
            .values()
            .map(|worker| format!("{}: {}", worker.name(), worker.get_capabilities().join(", ")))
            .collect();
        lines.sort_unstable();
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{ArgValue, ChatWorker, WorkerResult};
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::pin::Pin;

    struct EchoWorker;

    impl Worker for EchoWorker {
        fn name(&self) -> &str {
            "echo"
        }

        fn get_capabilities(&self) -> Vec<String> {
            vec!["say".to_string()]
        }

        fn execute<'a>(
            &'a self,
            _action: &'a str,
            _args: &'a BTreeMap<String, ArgValue>,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerResult>> + Send + 'a>> {
            Box::pin(async move { Ok(WorkerResult::ok("echo")) })
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = WorkerRegistry::new();
        registry.register(std::sync::Arc::new(EchoWorker));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn worker_names_are_sorted() {
        let mut registry = WorkerRegistry::new();
        registry.register(std::sync::Arc::new(EchoWorker));
        registry.register(std::sync::Arc::new(ChatWorker::new()));
        assert_eq!(registry.worker_names(), vec!["chat", "echo"]);
    }

    #[test]
    fn capabilities_summary_lists_every_worker() {
        let mut registry = WorkerRegistry::new();
        registry.register(std::sync::Arc::new(ChatWorker::new()));
        registry.register(std::sync::Arc::new(EchoWorker));
        let summary = registry.capabilities_summary();
        assert!(summary.contains("chat: respond"));
        assert!(summary.contains("echo: say"));
    }
}
