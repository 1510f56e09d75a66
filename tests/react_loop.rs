//! End-to-end loop tests through the public crate surface, with scripted
//! collaborators standing in for the LLM and the shell.

use opspilot::engine::{EngineConfig, LoopOutcome, ReactEngine, SessionHistory};
use opspilot::llm::LlmClient;
use opspilot::safety::{PolicyEngine, RiskLevel};
use opspilot::workers::{ArgValue, ChatWorker, Worker, WorkerRegistry, WorkerResult};
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct ScriptedLlm {
    responses: Vec<String>,
    calls: AtomicUsize,
}

impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate<'a>(
        &'a self,
        _system_prompt: &'a str,
        _user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(call)
                .or_else(|| self.responses.last())
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no scripted response"))
        })
    }
}

struct ScriptedShell {
    results: Vec<WorkerResult>,
    calls: AtomicUsize,
}

impl Worker for ScriptedShell {
    fn name(&self) -> &str {
        "shell"
    }

    fn get_capabilities(&self) -> Vec<String> {
        vec!["execute_command".to_string()]
    }

    fn execute<'a>(
        &'a self,
        _action: &'a str,
        _args: &'a BTreeMap<String, ArgValue>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerResult>> + Send + 'a>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .results
                .get(call)
                .or_else(|| self.results.last())
                .cloned()
                .unwrap_or_else(|| WorkerResult::ok("ok")))
        })
    }
}

fn shell_response(command: &str, is_final: bool) -> String {
    json!({
        "thinking": "one step at a time",
        "instruction": {
            "worker": "shell",
            "action": "execute_command",
            "args": {"command": command}
        },
        "is_final": is_final
    })
    .to_string()
}

fn engine_with(
    responses: &[&str],
    results: Vec<WorkerResult>,
    config: EngineConfig,
) -> (ReactEngine, Arc<ScriptedShell>, Arc<ScriptedLlm>) {
    let llm = Arc::new(ScriptedLlm {
        responses: responses.iter().map(ToString::to_string).collect(),
        calls: AtomicUsize::new(0),
    });
    let shell = Arc::new(ScriptedShell {
        results,
        calls: AtomicUsize::new(0),
    });

    let mut registry = WorkerRegistry::new();
    registry.register(shell.clone());
    registry.register(Arc::new(ChatWorker::new()));

    let engine = ReactEngine::new(
        Arc::new(PolicyEngine::new()),
        Arc::new(registry),
        llm.clone(),
        config,
    );
    (engine, shell, llm)
}

#[tokio::test]
async fn safe_request_runs_to_completion() {
    let (engine, shell, llm) = engine_with(
        &[&shell_response("uptime", true)],
        vec![WorkerResult::ok("14:02 up 3 days")],
        EngineConfig::default(),
    );

    let outcome = engine.react_loop("how long has the host been up?", SessionHistory::new()).await;
    let LoopOutcome::Final(report) = outcome else {
        panic!("expected final report");
    };

    assert!(report.task_completed);
    assert_eq!(report.message, "14:02 up 3 days");
    assert_eq!(report.history.len(), 1);
    assert_eq!(shell.calls.load(Ordering::SeqCst), 1);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn high_risk_requires_explicit_resume() {
    let (engine, shell, _) = engine_with(
        &[&shell_response("rm -rf /tmp/cache", true)],
        vec![WorkerResult::ok("removed")],
        EngineConfig::default(),
    );

    let outcome = engine.react_loop("clear the cache", SessionHistory::new()).await;
    let LoopOutcome::AwaitingApproval {
        session_id,
        risk_level,
        ..
    } = outcome
    else {
        panic!("expected approval suspension");
    };
    assert_eq!(risk_level, RiskLevel::High);
    assert_eq!(shell.calls.load(Ordering::SeqCst), 0);

    let resumed = engine.resume(&session_id, true).await.unwrap();
    let LoopOutcome::Final(report) = resumed else {
        panic!("expected final report after approval");
    };
    assert!(report.task_completed);
    assert_eq!(shell.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancel_parks_session_as_denied() {
    let (engine, shell, _) = engine_with(
        &[&shell_response("rm -rf /tmp/cache", true)],
        vec![WorkerResult::ok("removed")],
        EngineConfig::default(),
    );

    let outcome = engine.react_loop("clear the cache", SessionHistory::new()).await;
    let LoopOutcome::AwaitingApproval { session_id, .. } = outcome else {
        panic!("expected approval suspension");
    };

    let report = engine.cancel(&session_id).await.unwrap();
    assert!(report.cancelled);
    assert!(report.message.contains("Cancelled by user"));
    assert_eq!(shell.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn session_history_carries_across_turns() {
    let (engine, _, _) = engine_with(
        &[&shell_response("docker ps", false), &shell_response("docker logs web", true)],
        vec![WorkerResult::ok("CONTAINER ID ..."), WorkerResult::ok("log lines")],
        EngineConfig::default(),
    );

    let outcome = engine.react_loop("what containers run here?", SessionHistory::new()).await;
    let LoopOutcome::Final(report) = outcome else {
        panic!("expected final report");
    };

    assert_eq!(report.history.len(), 2);
    assert!(report.history.entries[0]
        .instruction
        .command_arg()
        .is_some_and(|c| c.contains("docker ps")));
}
