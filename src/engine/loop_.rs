use super::history::SessionHistory;
use super::intent::{ReasoningStrategy, detect_intent};
use super::prompts;
use super::state::{CheckDisposition, ReactState, StepOutput, reduce};
use crate::config::Config;
use crate::error::{OpsError, SessionError};
use crate::llm::{LlmClient, generate_with_repair};
use crate::safety::{PolicyEngine, RiskLevel};
use crate::workers::{ArgValue, Instruction, WorkerRegistry, WorkerResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Case-insensitive stdout/stderr signatures of permission failures. These
/// short-circuit recovery: retrying without privileges cannot succeed.
const PERMISSION_DENIED_MARKERS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "requires root",
    "must be root",
    "access denied",
    "eacces",
    "insufficient privileges",
];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub max_risk: RiskLevel,
    pub dry_run: bool,
    pub llm_timeout: Duration,
    pub worker_timeout: Duration,
    pub error_recovery_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_risk: RiskLevel::High,
            dry_run: false,
            llm_timeout: Duration::from_secs(120),
            worker_timeout: Duration::from_secs(120),
            error_recovery_limit: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.safety.max_iterations,
            max_risk: config.safety.max_risk,
            dry_run: config.safety.dry_run,
            llm_timeout: Duration::from_secs(config.llm.request_timeout_secs),
            worker_timeout: Duration::from_secs(config.safety.worker_timeout_secs),
            error_recovery_limit: config.safety.error_recovery_limit,
        }
    }
}

/// Result of driving the loop as far as it can go without external input.
#[derive(Debug, Clone)]
pub enum LoopOutcome {
    Final(FinalReport),
    /// A high-risk instruction is waiting for a human decision. The session
    /// is parked; re-enter with [`ReactEngine::resume`].
    AwaitingApproval {
        session_id: String,
        instruction: Instruction,
        risk_level: RiskLevel,
    },
}

#[derive(Debug, Clone)]
pub struct FinalReport {
    pub message: String,
    pub task_completed: bool,
    pub is_error: bool,
    pub cancelled: bool,
    pub suggested_commands: Vec<String>,
    pub iterations: u32,
    pub history: SessionHistory,
}

impl FinalReport {
    /// The host-facing string: the final chat message, or `Error: <reason>`
    /// for fatal failures. Cancellation renders as its own message, never
    /// conflated with errors.
    pub fn render(&self) -> String {
        if self.cancelled {
            return self.message.clone();
        }
        if self.is_error {
            return format!("Error: {}", self.message);
        }
        self.message.clone()
    }

    fn from_state(state: ReactState) -> Self {
        let message = if state.is_error {
            state
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string())
        } else {
            state.final_message.clone().unwrap_or_default()
        };
        Self {
            message,
            task_completed: state.task_completed,
            is_error: state.is_error,
            cancelled: false,
            suggested_commands: state.suggested_commands,
            iterations: state.iteration,
            history: state.history,
        }
    }

    fn cancelled(state: ReactState, detail: String) -> Self {
        Self {
            message: detail,
            task_completed: false,
            is_error: false,
            cancelled: true,
            suggested_commands: Vec::new(),
            iterations: state.iteration,
            history: state.history,
        }
    }
}

struct Reasoned {
    instruction: Instruction,
    is_final: bool,
    /// Engine-synthesized terminal responses (fallbacks, summaries,
    /// identity answers). These are not LLM-proposed actions and skip the
    /// policy gate; everything else is checked.
    internal: bool,
}

/// The ReAct iteration controller: preprocess -> reason -> safety ->
/// (approve) -> execute -> check, looping until completion, budget
/// exhaustion, or fatal error.
pub struct ReactEngine {
    policy: Arc<PolicyEngine>,
    registry: Arc<WorkerRegistry>,
    llm: Arc<dyn LlmClient>,
    config: EngineConfig,
    /// Sessions parked at the approval gate, keyed by session id.
    sessions: Mutex<HashMap<String, ReactState>>,
}

impl ReactEngine {
    pub fn new(
        policy: Arc<PolicyEngine>,
        registry: Arc<WorkerRegistry>,
        llm: Arc<dyn LlmClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            policy,
            registry,
            llm,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Run one user request to completion or to the approval gate.
    pub async fn react_loop(&self, user_input: &str, history: SessionHistory) -> LoopOutcome {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut state = ReactState::new(
            user_input,
            session_id,
            self.config.max_iterations,
            history,
        );
        let strategy = detect_intent(user_input, &state.history);
        state = reduce(
            state,
            StepOutput::Preprocessed { strategy },
        );
        tracing::info!(
            session_id = %state.session_id,
            strategy = ?state.strategy,
            "starting react loop"
        );
        self.drive(state, false).await
    }

    /// Re-enter a session parked at the approval gate.
    pub async fn resume(
        &self,
        session_id: &str,
        approval_granted: bool,
    ) -> crate::error::Result<LoopOutcome> {
        let state = self
            .sessions
            .lock()
            .await
            .remove(session_id)
            .ok_or_else(|| OpsError::Session(SessionError::NotFound(session_id.to_string())))?;

        let state = reduce(
            state,
            StepOutput::ApprovalResolved {
                granted: approval_granted,
            },
        );

        if !approval_granted {
            let detail = cancellation_message(&state);
            tracing::info!(session_id, "instruction rejected by user");
            return Ok(LoopOutcome::Final(FinalReport::cancelled(state, detail)));
        }

        tracing::info!(session_id, "instruction approved, resuming");
        Ok(self.drive(state, true).await)
    }

    /// Cancel a session parked at the approval gate. Treated as denial.
    pub async fn cancel(&self, session_id: &str) -> crate::error::Result<FinalReport> {
        match self.resume(session_id, false).await? {
            LoopOutcome::Final(report) => Ok(report),
            LoopOutcome::AwaitingApproval { .. } => {
                unreachable!("denied resume never suspends again")
            }
        }
    }

    /// The state machine. `resume_at_execute` skips reason/safety for the
    /// first pass when re-entering after approval.
    async fn drive(&self, mut state: ReactState, mut resume_at_execute: bool) -> LoopOutcome {
        loop {
            if state.iteration > state.max_iterations {
                // Belt over the force-summarize path; an extra pass beyond
                // the summary means something refused to terminate.
                state = reduce(
                    state,
                    StepOutput::Checked(CheckDisposition::Fatal {
                        message: "iteration budget exceeded".to_string(),
                    }),
                );
                return LoopOutcome::Final(FinalReport::from_state(state));
            }

            if !resume_at_execute {
                // ── reason ──────────────────────────────────────────────
                let reasoned = match self.reason(&state).await {
                    Ok(reasoned) => reasoned,
                    Err(message) => {
                        state = reduce(
                            state,
                            StepOutput::Checked(CheckDisposition::Fatal { message }),
                        );
                        return LoopOutcome::Final(FinalReport::from_state(state));
                    }
                };
                let internal = reasoned.internal;
                state = reduce(
                    state,
                    StepOutput::Reasoned {
                        instruction: reasoned.instruction,
                        is_final: reasoned.is_final,
                    },
                );

                // ── safety ──────────────────────────────────────────────
                if internal {
                    state = reduce(
                        state,
                        StepOutput::SafetyChecked {
                            risk_level: RiskLevel::Safe,
                            needs_approval: false,
                        },
                    );
                } else {
                    let instruction = state
                        .current_instruction
                        .clone()
                        .unwrap_or_else(|| Instruction::chat_respond(""));
                    let decision = self.policy.check_instruction(&instruction);
                    tracing::debug!(
                        worker = %instruction.worker,
                        action = %instruction.action,
                        risk = %decision.risk_level,
                        allowed = decision.allowed,
                        "policy decision"
                    );

                    if !decision.allowed {
                        // Never execute a rejected instruction, never drop
                        // the turn: explain the rejection instead.
                        tracing::warn!(reason = %decision.reason, "instruction rejected by policy");
                        state = reduce(
                            state,
                            StepOutput::Reasoned {
                                instruction: Instruction::chat_respond(format!(
                                    "I can't run that action. {}",
                                    decision.reason
                                )),
                                is_final: true,
                            },
                        );
                        state = reduce(
                            state,
                            StepOutput::SafetyChecked {
                                risk_level: RiskLevel::Safe,
                                needs_approval: false,
                            },
                        );
                    } else if decision.risk_level > self.config.max_risk {
                        state = reduce(
                            state,
                            StepOutput::Checked(CheckDisposition::Fatal {
                                message: format!(
                                    "risk {} exceeds configured ceiling {}",
                                    decision.risk_level, self.config.max_risk
                                ),
                            }),
                        );
                        return LoopOutcome::Final(FinalReport::from_state(state));
                    } else {
                        state = reduce(
                            state,
                            StepOutput::SafetyChecked {
                                risk_level: decision.risk_level,
                                needs_approval: decision.risk_level == RiskLevel::High,
                            },
                        );
                    }
                }

                // ── approve (suspension point) ──────────────────────────
                if state.needs_approval && !state.approval_granted {
                    let session_id = state.session_id.clone();
                    let instruction = state
                        .current_instruction
                        .clone()
                        .unwrap_or_else(|| Instruction::chat_respond(""));
                    let risk_level = state.risk_level.unwrap_or(RiskLevel::High);
                    tracing::info!(session_id = %session_id, "suspending for approval");
                    self.sessions.lock().await.insert(session_id.clone(), state);
                    return LoopOutcome::AwaitingApproval {
                        session_id,
                        instruction,
                        risk_level,
                    };
                }
            }
            resume_at_execute = false;

            // ── execute ─────────────────────────────────────────────────
            let result = match self.execute(&state).await {
                Ok(result) => result,
                Err(message) => {
                    state = reduce(
                        state,
                        StepOutput::Checked(CheckDisposition::Fatal { message }),
                    );
                    return LoopOutcome::Final(FinalReport::from_state(state));
                }
            };
            state = reduce(state, StepOutput::Executed { result });

            // ── check ───────────────────────────────────────────────────
            let result = state
                .worker_result
                .clone()
                .unwrap_or_else(|| WorkerResult::fail("missing worker result"));
            let disposition = evaluate_check(&state, &result, self.config.error_recovery_limit);
            tracing::debug!(iteration = state.iteration, ?disposition, "check step");
            state = reduce(state, StepOutput::Checked(disposition));

            if state.is_terminal() {
                return LoopOutcome::Final(FinalReport::from_state(state));
            }
        }
    }

    /// The reason step: forced summarization, first-pass fast paths, or LLM
    /// reasoning with the bounded repair loop.
    async fn reason(&self, state: &ReactState) -> Result<Reasoned, String> {
        if state.force_summarize {
            return Ok(self.summarize(state).await);
        }

        if state.iteration == 0 {
            if let Some(reasoned) = fast_path_instruction(state) {
                tracing::info!(strategy = ?state.strategy, "fast-path instruction synthesized");
                return Ok(reasoned);
            }
        }

        let system = prompts::reasoning_system_prompt(&self.registry.capabilities_summary());
        let user = prompts::build_reason_prompt(state);

        let attempt = tokio::time::timeout(
            self.config.llm_timeout,
            generate_with_repair(self.llm.as_ref(), &system, &user, prompts::parse_reasoning),
        )
        .await;

        match attempt {
            Err(_) => Err(format!(
                "llm call timed out after {}s",
                self.config.llm_timeout.as_secs()
            )),
            Ok(Err(error)) => Err(format!("llm request failed: {error}")),
            Ok(Ok(Some((instruction, is_final)))) => Ok(Reasoned {
                instruction,
                is_final,
                internal: false,
            }),
            Ok(Ok(None)) => Ok(Reasoned {
                instruction: Instruction::chat_respond(
                    "I could not turn the model output into a valid instruction, \
                     so no action was taken. Please rephrase the request.",
                ),
                is_final: true,
                internal: true,
            }),
        }
    }

    /// Forced summarization pass. Always produces a terminal chat.respond;
    /// an LLM failure here degrades to a locally-built summary rather than
    /// an error.
    async fn summarize(&self, state: &ReactState) -> Reasoned {
        let prompt = prompts::build_summarize_prompt(state);
        let message = match tokio::time::timeout(
            self.config.llm_timeout,
            self.llm.generate(prompts::SUMMARIZE_SYSTEM_PROMPT, &prompt),
        )
        .await
        {
            Ok(Ok(text)) => prompts::coerce_summary_message(&text),
            Ok(Err(error)) => {
                tracing::warn!(%error, "summarization call failed, using local summary");
                state.history.summary_bullets()
            }
            Err(_) => {
                tracing::warn!("summarization call timed out, using local summary");
                state.history.summary_bullets()
            }
        };

        Reasoned {
            instruction: Instruction::chat_respond(message),
            is_final: true,
            internal: true,
        }
    }

    /// The execute step: dispatch to the named worker with dry-run
    /// injection and a timeout. Unknown workers are fatal, not retried.
    async fn execute(&self, state: &ReactState) -> Result<WorkerResult, String> {
        let Some(instruction) = &state.current_instruction else {
            return Err("no instruction to execute".to_string());
        };

        let Some(worker) = self.registry.get(&instruction.worker) else {
            return Err(format!("unknown worker: {}", instruction.worker));
        };

        let mut args = instruction.args.clone();
        if self.config.dry_run || instruction.dry_run {
            args.insert("dry_run".to_string(), ArgValue::Bool(true));
        }

        match tokio::time::timeout(
            self.config.worker_timeout,
            worker.execute(&instruction.action, &args),
        )
        .await
        {
            Ok(Ok(result)) => Ok(result),
            // System-level worker error: surfaces as a failure without an
            // exit code, which the check step classifies as fatal.
            Ok(Err(error)) => Ok(WorkerResult::fail(error.to_string())),
            Err(_) => Ok(WorkerResult::fail(format!(
                "worker '{}' timed out after {}s",
                instruction.worker,
                self.config.worker_timeout.as_secs()
            ))),
        }
    }
}

/// First-pass instruction synthesis for detected intents. Action-shaped fast
/// paths (deploy, fetch) still go through the policy gate; only direct
/// answers are internal.
fn fast_path_instruction(state: &ReactState) -> Option<Reasoned> {
    match &state.strategy {
        ReasoningStrategy::Direct => None,
        ReasoningStrategy::SelfIdentity => Some(Reasoned {
            instruction: Instruction::chat_respond(
                "I'm opspilot, an operations assistant. I turn natural-language \
                 requests into shell, Docker, Kubernetes, and git actions, with \
                 a safety policy gating everything I run.",
            ),
            is_final: true,
            internal: true,
        }),
        ReasoningStrategy::Deploy { repo_url } => Some(Reasoned {
            instruction: Instruction::new("shell", "execute_command")
                .with_arg("command", format!("git clone {repo_url}")),
            is_final: false,
            internal: false,
        }),
        ReasoningStrategy::ExplainObject { reference }
        | ReasoningStrategy::FetchThenExplain { reference } => Some(Reasoned {
            instruction: Instruction::new("shell", "execute_command")
                .with_arg("command", synthesize_fetch_command(state, reference)),
            is_final: false,
            internal: false,
        }),
    }
}

/// Pick the inspect command for a fetch-then-explain pass from context
/// hints; docker is the default for an ops assistant.
fn synthesize_fetch_command(state: &ReactState, reference: &str) -> String {
    let mut context = state.user_input.to_lowercase();
    if let Some(last) = state.history.last() {
        if let Some(command) = last.instruction.command_arg() {
            context.push(' ');
            context.push_str(&command.to_lowercase());
        }
    }

    if ["pod", "deployment", "namespace", "kubectl", "k8s"]
        .iter()
        .any(|hint| context.contains(hint))
    {
        format!("kubectl describe {reference}")
    } else if ["service", "unit", "systemd", "daemon"]
        .iter()
        .any(|hint| context.contains(hint))
    {
        format!("systemctl status {reference}")
    } else {
        format!("docker inspect {reference}")
    }
}

/// The check step's decision tree, evaluated in strict priority order:
/// permission short-circuit, bounded recovery, fatal, then the completion
/// tie-break where the worker's own flag beats the LLM hint.
fn evaluate_check(
    state: &ReactState,
    result: &WorkerResult,
    recovery_limit: u32,
) -> CheckDisposition {
    if !result.success {
        if result.exit_code().is_some() {
            if let Some((message, suggested_commands)) = permission_denied_suggestion(state, result)
            {
                return CheckDisposition::PermissionShortCircuit {
                    message,
                    suggested_commands,
                };
            }
            if state.error_recovery_count < recovery_limit
                && state.iteration + 1 < state.max_iterations
            {
                return CheckDisposition::Retry;
            }
            return CheckDisposition::Fatal {
                message: format!("recovery budget exhausted: {}", result.message),
            };
        }
        return CheckDisposition::Fatal {
            message: result.message.clone(),
        };
    }

    // Worker completion is authoritative; the LLM hint only accelerates when
    // the worker is silent. Do not collapse these into one flag.
    if result.task_completed {
        return CheckDisposition::Complete {
            message: result.message.clone(),
        };
    }
    if state.llm_is_final {
        return CheckDisposition::Complete {
            message: result.message.clone(),
        };
    }

    CheckDisposition::Continue
}

/// Match the fixed permission-denied signatures against everything the
/// failed execution said, and build the sudo suggestion.
fn permission_denied_suggestion(
    state: &ReactState,
    result: &WorkerResult,
) -> Option<(String, Vec<String>)> {
    let mut text = result.message.to_lowercase();
    if let Some(data) = &result.data {
        for key in ["stdout", "stderr"] {
            if let Some(chunk) = data.get(key).and_then(serde_json::Value::as_str) {
                text.push(' ');
                text.push_str(&chunk.to_lowercase());
            }
        }
    }

    if !PERMISSION_DENIED_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
    {
        return None;
    }

    let suggested_commands: Vec<String> = state
        .current_instruction
        .as_ref()
        .and_then(Instruction::command_arg)
        .map(sudo_prefixed)
        .into_iter()
        .collect();

    let message = match suggested_commands.first() {
        Some(command) => format!(
            "The command failed due to insufficient permissions. \
             Rerun it with elevated privileges: `{command}`"
        ),
        None => "The action failed due to insufficient permissions; \
                 elevated privileges are required."
            .to_string(),
    };

    Some((message, suggested_commands))
}

/// Prefix a command with `sudo`, idempotently.
fn sudo_prefixed(command: &str) -> String {
    let trimmed = command.trim_start();
    if trimmed == "sudo" || trimmed.starts_with("sudo ") {
        trimmed.to_string()
    } else {
        format!("sudo {trimmed}")
    }
}

fn cancellation_message(state: &ReactState) -> String {
    match &state.current_instruction {
        Some(instruction) => match instruction.command_arg() {
            Some(command) => format!("Cancelled by user: `{command}` was not approved."),
            None => format!(
                "Cancelled by user: {}.{} was not approved.",
                instruction.worker, instruction.action
            ),
        },
        None => "Cancelled by user.".to_string(),
    }
}
