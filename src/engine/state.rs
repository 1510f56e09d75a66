use super::history::SessionHistory;
use super::intent::ReasoningStrategy;
use crate::safety::RiskLevel;
use crate::workers::{Instruction, WorkerResult};
use serde::{Deserialize, Serialize};

/// Working state of one ReAct loop run. Owned exclusively by the engine for
/// the duration of a request; every transition goes through [`reduce`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactState {
    pub user_input: String,
    pub session_id: String,
    /// Completed reasoning passes. Incremented by the check step.
    pub iteration: u32,
    pub max_iterations: u32,
    pub current_instruction: Option<Instruction>,
    pub risk_level: Option<RiskLevel>,
    pub worker_result: Option<WorkerResult>,
    pub needs_approval: bool,
    pub approval_granted: bool,
    pub task_completed: bool,
    pub is_error: bool,
    pub error_recovery_count: u32,
    pub force_summarize: bool,
    pub final_message: Option<String>,
    pub error_message: Option<String>,
    pub suggested_commands: Vec<String>,
    /// The LLM's advisory completion hint from the latest reasoning pass.
    pub llm_is_final: bool,
    pub strategy: ReasoningStrategy,
    pub history: SessionHistory,
}

impl ReactState {
    pub fn new(
        user_input: impl Into<String>,
        session_id: impl Into<String>,
        max_iterations: u32,
        history: SessionHistory,
    ) -> Self {
        Self {
            user_input: user_input.into(),
            session_id: session_id.into(),
            iteration: 0,
            max_iterations,
            current_instruction: None,
            risk_level: None,
            worker_result: None,
            needs_approval: false,
            approval_granted: false,
            task_completed: false,
            is_error: false,
            error_recovery_count: 0,
            force_summarize: false,
            final_message: None,
            error_message: None,
            suggested_commands: Vec::new(),
            llm_is_final: false,
            strategy: ReasoningStrategy::Direct,
            history,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.task_completed || self.is_error
    }
}

/// Typed partial update produced by one loop step.
#[derive(Debug, Clone)]
pub enum StepOutput {
    Preprocessed {
        strategy: ReasoningStrategy,
    },
    Reasoned {
        instruction: Instruction,
        is_final: bool,
    },
    SafetyChecked {
        risk_level: RiskLevel,
        needs_approval: bool,
    },
    ApprovalResolved {
        granted: bool,
    },
    Executed {
        result: WorkerResult,
    },
    Checked(CheckDisposition),
}

/// Outcome of the check step's decision tree, in strict priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckDisposition {
    /// Permission-denied signature: terminate successfully with a sudo
    /// suggestion instead of burning retry budget on an unfixable failure.
    PermissionShortCircuit {
        message: String,
        suggested_commands: Vec<String>,
    },
    /// Recoverable failure with budget remaining: loop back to reason.
    Retry,
    Fatal {
        message: String,
    },
    Complete {
        message: String,
    },
    /// Neither side signalled completion: next reasoning pass.
    Continue,
}

/// Pure reducer: fold one step's output into the state. The only place loop
/// state is mutated, so each transition's contract is checkable in isolation.
pub fn reduce(mut state: ReactState, output: StepOutput) -> ReactState {
    match output {
        StepOutput::Preprocessed { strategy } => {
            state.strategy = strategy;
        }
        StepOutput::Reasoned {
            instruction,
            is_final,
        } => {
            state.current_instruction = Some(instruction);
            state.llm_is_final = is_final;
            state.worker_result = None;
            state.needs_approval = false;
            // Approval never carries over: each instruction is approved on
            // its own.
            state.approval_granted = false;
        }
        StepOutput::SafetyChecked {
            risk_level,
            needs_approval,
        } => {
            state.risk_level = Some(risk_level);
            state.needs_approval = needs_approval;
        }
        StepOutput::ApprovalResolved { granted } => {
            state.approval_granted = granted;
            if granted {
                state.needs_approval = false;
            }
        }
        StepOutput::Executed { result } => {
            if let Some(instruction) = &state.current_instruction {
                state.history.push(instruction.clone(), result.clone());
            }
            state.worker_result = Some(result);
        }
        StepOutput::Checked(disposition) => match disposition {
            CheckDisposition::PermissionShortCircuit {
                message,
                suggested_commands,
            } => {
                state.task_completed = true;
                state.final_message = Some(message);
                state.suggested_commands = suggested_commands;
            }
            CheckDisposition::Retry => {
                state.error_recovery_count += 1;
                state.iteration += 1;
                state.task_completed = false;
            }
            CheckDisposition::Fatal { message } => {
                state.is_error = true;
                state.error_message = Some(message);
            }
            CheckDisposition::Complete { message } => {
                state.task_completed = true;
                state.final_message = Some(message);
            }
            CheckDisposition::Continue => {
                state.iteration += 1;
                if state.iteration >= state.max_iterations {
                    state.force_summarize = true;
                }
            }
        },
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(max_iterations: u32) -> ReactState {
        ReactState::new("restart nginx", "session-1", max_iterations, SessionHistory::new())
    }

    #[test]
    fn new_state_starts_at_iteration_zero() {
        let state = state(10);
        assert_eq!(state.iteration, 0);
        assert!(!state.is_terminal());
    }

    #[test]
    fn reasoned_clears_previous_result() {
        let mut s = state(10);
        s.worker_result = Some(WorkerResult::ok("old"));
        let s = reduce(
            s,
            StepOutput::Reasoned {
                instruction: Instruction::chat_respond("hi"),
                is_final: true,
            },
        );
        assert!(s.worker_result.is_none());
        assert!(s.llm_is_final);
        assert!(s.current_instruction.is_some());
    }

    #[test]
    fn executed_appends_to_history() {
        let s = reduce(
            state(10),
            StepOutput::Reasoned {
                instruction: Instruction::new("shell", "execute_command")
                    .with_arg("command", "ls"),
                is_final: false,
            },
        );
        let s = reduce(
            s,
            StepOutput::Executed {
                result: WorkerResult::ok("done"),
            },
        );
        assert_eq!(s.history.len(), 1);
        assert!(s.worker_result.is_some());
    }

    #[test]
    fn retry_increments_both_counters() {
        let s = reduce(state(10), StepOutput::Checked(CheckDisposition::Retry));
        assert_eq!(s.error_recovery_count, 1);
        assert_eq!(s.iteration, 1);
        assert!(!s.task_completed);
    }

    #[test]
    fn continue_sets_force_summarize_at_budget() {
        let mut s = state(2);
        s = reduce(s, StepOutput::Checked(CheckDisposition::Continue));
        assert_eq!(s.iteration, 1);
        assert!(!s.force_summarize);

        s = reduce(s, StepOutput::Checked(CheckDisposition::Continue));
        assert_eq!(s.iteration, 2);
        assert!(s.force_summarize, "last budgeted pass arms summarization");
    }

    #[test]
    fn fatal_sets_error_state() {
        let s = reduce(
            state(10),
            StepOutput::Checked(CheckDisposition::Fatal {
                message: "unknown worker: ftp".into(),
            }),
        );
        assert!(s.is_error);
        assert!(s.is_terminal());
        assert_eq!(s.error_message.as_deref(), Some("unknown worker: ftp"));
    }

    #[test]
    fn permission_short_circuit_completes_with_suggestions() {
        let s = reduce(
            state(10),
            StepOutput::Checked(CheckDisposition::PermissionShortCircuit {
                message: "needs sudo".into(),
                suggested_commands: vec!["sudo ls /data".into()],
            }),
        );
        assert!(s.task_completed);
        assert_eq!(s.suggested_commands, vec!["sudo ls /data"]);
        assert_eq!(s.error_recovery_count, 0);
    }

    #[test]
    fn approval_resolution_clears_pending_flag() {
        let mut s = state(10);
        s.needs_approval = true;
        let s = reduce(s, StepOutput::ApprovalResolved { granted: true });
        assert!(s.approval_granted);
        assert!(!s.needs_approval);
    }
}
