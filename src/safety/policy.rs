use super::analyzer::{RiskAnalyzer, RiskTables};
use super::types::{RiskLevel, SafetyVerdict};
use super::whitelist;
use crate::workers::Instruction;
use std::sync::atomic::{AtomicU64, Ordering};

/// Risk floor for remote execution: a command that would be safe locally is
/// still at least medium when run on another host.
const REMOTE_RISK_FLOOR: RiskLevel = RiskLevel::Medium;

/// Substrings that escalate a remote-execution instruction to high.
const REMOTE_HIGH_RISK_PATTERNS: &[&str] = &[
    "rm -rf",
    "kill",
    "mkfs",
    "dd if=",
    "> /dev/",
    ":(){",
    "chmod -R 777",
    "chown -R",
];

/// Danger patterns for non-shell, non-remote workers, scanned over the action
/// name plus all flattened string args. High patterns are checked before
/// medium; first match wins.
const GENERIC_HIGH_PATTERNS: &[&str] = &[
    "delete",
    "remove",
    "replace_file",
    "drop",
    "purge",
    "destroy",
    "rm -rf",
    "format",
    "wipe",
];

const GENERIC_MEDIUM_PATTERNS: &[&str] = &[
    "write",
    "append",
    "create",
    "update",
    "modify",
    "upload",
    "install",
    "restart",
    "deploy",
];

/// The unified policy decision for one instruction. This is the only risk
/// value trusted downstream; whatever the LLM wrote into the instruction is
/// discarded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub risk_level: RiskLevel,
    pub allowed: bool,
    pub reason: String,
}

/// Unifies the static whitelist and the risk analyzer into one decision per
/// instruction. Pure over its inputs and safe to share across sessions; the
/// analyzer-invocation counter is the only (atomic) state and exists so the
/// whitelist-first composition stays observable.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    analyzer: RiskAnalyzer,
    analyzer_invocations: AtomicU64,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: RiskTables) -> Self {
        Self {
            analyzer: RiskAnalyzer::with_tables(tables),
            analyzer_invocations: AtomicU64::new(0),
        }
    }

    /// How many times the fallback analyzer has run. A whitelisted command
    /// never increments this.
    pub fn analyzer_invocations(&self) -> u64 {
        self.analyzer_invocations.load(Ordering::Relaxed)
    }

    /// Classify a raw shell command: whitelist first, analyzer only on
    /// deferral. A final whitelist verdict (allow or deny) never reaches the
    /// analyzer, keeping the common case cheap and deterministic.
    pub fn check_command_safety(&self, command: &str) -> SafetyVerdict {
        let checked = whitelist::check(command);
        let result = if checked.is_deferred() {
            self.analyzer_invocations.fetch_add(1, Ordering::Relaxed);
            let (result, trace) = self.analyzer.analyze(command);
            tracing::debug!(
                command,
                trace = %serde_json::to_string(&trace).unwrap_or_default(),
                "whitelist deferred to analyzer"
            );
            result
        } else {
            checked
        };

        SafetyVerdict {
            allowed: result.allowed.unwrap_or(false),
            risk_level: result.risk_level.unwrap_or(RiskLevel::High),
            reason: result.reason,
        }
    }

    /// Compute the authoritative risk for an instruction. Exactly one of the
    /// three dispatch arms runs: shell command classification, remote
    /// execution floor, or the generic danger-pattern scan.
    pub fn check_instruction(&self, instruction: &Instruction) -> PolicyDecision {
        if let Some(advisory) = instruction.risk_level {
            tracing::debug!(
                worker = %instruction.worker,
                action = %instruction.action,
                advisory = %advisory,
                "discarding LLM-supplied risk level"
            );
        }

        match (instruction.worker.as_str(), instruction.action.as_str()) {
            ("shell", "execute_command") => self.check_shell(instruction),
            ("remote", "execute") => Self::check_remote(instruction),
            _ => Self::check_generic(instruction),
        }
    }

    fn check_shell(&self, instruction: &Instruction) -> PolicyDecision {
        let Some(command) = instruction.command_arg() else {
            return PolicyDecision {
                risk_level: RiskLevel::High,
                allowed: false,
                reason: "shell instruction missing 'command' argument".to_string(),
            };
        };

        let verdict = self.check_command_safety(command);
        PolicyDecision {
            risk_level: verdict.risk_level,
            allowed: verdict.allowed,
            reason: verdict.reason,
        }
    }

    fn check_remote(instruction: &Instruction) -> PolicyDecision {
        let blob = flatten_instruction(instruction);
        for pattern in REMOTE_HIGH_RISK_PATTERNS {
            if blob.contains(pattern) {
                return PolicyDecision {
                    risk_level: RiskLevel::High,
                    allowed: true,
                    reason: format!("remote execution with high-risk pattern '{pattern}'"),
                };
            }
        }
        PolicyDecision {
            risk_level: REMOTE_RISK_FLOOR,
            allowed: true,
            reason: "remote execution carries a medium risk floor".to_string(),
        }
    }

    fn check_generic(instruction: &Instruction) -> PolicyDecision {
        let blob = flatten_instruction(instruction);
        for pattern in GENERIC_HIGH_PATTERNS {
            if blob.contains(pattern) {
                return PolicyDecision {
                    risk_level: RiskLevel::High,
                    allowed: true,
                    reason: format!("action matches high-risk pattern '{pattern}'"),
                };
            }
        }
        for pattern in GENERIC_MEDIUM_PATTERNS {
            if blob.contains(pattern) {
                return PolicyDecision {
                    risk_level: RiskLevel::Medium,
                    allowed: true,
                    reason: format!("action matches medium-risk pattern '{pattern}'"),
                };
            }
        }
        PolicyDecision {
            risk_level: RiskLevel::Safe,
            allowed: true,
            reason: "no danger pattern matched".to_string(),
        }
    }
}

/// Action name plus every string-valued argument (nested lists and maps
/// included) as one lowercased scan target.
fn flatten_instruction(instruction: &Instruction) -> String {
    let mut blob = instruction.action.clone();
    for value in instruction.args.values() {
        value.flatten_into(&mut blob);
    }
    blob.to_lowercase()
}
