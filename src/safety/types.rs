use serde::{Deserialize, Serialize};

/// Authoritative risk classification of an instruction.
///
/// Ordering matters: `Safe < Medium < High`. The policy engine computes this;
/// any risk level embedded in an LLM-produced instruction is advisory only and
/// is never trusted for gating decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal four-level severity used while combining analyzer layers.
///
/// `Blocked` is terminal: it cannot be downgraded by any later layer and maps
/// to `allowed=false, risk=High` at the module boundary. Variants are ordered
/// by severity; the strictest verdict across layers wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Safe,
    Medium,
    High,
    Blocked,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Safe => "safe",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Blocked => "blocked",
        }
    }

    /// Collapse to the public three-level scale. `Blocked` reports as `High`;
    /// the accompanying `allowed=false` carries the terminal part.
    pub fn to_risk_level(self) -> RiskLevel {
        match self {
            Severity::Safe => RiskLevel::Safe,
            Severity::Medium => RiskLevel::Medium,
            Severity::High | Severity::Blocked => RiskLevel::High,
        }
    }
}

impl From<RiskLevel> for Severity {
    fn from(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Safe => Severity::Safe,
            RiskLevel::Medium => Severity::Medium,
            RiskLevel::High => Severity::High,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One whitelist entry. Rules with a subcommand are consulted before the
/// generic (subcommand = None) rule for the same base command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRule {
    pub base: &'static str,
    pub subcommand: Option<&'static str>,
    pub risk: RiskLevel,
    /// Flags that turn an otherwise-allowed command into a denial. Matched
    /// exactly, as a `flag=value` prefix, or per-character for combined short
    /// flags like `-rf`.
    pub blocked_flags: &'static [&'static str],
    pub description: &'static str,
}

/// Outcome of one whitelist or analyzer check.
///
/// `allowed == None` is the deferral signal: the whitelist found no rule and
/// hands the command to the risk analyzer. Every other outcome is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCheckResult {
    pub allowed: Option<bool>,
    pub risk_level: Option<RiskLevel>,
    pub reason: String,
    pub matched_rule: Option<&'static CommandRule>,
}

impl CommandCheckResult {
    pub fn allow(risk: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            allowed: Some(true),
            risk_level: Some(risk),
            reason: reason.into(),
            matched_rule: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: Some(false),
            risk_level: Some(RiskLevel::High),
            reason: reason.into(),
            matched_rule: None,
        }
    }

    pub fn deferred(reason: impl Into<String>) -> Self {
        Self {
            allowed: None,
            risk_level: None,
            reason: reason.into(),
            matched_rule: None,
        }
    }

    pub fn with_rule(mut self, rule: &'static CommandRule) -> Self {
        self.matched_rule = Some(rule);
        self
    }

    pub fn is_deferred(&self) -> bool {
        self.allowed.is_none()
    }
}

/// The externally-observable verdict of `check_command_safety`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub allowed: bool,
    pub risk_level: RiskLevel,
    pub reason: String,
}
