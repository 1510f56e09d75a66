use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `opspilot`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum OpsError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── LLM client ──────────────────────────────────────────────────────
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    // ── Safety / Policy ─────────────────────────────────────────────────
    #[error("policy: {0}")]
    Policy(#[from] PolicyError),

    // ── Workers ─────────────────────────────────────────────────────────
    #[error("worker: {0}")]
    Worker(#[from] WorkerError),

    // ── Sessions / loop state ───────────────────────────────────────────
    #[error("session: {0}")]
    Session(#[from] SessionError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── LLM client errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} authentication failed")]
    Auth { provider: String },

    #[error("response was not parseable JSON after repair attempt")]
    UnparseableResponse,

    #[error("llm call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

// ─── Safety / policy errors ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("instruction denied: {0}")]
    Denied(String),

    #[error("risk {risk} exceeds configured ceiling {ceiling}")]
    RiskCeilingExceeded { risk: String, ceiling: String },
}

// ─── Worker errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker {name} not found")]
    NotFound { name: String },

    #[error("worker {name} does not support action {action}")]
    UnsupportedAction { name: String, action: String },

    #[error("worker {name} execution failed: {message}")]
    Execution { name: String, message: String },

    #[error("worker {name} timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

// ─── Session errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {0} is not awaiting approval")]
    NotSuspended(String),

    #[error("cancelled by user")]
    Cancelled,
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, OpsError>;
