use crate::workers::{Instruction, WorkerResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One executed (instruction, result) pair. Append-only; the reason step
/// consumes entries in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub instruction: Instruction,
    pub result: WorkerResult,
    pub recorded_at: String,
}

/// Accumulated history for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub entries: Vec<HistoryEntry>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction, result: WorkerResult) {
        self.entries.push(HistoryEntry {
            instruction,
            result,
            recorded_at: Utc::now().to_rfc3339(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Render the history for embedding into a reasoning prompt.
    pub fn render_for_prompt(&self) -> String {
        let mut out = String::new();
        for (index, entry) in self.entries.iter().enumerate() {
            let status = if entry.result.success { "ok" } else { "failed" };
            let _ = writeln!(
                out,
                "{}. {}.{} -> {}: {}",
                index + 1,
                entry.instruction.worker,
                entry.instruction.action,
                status,
                truncate(&entry.result.message, 300),
            );
        }
        out
    }

    /// Best-effort bullet summary, used when even the forced summarization
    /// LLM pass fails. Reaching the iteration budget must never surface as a
    /// bare error.
    pub fn summary_bullets(&self) -> String {
        if self.entries.is_empty() {
            return "No actions were executed.".to_string();
        }
        let mut out = String::from("Here is what was attempted:\n");
        for entry in &self.entries {
            let status = if entry.result.success {
                "succeeded"
            } else {
                "failed"
            };
            let _ = writeln!(
                out,
                "- {}.{} {} — {}",
                entry.instruction.worker,
                entry.instruction.action,
                status,
                truncate(&entry.result.message, 120),
            );
        }
        out
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
