use super::history::SessionHistory;
use serde::{Deserialize, Serialize};

/// Which reasoning path the next pass should take. Intent detection never
/// blocks and never denies; it only narrows the strategy so cheap requests
/// skip the LLM round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReasoningStrategy {
    /// Full LLM reasoning.
    #[default]
    Direct,
    /// "who/what are you" — answered directly, no LLM call.
    SelfIdentity,
    /// "explain X" where X resolved from the conversation: fetch its details
    /// first, explain on the next pass.
    ExplainObject { reference: String },
    /// "explain X" with no context yet: same fetch-first shape, lower
    /// confidence reference.
    FetchThenExplain { reference: String },
    /// Deploy request with an extractable repository URL.
    Deploy { repo_url: String },
}

const SELF_IDENTITY_PHRASES: &[&str] = &[
    "who are you",
    "what are you",
    "introduce yourself",
    "your name",
];

const EXPLAIN_VERBS: &[&str] = &["explain", "describe", "what is", "tell me about"];

const REFERENCE_PRONOUNS: &[&str] = &["this", "that", "it"];

/// Lightweight keyword/shape matching over the user input and prior history.
pub fn detect_intent(user_input: &str, history: &SessionHistory) -> ReasoningStrategy {
    let lower = user_input.to_lowercase();

    if SELF_IDENTITY_PHRASES.iter().any(|p| lower.contains(p)) {
        return ReasoningStrategy::SelfIdentity;
    }

    if lower.contains("deploy") || lower.contains("clone") {
        if let Some(url) = extract_repo_url(user_input) {
            return ReasoningStrategy::Deploy { repo_url: url };
        }
    }

    if EXPLAIN_VERBS.iter().any(|v| lower.contains(v)) {
        let words: Vec<&str> = lower.split_whitespace().collect();
        if let Some(last) = words.last() {
            let target = last.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_');
            if REFERENCE_PRONOUNS.contains(&target) {
                // Pronoun reference: only actionable when history resolves it.
                if let Some(reference) = resolve_reference(history) {
                    return ReasoningStrategy::ExplainObject { reference };
                }
                return ReasoningStrategy::Direct;
            }
            if !target.is_empty() && words.len() >= 2 {
                return ReasoningStrategy::FetchThenExplain {
                    reference: target.to_string(),
                };
            }
        }
    }

    ReasoningStrategy::Direct
}

/// First URL-shaped token in the input, trailing punctuation trimmed.
fn extract_repo_url(input: &str) -> Option<String> {
    input
        .split_whitespace()
        .find(|token| {
            token.starts_with("http://")
                || token.starts_with("https://")
                || token.starts_with("git@")
        })
        .map(|token| token.trim_end_matches(['.', ',', ';', '!', '?']).to_string())
}

/// Resolve a pronoun against the last executed command: its final
/// non-flag argument is the most recently mentioned object.
fn resolve_reference(history: &SessionHistory) -> Option<String> {
    let last = history.last()?;
    let command = last.instruction.command_arg()?;
    command
        .split_whitespace()
        .rev()
        .find(|token| !token.starts_with('-'))
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{Instruction, WorkerResult};

    fn history_with_command(command: &str) -> SessionHistory {
        let mut history = SessionHistory::new();
        history.push(
            Instruction::new("shell", "execute_command").with_arg("command", command),
            WorkerResult::ok("output"),
        );
        history
    }

    #[test]
    fn detects_self_identity() {
        assert_eq!(
            detect_intent("Who are you exactly?", &SessionHistory::new()),
            ReasoningStrategy::SelfIdentity
        );
    }

    #[test]
    fn detects_deploy_with_url() {
        let strategy = detect_intent(
            "deploy https://github.com/acme/api.git please",
            &SessionHistory::new(),
        );
        assert_eq!(
            strategy,
            ReasoningStrategy::Deploy {
                repo_url: "https://github.com/acme/api.git".to_string()
            }
        );
    }

    #[test]
    fn deploy_without_url_falls_back_to_direct() {
        assert_eq!(
            detect_intent("deploy the api service", &SessionHistory::new()),
            ReasoningStrategy::Direct
        );
    }

    #[test]
    fn explain_with_explicit_object_fetches_first() {
        let strategy = detect_intent("explain pod web-0", &SessionHistory::new());
        assert_eq!(
            strategy,
            ReasoningStrategy::FetchThenExplain {
                reference: "web-0".to_string()
            }
        );
    }

    #[test]
    fn explain_pronoun_resolves_from_history() {
        let history = history_with_command("docker inspect nginx-proxy");
        let strategy = detect_intent("explain this", &history);
        assert_eq!(
            strategy,
            ReasoningStrategy::ExplainObject {
                reference: "nginx-proxy".to_string()
            }
        );
    }

    #[test]
    fn explain_pronoun_without_history_is_direct() {
        assert_eq!(
            detect_intent("explain this", &SessionHistory::new()),
            ReasoningStrategy::Direct
        );
    }

    #[test]
    fn plain_request_is_direct() {
        assert_eq!(
            detect_intent("restart the nginx service", &SessionHistory::new()),
            ReasoningStrategy::Direct
        );
    }

    #[test]
    fn reference_resolution_skips_flags() {
        let history = history_with_command("kubectl describe pod web-0 -n prod");
        // Last non-flag token is "prod"; naive but deterministic.
        let strategy = detect_intent("explain it", &history);
        assert_eq!(
            strategy,
            ReasoningStrategy::ExplainObject {
                reference: "prod".to_string()
            }
        );
    }

    #[test]
    fn git_ssh_urls_are_extracted() {
        let strategy = detect_intent(
            "clone git@github.com:acme/api.git",
            &SessionHistory::new(),
        );
        assert_eq!(
            strategy,
            ReasoningStrategy::Deploy {
                repo_url: "git@github.com:acme/api.git".to_string()
            }
        );
    }
}
