/// Commands whose second non-flag token is a semantic subcommand rather than
/// an ordinary argument (`docker ps`, `git status`, `apt install`, ...).
const COMPOUND_COMMANDS: &[&str] = &[
    "docker",
    "docker-compose",
    "git",
    "systemctl",
    "apt",
    "yum",
    "npm",
    "pip",
];

/// A shell command split into the pieces the whitelist and analyzer match on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCommand {
    pub base: String,
    pub subcommand: Option<String>,
    pub args: Vec<String>,
}

/// Strip any path prefix from a binary name (`/usr/bin/ls` -> `ls`).
fn strip_path_prefix(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

/// Tokenize a command string into (base, subcommand, args).
///
/// Quote-aware splitting via `shlex`; a tokenization failure (unbalanced
/// quote) falls back to treating the first whitespace word as the base with
/// no subcommand and no args. For compound commands the first non-flag token
/// after the base becomes the subcommand and everything after it the args;
/// `docker compose` is normalized to base `docker-compose` so compose rules
/// match regardless of invocation style.
pub fn parse_command(command: &str) -> ParsedCommand {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return ParsedCommand::default();
    }

    let Some(tokens) = shlex::split(trimmed) else {
        let base = trimmed
            .split_whitespace()
            .next()
            .map(strip_path_prefix)
            .unwrap_or_default()
            .to_string();
        return ParsedCommand {
            base,
            subcommand: None,
            args: Vec::new(),
        };
    };

    let Some(first) = tokens.first() else {
        return ParsedCommand::default();
    };

    let mut base = strip_path_prefix(first).to_string();
    let mut rest: &[String] = &tokens[1..];

    if base == "docker" && rest.first().is_some_and(|t| t == "compose") {
        base = "docker-compose".to_string();
        rest = &rest[1..];
    }

    if !COMPOUND_COMMANDS.contains(&base.as_str()) {
        return ParsedCommand {
            base,
            subcommand: None,
            args: rest.to_vec(),
        };
    }

    match rest.iter().position(|token| !token.starts_with('-')) {
        Some(idx) => ParsedCommand {
            base,
            subcommand: Some(rest[idx].clone()),
            args: rest[idx + 1..].to_vec(),
        },
        None => ParsedCommand {
            base,
            subcommand: None,
            args: rest.to_vec(),
        },
    }
}
