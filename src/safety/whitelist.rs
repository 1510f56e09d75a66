use super::parser::{ParsedCommand, parse_command};
use super::types::{CommandCheckResult, CommandRule, RiskLevel};

/// Commands that are never allowed, regardless of any rule that might match a
/// compound form. This check runs before rule lookup and cannot be overridden.
const ABSOLUTE_BLOCK: &[&str] = &[
    "dd", "fdisk", "parted", "mount", "umount", "sudo", "su", "passwd", "useradd", "userdel",
    "usermod", "groupadd", "groupdel", "groupmod", "visudo", "chpasswd", "shutdown", "reboot",
    "init", "poweroff", "halt", "iptables", "nft", "ufw", "firewall-cmd", "eval", "exec",
    "source", ".",
];

/// Commands permitted as pipe targets (`cmd | grep foo`). Anything else on the
/// right side of a pipe denies the whole command.
const PIPE_ALLOWLIST: &[&str] = &[
    "grep", "egrep", "fgrep", "rg", "awk", "sed", "sort", "uniq", "cut", "tr", "head", "tail",
    "wc", "jq", "yq", "less", "more", "cat", "tee", "xargs", "base64",
];

/// Dangerous shell metacharacters scanned as substrings of the raw command.
/// Pipe is exempt here; pipe composition is validated separately against the
/// allowlist. Order matters only for reason messages (`&&` before `&`).
const SHELL_METACHARACTERS: &[(&str, &str)] = &[
    ("$(", "command substitution"),
    ("`", "command substitution"),
    ("&&", "command chaining"),
    ("||", "command chaining"),
    (";", "command chaining"),
    (">", "output redirection"),
    ("<", "input redirection"),
    ("&", "backgrounding"),
    ("\n", "newline injection"),
    ("${", "variable expansion"),
    ("~", "home expansion"),
];

/// The subset still blocked when the base command is `echo`. Echo legitimately
/// generates env files (`echo KEY=$(...) > .env`), so redirection and
/// substitution are permitted for it; chaining and backgrounding are not.
const ECHO_BLOCKED_METACHARACTERS: &[(&str, &str)] = &[
    ("&&", "command chaining"),
    ("||", "command chaining"),
    (";", "command chaining"),
    ("&", "backgrounding"),
    ("\n", "newline injection"),
];

const fn rule(
    base: &'static str,
    subcommand: Option<&'static str>,
    risk: RiskLevel,
    blocked_flags: &'static [&'static str],
    description: &'static str,
) -> CommandRule {
    CommandRule {
        base,
        subcommand,
        risk,
        blocked_flags,
        description,
    }
}

const fn safe(base: &'static str, description: &'static str) -> CommandRule {
    rule(base, None, RiskLevel::Safe, &[], description)
}

const fn sub(
    base: &'static str,
    subcommand: &'static str,
    risk: RiskLevel,
    description: &'static str,
) -> CommandRule {
    rule(base, Some(subcommand), risk, &[], description)
}

/// The static rule table. Subcommand-specific rules are consulted before the
/// generic (subcommand = None) rule for the same base command; lookup order is
/// specificity-first, not declaration order.
pub const COMMAND_RULES: &[CommandRule] = &[
    // ── Read-only basics ────────────────────────────────────────────────
    safe("ls", "List directory contents"),
    safe("pwd", "Print working directory"),
    safe("cat", "Print file contents"),
    safe("head", "Print file head"),
    safe("tail", "Print file tail"),
    safe("wc", "Count lines/words/bytes"),
    safe("grep", "Search file contents"),
    safe("find", "Find files"),
    safe("which", "Locate a binary"),
    safe("file", "Identify file type"),
    safe("stat", "Show file status"),
    safe("du", "Show disk usage"),
    safe("df", "Show filesystem usage"),
    safe("free", "Show memory usage"),
    safe("uptime", "Show system uptime"),
    safe("whoami", "Show current user"),
    safe("id", "Show user identity"),
    safe("uname", "Show system information"),
    safe("date", "Show current date"),
    safe("env", "Show environment variables"),
    safe("printenv", "Show environment variables"),
    safe("hostname", "Show hostname"),
    safe("ps", "List processes"),
    safe("netstat", "Show network connections"),
    safe("ss", "Show socket statistics"),
    safe("lsof", "List open files"),
    safe("dmesg", "Show kernel messages"),
    safe("journalctl", "Show service logs"),
    safe("ping", "Check host reachability"),
    safe("echo", "Print text (env-file generation permitted)"),
    // ── docker ──────────────────────────────────────────────────────────
    sub("docker", "ps", RiskLevel::Safe, "List containers"),
    sub("docker", "images", RiskLevel::Safe, "List images"),
    sub("docker", "logs", RiskLevel::Safe, "Show container logs"),
    sub("docker", "inspect", RiskLevel::Safe, "Inspect docker object"),
    sub("docker", "version", RiskLevel::Safe, "Show docker version"),
    sub("docker", "info", RiskLevel::Safe, "Show docker info"),
    sub("docker", "stats", RiskLevel::Safe, "Show container stats"),
    sub("docker", "pull", RiskLevel::Medium, "Pull an image"),
    sub("docker", "build", RiskLevel::Medium, "Build an image"),
    rule(
        "docker",
        Some("run"),
        RiskLevel::Medium,
        &["--privileged", "--pid", "--cap-add"],
        "Run a container",
    ),
    sub("docker", "start", RiskLevel::Medium, "Start a container"),
    sub("docker", "stop", RiskLevel::Medium, "Stop a container"),
    sub("docker", "restart", RiskLevel::Medium, "Restart a container"),
    sub("docker", "exec", RiskLevel::Medium, "Execute inside a container"),
    sub("docker", "rm", RiskLevel::High, "Remove a container"),
    sub("docker", "rmi", RiskLevel::High, "Remove an image"),
    sub("docker", "system", RiskLevel::High, "Docker system maintenance"),
    rule("docker", None, RiskLevel::Medium, &[], "Other docker operation"),
    // ── docker compose (both invocation styles normalize here) ──────────
    sub("docker-compose", "ps", RiskLevel::Safe, "List compose services"),
    sub("docker-compose", "logs", RiskLevel::Safe, "Show compose logs"),
    sub("docker-compose", "up", RiskLevel::Medium, "Start compose services"),
    sub("docker-compose", "down", RiskLevel::Medium, "Stop compose services"),
    sub("docker-compose", "build", RiskLevel::Medium, "Build compose services"),
    sub("docker-compose", "restart", RiskLevel::Medium, "Restart compose services"),
    rule(
        "docker-compose",
        None,
        RiskLevel::Medium,
        &[],
        "Other compose operation",
    ),
    // ── git ─────────────────────────────────────────────────────────────
    sub("git", "status", RiskLevel::Safe, "Show working tree status"),
    sub("git", "log", RiskLevel::Safe, "Show commit log"),
    sub("git", "diff", RiskLevel::Safe, "Show changes"),
    sub("git", "show", RiskLevel::Safe, "Show git objects"),
    sub("git", "branch", RiskLevel::Safe, "List or manage branches"),
    sub("git", "remote", RiskLevel::Safe, "Show remotes"),
    sub("git", "fetch", RiskLevel::Safe, "Fetch from remote"),
    sub("git", "add", RiskLevel::Safe, "Stage changes"),
    sub("git", "pull", RiskLevel::Medium, "Pull from remote"),
    sub("git", "clone", RiskLevel::Medium, "Clone a repository"),
    sub("git", "commit", RiskLevel::Medium, "Record changes"),
    sub("git", "checkout", RiskLevel::Medium, "Switch branches"),
    sub("git", "merge", RiskLevel::Medium, "Merge branches"),
    rule(
        "git",
        Some("push"),
        RiskLevel::Medium,
        &["--force", "-f"],
        "Push to remote",
    ),
    sub("git", "reset", RiskLevel::High, "Reset current HEAD"),
    sub("git", "clean", RiskLevel::High, "Remove untracked files"),
    rule("git", None, RiskLevel::Medium, &[], "Other git operation"),
    // ── systemctl ───────────────────────────────────────────────────────
    sub("systemctl", "status", RiskLevel::Safe, "Show service status"),
    sub("systemctl", "list-units", RiskLevel::Safe, "List units"),
    sub("systemctl", "is-active", RiskLevel::Safe, "Check service state"),
    sub("systemctl", "start", RiskLevel::Medium, "Start a service"),
    sub("systemctl", "restart", RiskLevel::Medium, "Restart a service"),
    sub("systemctl", "reload", RiskLevel::Medium, "Reload a service"),
    sub("systemctl", "daemon-reload", RiskLevel::Medium, "Reload unit files"),
    sub("systemctl", "enable", RiskLevel::Medium, "Enable a service"),
    sub("systemctl", "stop", RiskLevel::High, "Stop a service"),
    sub("systemctl", "disable", RiskLevel::High, "Disable a service"),
    rule("systemctl", None, RiskLevel::Medium, &[], "Other systemctl operation"),
    // ── package managers ────────────────────────────────────────────────
    sub("apt", "list", RiskLevel::Safe, "List packages"),
    sub("apt", "search", RiskLevel::Safe, "Search packages"),
    sub("apt", "show", RiskLevel::Safe, "Show package details"),
    sub("apt", "install", RiskLevel::Medium, "Install packages"),
    sub("apt", "update", RiskLevel::Medium, "Refresh package index"),
    sub("apt", "upgrade", RiskLevel::High, "Upgrade packages"),
    sub("apt", "remove", RiskLevel::High, "Remove packages"),
    sub("apt", "purge", RiskLevel::High, "Purge packages"),
    sub("apt", "autoremove", RiskLevel::High, "Remove unused packages"),
    sub("yum", "search", RiskLevel::Safe, "Search packages"),
    sub("yum", "list", RiskLevel::Safe, "List packages"),
    sub("yum", "info", RiskLevel::Safe, "Show package details"),
    sub("yum", "install", RiskLevel::Medium, "Install packages"),
    sub("yum", "update", RiskLevel::Medium, "Update packages"),
    sub("yum", "remove", RiskLevel::High, "Remove packages"),
    sub("npm", "list", RiskLevel::Safe, "List npm packages"),
    sub("npm", "ls", RiskLevel::Safe, "List npm packages"),
    sub("npm", "view", RiskLevel::Safe, "Show npm package details"),
    sub("npm", "outdated", RiskLevel::Safe, "List outdated packages"),
    sub("npm", "install", RiskLevel::Medium, "Install npm packages"),
    sub("npm", "ci", RiskLevel::Medium, "Clean-install npm packages"),
    sub("npm", "run", RiskLevel::Medium, "Run an npm script"),
    sub("npm", "test", RiskLevel::Medium, "Run npm tests"),
    sub("npm", "uninstall", RiskLevel::Medium, "Remove npm packages"),
    sub("npm", "publish", RiskLevel::High, "Publish to the npm registry"),
    sub("pip", "list", RiskLevel::Safe, "List python packages"),
    sub("pip", "show", RiskLevel::Safe, "Show python package details"),
    sub("pip", "freeze", RiskLevel::Safe, "Freeze python packages"),
    sub("pip", "install", RiskLevel::Medium, "Install python packages"),
    sub("pip", "uninstall", RiskLevel::High, "Remove python packages"),
];

/// True when the base command is in the non-overridable block set.
/// `mkfs` is prefix-matched so `mkfs.ext4` and friends are caught too.
fn is_absolutely_blocked(base: &str) -> bool {
    base.starts_with("mkfs") || ABSOLUTE_BLOCK.contains(&base)
}

/// Specificity-first rule lookup: exact (base, subcommand) wins over the
/// generic (base, None) rule regardless of declaration order.
fn find_rule(base: &str, subcommand: Option<&str>) -> Option<&'static CommandRule> {
    if let Some(sub) = subcommand {
        let exact = COMMAND_RULES
            .iter()
            .find(|r| r.base == base && r.subcommand == Some(sub));
        if exact.is_some() {
            return exact;
        }
    }
    COMMAND_RULES
        .iter()
        .find(|r| r.base == base && r.subcommand.is_none())
}

/// True when `arg` trips one of the rule's blocked flags: exact match,
/// `flag=value` prefix, or per-character membership for combined short flags
/// (`-rf` matches a blocked `-f`).
fn matches_blocked_flag(arg: &str, blocked_flags: &[&str]) -> bool {
    for flag in blocked_flags {
        if arg == *flag {
            return true;
        }
        let mut prefixed = String::with_capacity(flag.len() + 1);
        prefixed.push_str(flag);
        prefixed.push('=');
        if arg.starts_with(&prefixed) {
            return true;
        }
    }

    if arg.starts_with('-') && !arg.starts_with("--") {
        for c in arg.chars().skip(1) {
            if blocked_flags
                .iter()
                .any(|flag| flag.len() == 2 && flag.ends_with(c))
            {
                return true;
            }
        }
    }

    false
}

fn base_token(segment: &str) -> &str {
    segment
        .split_whitespace()
        .next()
        .map(|token| token.rsplit('/').next().unwrap_or(token))
        .unwrap_or("")
}

/// Validate every segment after the first pipe against the pipe allowlist.
fn check_pipe_segments(command: &str) -> Option<CommandCheckResult> {
    if !command.contains('|') {
        return None;
    }
    for segment in command.split('|').skip(1) {
        let target = base_token(segment);
        if target.is_empty() || !PIPE_ALLOWLIST.contains(&target) {
            return Some(CommandCheckResult::deny(format!(
                "Pipe target '{target}' not in pipe allowlist"
            )));
        }
    }
    None
}

/// Check a shell command against the static whitelist.
///
/// Runs the fixed pipeline: empty check, metacharacter scan (with the echo
/// exemption), absolute-block set, rule lookup, blocked-flag scan, pipe
/// allowlist. A missing rule is reported as a deferral (`allowed = None`) so
/// the risk analyzer can take over; every other outcome is final.
pub fn check(command: &str) -> CommandCheckResult {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return CommandCheckResult::deny("Empty command");
    }

    let raw_base = base_token(trimmed);
    let metacharacters = if raw_base == "echo" {
        ECHO_BLOCKED_METACHARACTERS
    } else {
        SHELL_METACHARACTERS
    };
    for (pattern, label) in metacharacters {
        if trimmed.contains(pattern) {
            return CommandCheckResult::deny(format!(
                "Blocked shell metacharacter {pattern:?} ({label})"
            ));
        }
    }

    let ParsedCommand {
        base,
        subcommand,
        args,
    } = parse_command(trimmed);

    if is_absolutely_blocked(&base) {
        return CommandCheckResult::deny(format!("Blocked command: {base}"));
    }

    let Some(rule) = find_rule(&base, subcommand.as_deref()) else {
        return CommandCheckResult::deferred(format!("Command '{base}' not in whitelist"));
    };

    if !rule.blocked_flags.is_empty() {
        for arg in &args {
            if matches_blocked_flag(arg, rule.blocked_flags) {
                return CommandCheckResult::deny(format!("Blocked flag '{arg}' for {base}"));
            }
        }
    }

    if let Some(denied) = check_pipe_segments(trimmed) {
        return denied;
    }

    CommandCheckResult::allow(rule.risk, format!("Allowed: {}", rule.description)).with_rule(rule)
}
