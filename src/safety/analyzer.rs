use super::parser::{ParsedCommand, parse_command};
use super::types::{CommandCheckResult, Severity};
use serde::Serialize;

// Layer-1 category keyword tables. These are heuristic and intentionally
// data, not logic: the analyzer owns a `RiskTables` value built at
// construction, so deployments can tune the tables without touching the
// layering or combination rules.

const QUERY_COMMANDS: &[&str] = &[
    "ls", "cat", "pwd", "whoami", "id", "date", "uptime", "uname", "which", "whereis", "file",
    "stat", "du", "df", "head", "tail", "wc", "find", "grep", "env", "printenv", "echo",
    "hostname", "history", "tree", "realpath",
];

const PACKAGE_MANAGER_COMMANDS: &[&str] = &[
    "apt", "apt-get", "apt-cache", "yum", "dnf", "brew", "npm", "pnpm", "yarn", "pip", "pip3",
    "cargo", "gem", "snap",
];

const SERVICE_MANAGEMENT_COMMANDS: &[&str] =
    &["systemctl", "service", "supervisorctl", "crontab"];

const CONTAINER_COMMANDS: &[&str] = &["docker", "docker-compose", "kubectl", "podman", "helm",
    "minikube", "kind"];

const LANGUAGE_RUNTIME_COMMANDS: &[&str] = &[
    "python", "python3", "node", "deno", "bun", "ruby", "java", "go", "rustc", "perl", "php",
];

const DESTRUCTIVE_COMMANDS: &[&str] =
    &["rm", "rmdir", "shred", "truncate", "kill", "killall", "pkill"];

const MONITORING_COMMANDS: &[&str] = &[
    "ps", "top", "htop", "free", "vmstat", "iostat", "netstat", "ss", "lsof", "dmesg",
    "journalctl", "uptime",
];

const VERSION_CONTROL_COMMANDS: &[&str] = &["git", "svn", "hg"];

const NETWORK_COMMANDS: &[&str] = &[
    "curl", "wget", "ping", "ssh", "scp", "rsync", "nc", "ncat", "telnet", "dig", "nslookup",
    "traceroute", "host",
];

// Layer-2 verb tables.

const READ_ONLY_VERBS: &[&str] = &[
    "list", "ls", "show", "status", "ping", "get", "describe", "info", "inspect", "logs", "ps",
    "search", "view", "top", "version", "help", "config",
];

const WRITE_VERBS: &[&str] = &[
    "install", "create", "apply", "add", "update", "upgrade", "start", "restart", "reload",
    "enable", "push", "pull", "build", "run", "set", "scale", "deploy", "up",
];

const DESTRUCTIVE_VERBS: &[&str] = &[
    "delete", "remove", "purge", "stop", "kill", "destroy", "uninstall", "disable", "drop",
    "down", "rollback", "prune", "reset",
];

const VERSION_HELP_FLAGS: &[&str] = &["--version", "--help", "-h", "-V"];

// Layer-3 tables.

const DANGEROUS_FLAGS: &[&str] = &["--force", "--hard", "--no-preserve-root", "-9", "-rf", "-fr"];

const DANGEROUS_PATH_PREFIXES: &[&str] = &[
    "/etc", "/boot", "/dev", "/sys", "/proc", "/var", "/usr", "/bin", "/sbin", "/lib", "/root",
];

// Layer-4 tables.

const PIPE_SINK_BLOCKLIST: &[&str] =
    &["bash", "sh", "zsh", "dash", "ksh", "sudo", "su", "eval", "exec"];

const KNOWN_PIPE_TOOLS: &[&str] = &[
    "grep", "egrep", "fgrep", "rg", "awk", "sed", "sort", "uniq", "cut", "tr", "head", "tail",
    "wc", "jq", "yq", "less", "more", "cat", "tee", "xargs", "base64",
];

/// Coarse category a base command falls into; each category carries a
/// baseline risk refined by the later layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    Query,
    PackageManager,
    ServiceManagement,
    Container,
    LanguageRuntime,
    Destructive,
    Monitoring,
    VersionControl,
    NetworkTools,
    Unknown,
}

impl CommandCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandCategory::Query => "query",
            CommandCategory::PackageManager => "package_manager",
            CommandCategory::ServiceManagement => "service_management",
            CommandCategory::Container => "container",
            CommandCategory::LanguageRuntime => "language_runtime",
            CommandCategory::Destructive => "destructive",
            CommandCategory::Monitoring => "monitoring",
            CommandCategory::VersionControl => "version_control",
            CommandCategory::NetworkTools => "network_tools",
            CommandCategory::Unknown => "unknown",
        }
    }

    fn baseline(self) -> Severity {
        match self {
            CommandCategory::Query
            | CommandCategory::Monitoring
            | CommandCategory::VersionControl
            | CommandCategory::LanguageRuntime => Severity::Safe,
            CommandCategory::PackageManager
            | CommandCategory::ServiceManagement
            | CommandCategory::Container
            | CommandCategory::NetworkTools
            | CommandCategory::Unknown => Severity::Medium,
            CommandCategory::Destructive => Severity::High,
        }
    }
}

/// The analyzer's keyword tables, built once at construction. Defaults are
/// the compiled-in tables above; tests and deployments may substitute their
/// own without touching the layer logic.
#[derive(Debug, Clone)]
pub struct RiskTables {
    pub query: &'static [&'static str],
    pub package_manager: &'static [&'static str],
    pub service_management: &'static [&'static str],
    pub container: &'static [&'static str],
    pub language_runtime: &'static [&'static str],
    pub destructive: &'static [&'static str],
    pub monitoring: &'static [&'static str],
    pub version_control: &'static [&'static str],
    pub network_tools: &'static [&'static str],
    pub read_only_verbs: &'static [&'static str],
    pub write_verbs: &'static [&'static str],
    pub destructive_verbs: &'static [&'static str],
    pub version_help_flags: &'static [&'static str],
    pub dangerous_flags: &'static [&'static str],
    pub dangerous_path_prefixes: &'static [&'static str],
    pub pipe_sinks: &'static [&'static str],
    pub known_pipe_tools: &'static [&'static str],
}

impl Default for RiskTables {
    fn default() -> Self {
        Self {
            query: QUERY_COMMANDS,
            package_manager: PACKAGE_MANAGER_COMMANDS,
            service_management: SERVICE_MANAGEMENT_COMMANDS,
            container: CONTAINER_COMMANDS,
            language_runtime: LANGUAGE_RUNTIME_COMMANDS,
            destructive: DESTRUCTIVE_COMMANDS,
            monitoring: MONITORING_COMMANDS,
            version_control: VERSION_CONTROL_COMMANDS,
            network_tools: NETWORK_COMMANDS,
            read_only_verbs: READ_ONLY_VERBS,
            write_verbs: WRITE_VERBS,
            destructive_verbs: DESTRUCTIVE_VERBS,
            version_help_flags: VERSION_HELP_FLAGS,
            dangerous_flags: DANGEROUS_FLAGS,
            dangerous_path_prefixes: DANGEROUS_PATH_PREFIXES,
            pipe_sinks: PIPE_SINK_BLOCKLIST,
            known_pipe_tools: KNOWN_PIPE_TOOLS,
        }
    }
}

/// Diagnostic record of one analyzer invocation. Built once, immutable after
/// construction, serializable for audit logging.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisTrace {
    pub command: String,
    pub layer1_category: String,
    pub layer1_risk: Severity,
    pub layer2_semantics: Vec<String>,
    pub layer2_risk: Severity,
    pub layer3_flags: Vec<String>,
    pub layer3_risk: Severity,
    pub layer4_pipe_info: String,
    pub layer4_risk: Severity,
    pub final_risk: Severity,
}

/// Four-layer fallback risk engine, invoked only on whitelist deferral.
///
/// Layer 1 classifies the base command into a category baseline; layer 2
/// refines it with verb-level semantics; layer 3 scans flags and paths;
/// layer 4 analyzes pipe composition. The final risk is the maximum severity
/// across layers, except that a `--dry-run` flag forces the result down to
/// safe unless a terminal `blocked` verdict (bare `/` path or pipe sink) is
/// present.
#[derive(Debug, Clone, Default)]
pub struct RiskAnalyzer {
    tables: RiskTables,
}

impl RiskAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: RiskTables) -> Self {
        Self { tables }
    }

    pub fn analyze(&self, command: &str) -> (CommandCheckResult, AnalysisTrace) {
        let parsed = parse_command(command);

        // Layer 1: category baseline.
        let category = self.classify(&parsed.base);
        let layer1_risk = category.baseline();

        // Layer 2: verb semantics override the baseline when they match.
        let (layer2_semantics, semantic_risk) = self.semantic_risk(&parsed, layer1_risk);
        let layer2_risk = semantic_risk.unwrap_or(layer1_risk);

        // Layer 3: dangerous flags and paths; remembers a dry-run marker.
        let (layer3_flags, layer3_risk, dry_run) = self.flag_and_path_risk(&parsed);

        // Layer 4: pipe composition.
        let (layer4_pipe_info, layer4_risk) = self.pipe_risk(command);

        let mut final_risk = layer2_risk.max(layer3_risk).max(layer4_risk);
        if dry_run && final_risk != Severity::Blocked {
            final_risk = Severity::Safe;
        }

        let trace = AnalysisTrace {
            command: command.to_string(),
            layer1_category: category.as_str().to_string(),
            layer1_risk,
            layer2_semantics,
            layer2_risk,
            layer3_flags,
            layer3_risk,
            layer4_pipe_info,
            layer4_risk,
            final_risk,
        };

        tracing::debug!(
            command,
            category = %trace.layer1_category,
            final_risk = %trace.final_risk,
            "risk analysis complete"
        );

        let result = if final_risk == Severity::Blocked {
            CommandCheckResult::deny(format!(
                "Blocked by risk analysis: {}",
                blocked_cause(&trace)
            ))
        } else {
            CommandCheckResult::allow(
                final_risk.to_risk_level(),
                format!(
                    "Risk analysis: category={}, risk={}",
                    trace.layer1_category, final_risk
                ),
            )
        };

        (result, trace)
    }

    fn classify(&self, base: &str) -> CommandCategory {
        let t = &self.tables;
        if t.query.contains(&base) {
            CommandCategory::Query
        } else if t.package_manager.contains(&base) {
            CommandCategory::PackageManager
        } else if t.service_management.contains(&base) {
            CommandCategory::ServiceManagement
        } else if t.container.contains(&base) {
            CommandCategory::Container
        } else if t.language_runtime.contains(&base) {
            CommandCategory::LanguageRuntime
        } else if t.destructive.contains(&base) {
            CommandCategory::Destructive
        } else if t.monitoring.contains(&base) {
            CommandCategory::Monitoring
        } else if t.version_control.contains(&base) {
            CommandCategory::VersionControl
        } else if t.network_tools.contains(&base) {
            CommandCategory::NetworkTools
        } else {
            CommandCategory::Unknown
        }
    }

    /// Scan subcommand + args for verb-level semantics. Returns the matched
    /// semantic tags and, when anything matched, the overriding risk.
    /// Precedence: version/help > destructive > write > read-only.
    fn semantic_risk(
        &self,
        parsed: &ParsedCommand,
        baseline: Severity,
    ) -> (Vec<String>, Option<Severity>) {
        let t = &self.tables;
        let mut semantics = Vec::new();
        let mut read_only = false;
        let mut write = false;
        let mut destructive = false;
        let mut version_help = false;

        let tokens = parsed
            .subcommand
            .iter()
            .chain(parsed.args.iter())
            .map(String::as_str);

        for token in tokens {
            if t.version_help_flags.contains(&token) {
                version_help = true;
                semantics.push(format!("read_only:{token}"));
            } else if t.destructive_verbs.contains(&token) {
                destructive = true;
                semantics.push(format!("destructive:{token}"));
            } else if t.write_verbs.contains(&token) {
                write = true;
                semantics.push(format!("write:{token}"));
            } else if t.read_only_verbs.contains(&token) {
                read_only = true;
                semantics.push(format!("read_only:{token}"));
            }
        }

        let risk = if version_help {
            Some(Severity::Safe)
        } else if destructive {
            Some(Severity::High)
        } else if write {
            Some(baseline.max(Severity::Medium))
        } else if read_only {
            Some(Severity::Safe)
        } else {
            None
        };

        (semantics, risk)
    }

    /// Scan args for dangerous flags and absolute paths. A bare `/` argument
    /// is terminal (`Blocked`); system-path prefixes escalate to high. The
    /// returned bool reports a `--dry-run` flag anywhere in the args.
    fn flag_and_path_risk(&self, parsed: &ParsedCommand) -> (Vec<String>, Severity, bool) {
        let t = &self.tables;
        let mut matched = Vec::new();
        let mut risk = Severity::Safe;
        let mut dry_run = false;

        for arg in &parsed.args {
            if arg == "--dry-run" {
                dry_run = true;
                matched.push("dry_run:--dry-run".to_string());
                continue;
            }

            if arg == "/" {
                risk = Severity::Blocked;
                matched.push("path:/".to_string());
                continue;
            }

            if t.dangerous_path_prefixes
                .iter()
                .any(|prefix| arg == prefix || arg.starts_with(&format!("{prefix}/")))
            {
                risk = risk.max(Severity::High);
                matched.push(format!("path:{arg}"));
            }

            if t.dangerous_flags.contains(&arg.as_str()) || is_dangerous_combined_flag(arg) {
                risk = risk.max(Severity::High);
                matched.push(format!("flag:{arg}"));
            }
        }

        (matched, risk, dry_run)
    }

    /// Classify every piped-to command. Blocklisted sinks are terminal;
    /// known pipe tools contribute their own category baseline; unknown
    /// tools contribute medium.
    fn pipe_risk(&self, command: &str) -> (String, Severity) {
        if !command.contains('|') {
            return ("no_pipe".to_string(), Severity::Safe);
        }

        let mut risk = Severity::Safe;
        let mut parts = Vec::new();

        for segment in command.split('|').skip(1) {
            let target = segment
                .split_whitespace()
                .next()
                .map(|token| token.rsplit('/').next().unwrap_or(token))
                .unwrap_or("");

            let contribution = if self.tables.pipe_sinks.contains(&target) {
                Severity::Blocked
            } else if self.tables.known_pipe_tools.contains(&target) {
                self.classify(target).baseline()
            } else {
                Severity::Medium
            };

            parts.push(format!("{target}={contribution}"));
            risk = risk.max(contribution);
        }

        (parts.join(","), risk)
    }
}

/// Combined short flags that pack recursive+force (`-rf`, `-Rfv`, ...).
fn is_dangerous_combined_flag(arg: &str) -> bool {
    if !arg.starts_with('-') || arg.starts_with("--") {
        return false;
    }
    let chars: Vec<char> = arg.chars().skip(1).collect();
    let has_recursive = chars.iter().any(|c| *c == 'r' || *c == 'R');
    let has_force = chars.contains(&'f');
    has_recursive && has_force
}

fn blocked_cause(trace: &AnalysisTrace) -> String {
    if trace.layer3_risk == Severity::Blocked {
        return trace
            .layer3_flags
            .iter()
            .find(|tag| tag.starts_with("path:"))
            .cloned()
            .unwrap_or_else(|| "dangerous path".to_string());
    }
    if trace.layer4_risk == Severity::Blocked {
        return format!("pipe sink ({})", trace.layer4_pipe_info);
    }
    "terminal verdict".to_string()
}
