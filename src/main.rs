use anyhow::Result;
use clap::{Parser, Subcommand};
use opspilot::engine::{EngineConfig, LoopOutcome, ReactEngine, SessionHistory};
use opspilot::safety::{PolicyEngine, RiskLevel};
use opspilot::workers::{ChatWorker, Instruction, ShellWorker, WorkerRegistry};
use opspilot::Config;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// How long the CLI waits for an approval keypress before treating the
/// instruction as denied.
const APPROVAL_TIMEOUT_SECS: u64 = 60;

#[derive(Parser)]
#[command(
    name = "opspilot",
    version,
    about = "LLM-driven operations assistant with a layered command-safety pipeline"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single request through the reason-act loop
    Run {
        /// The natural-language request
        request: String,
        /// Override the iteration budget
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Simulate every instruction instead of executing
        #[arg(long)]
        dry_run: bool,
        /// Approve high-risk instructions without prompting
        #[arg(long)]
        yes: bool,
    },
    /// Interactive session
    Chat,
    /// Classify a shell command without executing it
    Check {
        /// The command string to classify
        command: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let config = Config::load()?;

    match cli.command {
        Commands::Run {
            request,
            max_iterations,
            dry_run,
            yes,
        } => {
            let mut config = config;
            if let Some(budget) = max_iterations {
                config.safety.max_iterations = budget;
            }
            if dry_run {
                config.safety.dry_run = true;
            }
            config.validate()?;

            let engine = build_engine(&config)?;
            let report = drive_to_completion(
                &engine,
                engine.react_loop(&request, SessionHistory::new()).await,
                yes,
            )
            .await?;
            print_report(&report);
        }
        Commands::Chat => {
            let engine = build_engine(&config)?;
            run_chat(&engine).await?;
        }
        Commands::Check { command } => {
            let policy = PolicyEngine::new();
            let verdict = policy.check_command_safety(&command);
            let status = if verdict.allowed { "allowed" } else { "denied" };
            println!("{status} (risk: {})", verdict.risk_level);
            println!("{}", verdict.reason);
        }
    }

    Ok(())
}

fn build_engine(config: &Config) -> Result<ReactEngine> {
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(ShellWorker::new(config.workspace_dir.clone())));
    registry.register(Arc::new(ChatWorker::new()));

    let llm = opspilot::llm::create_client(&config.llm)?;

    Ok(ReactEngine::new(
        Arc::new(PolicyEngine::new()),
        Arc::new(registry),
        Arc::from(llm),
        EngineConfig::from_config(config),
    ))
}

/// Drive the loop across approval suspensions until a final report lands.
async fn drive_to_completion(
    engine: &ReactEngine,
    mut outcome: LoopOutcome,
    auto_approve: bool,
) -> Result<opspilot::engine::FinalReport> {
    loop {
        match outcome {
            LoopOutcome::Final(report) => return Ok(report),
            LoopOutcome::AwaitingApproval {
                session_id,
                instruction,
                risk_level,
            } => {
                let granted = auto_approve || prompt_approval(&instruction, risk_level).await;
                outcome = engine.resume(&session_id, granted).await?;
            }
        }
    }
}

/// Ask the operator to approve a high-risk instruction on stderr.
async fn prompt_approval(instruction: &Instruction, risk_level: RiskLevel) -> bool {
    let summary = instruction
        .command_arg()
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("{}.{}", instruction.worker, instruction.action));

    eprintln!();
    eprintln!("┌─ Approval Required ──────────────────────────────");
    eprintln!("│ Action:  {summary}");
    eprintln!("│ Risk:    {risk_level}");
    eprintln!("├──────────────────────────────────────────────────");
    eprintln!("│ [A]pprove  [D]eny");
    eprintln!("└──────────────────────────────────────────────────");
    eprint!("  > ");
    let _ = std::io::stderr().flush();

    let decision = tokio::time::timeout(
        Duration::from_secs(APPROVAL_TIMEOUT_SECS),
        read_single_char(),
    )
    .await;

    match decision {
        Ok(Ok(ch)) => ch.eq_ignore_ascii_case(&'a'),
        Ok(Err(_)) => false,
        Err(_) => {
            eprintln!("approval timed out, treating as denied");
            false
        }
    }
}

async fn read_single_char() -> Result<char> {
    // stdin is blocking; keep it off the runtime threads.
    let ch = tokio::task::spawn_blocking(|| {
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        input
            .trim()
            .chars()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no input received"))
    })
    .await??;
    Ok(ch)
}

fn print_report(report: &opspilot::engine::FinalReport) {
    println!("{}", report.render());
    if !report.suggested_commands.is_empty() {
        println!("\nSuggested commands:");
        for command in &report.suggested_commands {
            println!("  {command}");
        }
    }
}

async fn run_chat(engine: &ReactEngine) -> Result<()> {
    println!("opspilot interactive mode — type /quit to exit.\n");

    let mut history = SessionHistory::new();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let outcome = engine.react_loop(line, history.clone()).await;
        let report = drive_to_completion(engine, outcome, false).await?;
        print_report(&report);
        history = report.history.clone();
    }

    Ok(())
}
