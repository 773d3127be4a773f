//! qarun CLI - Command line interface for the qarun collaborator.

use std::error::Error;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use qarun_client::{spawn_monitor, ClientConfig, HttpClient, Submission, WsChannel};
use qarun_core::{newest_first, Report, Run, RunId, RunPhase};

type CliResult = Result<(), Box<dyn Error>>;

/// qarun CLI - submit test intents and inspect runs
#[derive(Parser)]
#[command(name = "qarun")]
#[command(about = "CLI for the qarun test automation collaborator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Origin the client is considered served from (scheme and host)
    #[arg(long, global = true, env = "QARUN_PAGE_ORIGIN", default_value = "http://localhost")]
    page_origin: String,

    /// Collaborator port on the page origin's host
    #[arg(short, long, global = true, env = "QARUN_PORT", default_value = "8000")]
    port: u16,

    /// Explicit base URL for REST calls (defaults to the collaborator origin)
    #[arg(long, global = true, env = "QARUN_API_BASE")]
    api_base: Option<String>,

    /// Prefix of the submit/result/status endpoints
    #[arg(long, global = true, default_value = "/api")]
    api_prefix: String,

    /// Seconds to wait for run_end after the channel drops
    #[arg(long, global = true, default_value = "15")]
    disconnect_grace: u64,

    /// Seconds to wait for a scenario run to reply
    #[arg(long, global = true, default_value = "600")]
    run_timeout: u64,
}

impl ConnectionArgs {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            page_origin: self.page_origin.clone(),
            collaborator_port: self.port,
            api_base: self.api_base.clone(),
            api_prefix: self.api_prefix.clone(),
            disconnect_grace: Duration::from_secs(self.disconnect_grace),
            run_timeout: Duration::from_secs(self.run_timeout),
            ..ClientConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a natural-language test intent
    Submit {
        /// The test intent
        #[arg(required = true)]
        intent: Vec<String>,

        /// Follow the run live until it finishes
        #[arg(short, long)]
        follow: bool,
    },

    /// Compile a test intent into a TestIR without running it
    Generate {
        /// The test intent
        #[arg(required = true)]
        intent: Vec<String>,

        /// Page the scenario targets
        #[arg(short, long)]
        target_url: String,
    },

    /// Run a TestIR and follow it live
    Run {
        /// TestIR JSON file, or "-" for stdin
        file: String,
    },

    /// Show the result of a run
    Result {
        /// Run ID
        id: String,
    },

    /// Show the collaborator's status record for a run
    Status {
        /// Run ID
        id: String,
    },

    /// List tasks, newest first
    Tasks,

    /// Show the aggregate report
    Report,
}

#[tokio::main]
async fn main() -> CliResult {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.connection.client_config();
    let client = config.http_client()?;

    match cli.command {
        Commands::Submit { intent, follow } => {
            let intent = intent.join(" ");
            if follow {
                follow_run(&config, Submission::intent(intent)).await?;
            } else {
                let run_id = client.submit(&intent).await?;
                println!("Run submitted: {}", run_id);
            }
        }
        Commands::Generate { intent, target_url } => {
            let test_ir = client.generate_scenario(&intent.join(" "), &target_url).await?;
            print_json(&test_ir)?;
        }
        Commands::Run { file } => {
            let test_ir = read_test_ir(&file)?;
            follow_run(&config, Submission::scenario(test_ir)).await?;
        }
        Commands::Result { id } => {
            print_json(&client.result(&RunId::new(id)).await?)?;
        }
        Commands::Status { id } => {
            print_json(&client.status(&RunId::new(id)).await?)?;
        }
        Commands::Tasks => {
            list_tasks(&client).await?;
        }
        Commands::Report => {
            print_report(&client.report().await?);
        }
    }

    Ok(())
}

fn read_test_ir(file: &str) -> Result<Value, Box<dyn Error>> {
    let text = if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file)?
    };
    Ok(serde_json::from_str(&text)?)
}

fn print_json(value: &Value) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Drive a run through the monitor and print it as it progresses.
async fn follow_run(config: &ClientConfig, submission: Submission) -> CliResult {
    let endpoint = config.endpoint()?;
    let (monitor, monitor_task) = spawn_monitor(
        Arc::new(config.http_client()?),
        WsChannel::new(endpoint.clone()),
        endpoint,
        config.monitor_config(),
    );

    let mut updates = WatchStream::new(monitor.subscribe());
    monitor.submit(submission).await?;

    let mut printer = RunPrinter::default();
    let mut submitted = false;
    // Once terminal, give the result fetch a bounded time to land.
    let mut result_deadline: Option<Instant> = None;
    let mut last = Run::default();

    loop {
        let next = match result_deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, updates.next()).await {
                Ok(next) => next,
                Err(_) => {
                    debug!("Result did not arrive in time");
                    break;
                }
            },
            None => updates.next().await,
        };
        let Some(run) = next else { break };

        printer.print(&run);
        let phase = run.phase;
        match phase {
            RunPhase::Submitting | RunPhase::Running => submitted = true,
            // A failed submit logs an error and falls back to idle.
            RunPhase::Idle if submitted || !run.logs.is_empty() => {
                last = run;
                break;
            }
            RunPhase::Done | RunPhase::Failed => {
                if run.result.is_some() {
                    last = run;
                    break;
                }
                if result_deadline.is_none() {
                    result_deadline = Some(Instant::now() + config.request_timeout + Duration::from_secs(1));
                }
            }
            RunPhase::Idle => {}
        }
        last = run;
    }

    monitor.shutdown().await;
    let _ = monitor_task.await;

    match last.phase {
        RunPhase::Done => Ok(()),
        RunPhase::Failed => Err(format!(
            "run {} failed",
            last.id.as_ref().map_or("-", |id| id.as_str())
        )
        .into()),
        _ => Err("submission failed".into()),
    }
}

/// Prints what changed since the last published run state.
#[derive(Default)]
struct RunPrinter {
    phase: Option<RunPhase>,
    logs: usize,
    artifacts: usize,
    result: bool,
}

impl RunPrinter {
    fn print(&mut self, run: &Run) {
        for entry in run.logs.iter().skip(self.logs) {
            println!(
                "{}  {:<10}  {}",
                entry.received_at.format("%H:%M:%S"),
                entry.kind(),
                entry.summary()
            );
        }
        self.logs = run.logs.len();

        for artifact in run.artifacts.iter().skip(self.artifacts) {
            println!("          artifact    {}  {}", artifact.step, artifact.url);
        }
        self.artifacts = run.artifacts.len();

        if self.phase != Some(run.phase) {
            self.phase = Some(run.phase);
            match (&run.id, run.failure) {
                (Some(id), Some(cause)) => println!("Run {}: {} ({:?})", id, run.phase, cause),
                (Some(id), None) => println!("Run {}: {}", id, run.phase),
                (None, _) => println!("Run: {}", run.phase),
            }
        }

        if let (Some(result), false) = (&run.result, self.result) {
            self.result = true;
            println!("Result:");
            match serde_json::to_string_pretty(result) {
                Ok(text) => println!("{}", text),
                Err(_) => println!("{}", result),
            }
        }
    }
}

async fn list_tasks(client: &HttpClient) -> CliResult {
    let tasks = client.tasks().await?;

    println!("Tasks ({}):", tasks.len());
    println!("{:<8}  {:<10}  {:<20}  {}", "ID", "STATUS", "UPDATED", "DESCRIPTION");
    println!("{}", "-".repeat(80));

    for task in newest_first(&tasks) {
        println!(
            "{:<8}  {:<10}  {:<20}  {}",
            task.id.short(),
            task.status.as_str(),
            task.updated_at.as_deref().unwrap_or("-"),
            task.description_or_dash()
        );
    }

    Ok(())
}

fn print_report(report: &Report) {
    let m = &report.metrics;
    let rate = match m.success_rate() {
        Some(_) => format!("{}%", m.success_rate_display()),
        None => m.success_rate_display(),
    };

    println!("Summary:");
    println!("  {}", report.summary);
    println!();
    println!("Metrics:");
    println!("  Total:        {}", m.total_tasks);
    println!("  Completed:    {}", m.completed);
    println!("  Failed:       {}", m.failed);
    println!("  Pending:      {}", m.pending);
    println!("  Success rate: {}", rate);
    println!("  Avg duration: {}", m.avg_duration_display());

    let failures = m.top_failures();
    if !failures.is_empty() {
        println!();
        println!("Failure distribution:");
        for (kind, count) in failures {
            println!("  {:<30}  {}", kind, count);
        }
    }

    if !m.recent_tasks.is_empty() {
        println!();
        println!("Recent tasks: {}", m.recent_tasks.len());
    }
}
