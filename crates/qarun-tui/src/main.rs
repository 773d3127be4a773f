//! qarun Terminal UI.
//!
//! Submit test intents, follow the run live, and watch the task list and report.

use std::error::Error;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use qarun_client::ClientConfig;

mod app;
mod backend;
mod event;
mod state;
mod ui;

use app::App;
use event::{BackendCommand, UiEvent};

#[derive(Parser)]
#[command(name = "qarun-tui")]
#[command(about = "qarun Terminal UI")]
#[command(version)]
struct Cli {
    /// Origin the client is considered served from (scheme and host)
    #[arg(long, env = "QARUN_PAGE_ORIGIN", default_value = "http://localhost")]
    page_origin: String,

    /// Collaborator port on the page origin's host
    #[arg(short, long, env = "QARUN_PORT", default_value = "8000")]
    port: u16,

    /// Explicit base URL for REST calls (defaults to the collaborator origin)
    #[arg(long, env = "QARUN_API_BASE")]
    api_base: Option<String>,

    /// Prefix of the submit/result/status endpoints
    #[arg(long, default_value = "/api")]
    api_prefix: String,

    /// Task list refresh interval in seconds
    #[arg(long, default_value = "5")]
    task_refresh: u64,

    /// Report refresh interval in seconds
    #[arg(long, default_value = "30")]
    report_refresh: u64,

    /// Seconds to wait for run_end after the channel drops
    #[arg(long, default_value = "15")]
    disconnect_grace: u64,

    /// Seconds to wait for a scenario run to reply
    #[arg(long, default_value = "600")]
    run_timeout: u64,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            page_origin: self.page_origin.clone(),
            collaborator_port: self.port,
            api_base: self.api_base.clone(),
            api_prefix: self.api_prefix.clone(),
            task_poll_interval: Duration::from_secs(self.task_refresh),
            report_poll_interval: Duration::from_secs(self.report_refresh),
            disconnect_grace: Duration::from_secs(self.disconnect_grace),
            run_timeout: Duration::from_secs(self.run_timeout),
            ..ClientConfig::default()
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Logs go to /tmp/qarun-tui.log to avoid terminal interference
    let log_file = std::fs::File::create("/tmp/qarun-tui.log").ok();
    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("qarun_tui=debug,qarun_client=debug,qarun=warn")),
            )
            .with_ansi(false)
            .init();
    }

    let cli = Cli::parse();
    let config = cli.client_config();

    // Fail fast on a bad origin before taking over the terminal
    let collaborator = config.endpoint()?.http_origin();
    info!(collaborator = %collaborator, "Starting TUI");

    // Create channels for UI <-> backend communication
    let (ui_tx, ui_rx) = mpsc::channel::<UiEvent>(100);
    let (cmd_tx, cmd_rx) = mpsc::channel::<BackendCommand>(100);

    // Spawn background thread with its own tokio runtime
    let runtime = tokio::runtime::Runtime::new()?;
    let bg_handle = std::thread::spawn(move || {
        runtime.block_on(backend::run_backend(config, ui_tx, cmd_rx));
    });

    // Initialize terminal (enters alternate screen, enables raw mode)
    let terminal = ratatui::init();

    let mut app = App::new(collaborator, ui_rx, cmd_tx);
    let result = app.run(terminal);

    // Restore terminal (exits alternate screen, disables raw mode)
    ratatui::restore();

    let _ = bg_handle.join();

    info!("TUI shutdown complete");

    result.map_err(|e| e.into())
}
