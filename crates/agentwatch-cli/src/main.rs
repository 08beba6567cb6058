//! Command-line monitor for a remote analysis session.
//!
//! Opens a [`SessionMonitor`] on the given session id and prints a line
//! whenever the observable state changes, until the analysis finishes or
//! the user interrupts.

use std::path::PathBuf;

use agentwatch_core::connection::{ConnectionInfo, ConnectionState};
use agentwatch_core::session::Session;
use agentwatch_sync::{MonitorConfig, SessionMonitor};
use anyhow::Context;
use clap::Parser;

/// Watch the progress of a running trading analysis session.
#[derive(Debug, Parser)]
#[command(name = "agentwatch", version, about)]
struct Cli {
    /// Session id to watch.
    session_id: String,

    /// HTTP base of the analysis backend; overrides the config file.
    #[arg(long)]
    base_url: Option<String>,

    /// Websocket base; derived from the HTTP base when omitted.
    #[arg(long)]
    ws_url: Option<String>,

    /// JSON config file with monitor tunables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    agentwatch_core::logging::init_subscriber(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<MonitorConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => MonitorConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if cli.ws_url.is_some() {
        config.ws_url = cli.ws_url;
    }

    tracing::info!(session_id = %cli.session_id, base_url = %config.base_url, "watching session");
    let monitor = SessionMonitor::open(config, &cli.session_id);
    let mut revisions = monitor.subscribe();
    let mut last_line = String::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = monitor.snapshot();
                let connection = monitor.connection();
                let line = render(&session, &connection);
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
                if session.is_terminal() {
                    print_summary(&session);
                    break;
                }
                if connection.state == ConnectionState::PermanentlyFailed {
                    tracing::warn!("connection permanently failed; showing last known state");
                }
            }
        }
    }

    monitor.close();
    Ok(())
}

fn render(session: &Session, connection: &ConnectionInfo) -> String {
    let link = match connection.state {
        ConnectionState::Disconnected => "offline",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "live",
        ConnectionState::PermanentlyFailed => "failed",
    };
    let current = session.current_agent.as_deref().unwrap_or("-");
    format!(
        "[{:>3}%] {} {} | current: {current} | {link}",
        session.progress_percent(),
        session.ticker,
        session.analysis_date,
    )
}

fn print_summary(session: &Session) {
    if let Some(error) = &session.last_error {
        println!("analysis failed: {error}");
    }
    if let Some(decision) = &session.final_decision {
        println!("final decision: {decision}");
    }
    for (name, agent) in &session.agent_statuses {
        println!(
            "  {name}: {}",
            serde_json::to_string(&agent.status).unwrap_or_default()
        );
    }
}
