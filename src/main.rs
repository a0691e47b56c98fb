use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use vergo_ratelimit::config::{LoggingConfig, VergoConfig};
use vergo_ratelimit::ratelimit::{AdmissionControl, FixedWindowLimiter, RateLimitDecision};

/// Replay admission decisions for keys read from stdin.
///
/// Each input line is `<key> [max_requests]`; each output line is the JSON
/// decision for that key.
#[derive(Parser, Debug)]
#[command(name = "vergo-ratelimit", version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Limit for lines that do not name one
    #[arg(short, long)]
    max_requests: Option<u32>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Serialize)]
struct DecisionLine<'a> {
    key: &'a str,
    #[serde(flatten)]
    decision: RateLimitDecision,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = VergoConfig::load(args.config.as_deref())?;
    if args.json_logs {
        config.logging.json = true;
    }
    init_tracing(&config.logging);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        window_ms = config.rate_limiting.window_ms,
        default_max_requests = config.rate_limiting.default_max_requests,
        "Configuration loaded"
    );

    let limiter = Arc::new(FixedWindowLimiter::with_settings(config.limiter_settings()));

    tokio::select! {
        result = replay(limiter, args.max_requests) => result?,
        _ = shutdown_signal() => {}
    }

    info!("Replay stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Decisions go to stdout, so logs stay on stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn replay<A: AdmissionControl>(limiter: Arc<A>, default_max: Option<u32>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let Some((key, max_requests)) = parse_line(&line) else {
            continue;
        };

        let decision = limiter.check(key, max_requests.or(default_max));
        debug!(key = %key, allowed = decision.allowed, "Replayed check");

        let mut out = serde_json::to_vec(&DecisionLine { key, decision })?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
    }

    stdout.flush().await?;
    Ok(())
}

/// Split `<key> [max_requests]`. Blank lines and `#` comments yield `None`.
fn parse_line(line: &str) -> Option<(&str, Option<u32>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.split_whitespace();
    let key = parts.next()?;
    let max_requests = parts.next().and_then(|m| m.parse().ok());
    Some((key, max_requests))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping replay");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping replay");
        }
    }
}
