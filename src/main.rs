#![forbid(unsafe_code)]

//! `scanlink-agentd` — demo content-analysis agent binary.
//!
//! Binds the configured endpoint, feeds received requests through an
//! abortable queue into a worker pool, and answers each request with a
//! keyword verdict: `block` when the content contains the word "block",
//! `allow` otherwise. Runs until stdin reaches end-of-file.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use scanlink::agent::{Agent, Event};
use scanlink::queue::RequestQueue;
use scanlink::worker::{AnalysisHandler, WorkerPool};
use scanlink::{Config, LinkError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "scanlink-agentd", about = "Content-analysis demo agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured endpoint name.
    #[arg(long)]
    endpoint: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// Demo wire payload; the transport itself never interprets message bytes.
#[derive(Debug, Deserialize)]
struct InboundPayload {
    kind: String,
    token: Uuid,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tokens: Vec<Uuid>,
    #[serde(default)]
    resource: Option<i64>,
}

/// Answers each request with the demo keyword verdict.
struct KeywordHandler;

impl AnalysisHandler for KeywordHandler {
    fn on_analysis_requested(&self, event: Event) -> Result<()> {
        let payload: InboundPayload = serde_json::from_slice(event.payload())
            .map_err(|err| LinkError::Protocol(format!("undecodable payload: {err}")))?;

        match payload.kind.as_str() {
            "request" => {
                let content = payload.content.unwrap_or_default();
                let verdict = if content.contains("block") {
                    "block"
                } else {
                    "allow"
                };
                if let Some(resource) = payload.resource {
                    info!(token = %payload.token, resource, "request references a shared resource handle");
                }
                info!(token = %payload.token, verdict, "request analyzed");
                let response = serde_json::to_vec(&json!({
                    "kind": "response",
                    "token": payload.token,
                    "verdict": verdict,
                }))
                .map_err(|err| LinkError::Protocol(format!("encode response: {err}")))?;
                event.respond(&response)
            }
            "ack" => {
                info!(token = %payload.token, "response acknowledged");
                Ok(())
            }
            "cancel" => {
                info!(token = %payload.token, count = payload.tokens.len(), "cancel received");
                Ok(())
            }
            other => {
                warn!(kind = other, "unknown payload kind ignored");
                Ok(())
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("scanlink-agentd bootstrap");
    run(&args)
}

fn run(args: &Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = if let Some(path) = &args.config {
        Config::load_from_path(path)?
    } else {
        Config::default()
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint.clone_from(endpoint);
    }

    // ── Bind endpoint, start workers ────────────────────
    let agent = Arc::new(Agent::bind(&config)?);
    let queue = Arc::new(RequestQueue::new());
    let pool = WorkerPool::start(
        config.worker_threads,
        Arc::clone(&queue),
        Arc::new(KeywordHandler),
    )?;

    let acceptor = {
        let agent = Arc::clone(&agent);
        let queue = Arc::clone(&queue);
        thread::Builder::new()
            .name("scanlink-accept".into())
            .spawn(move || {
                if let Err(err) = agent.handle_events(queue) {
                    error!(%err, "event loop failed");
                }
            })
            .map_err(|err| LinkError::Io(format!("spawn acceptor: {err}")))?
    };

    info!(
        endpoint = %config.endpoint,
        workers = config.worker_threads,
        "agent running; close stdin to stop"
    );

    // ── Wait for shutdown ───────────────────────────────
    wait_for_stdin_eof();
    info!("shutdown requested");

    // Queue abort and endpoint stop are independent teardown paths; both
    // must run before the joins below can complete.
    queue.abort();
    agent.stop();
    if acceptor.join().is_err() {
        warn!("acceptor thread panicked");
    }
    pool.join();
    info!("scanlink-agentd shut down");

    Ok(())
}

fn wait_for_stdin_eof() {
    let stdin = io::stdin();
    if let Err(err) = io::copy(&mut stdin.lock(), &mut io::sink()) {
        warn!(%err, "stdin watch failed");
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| LinkError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| LinkError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
