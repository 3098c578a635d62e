#![forbid(unsafe_code)]

//! `scanlink-scan` — CLI companion for a running `scanlink-agentd`.
//!
//! Connects to the agent endpoint and drives the three client operations:
//! send a request (optionally sharing an open file's handle), acknowledge a
//! response, and cancel in-flight requests.

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use scanlink::client::Client;
use scanlink::share::RawResource;
use scanlink::{Config, LinkError};

#[derive(Debug, Parser)]
#[command(
    name = "scanlink-scan",
    about = "CLI client for a scanlink analysis agent",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Endpoint name (must match the agent's `endpoint` config).
    #[arg(long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Resolve the effective transport configuration.
    ///
    /// `--config` supplies the TOML file; `--endpoint` overrides the
    /// endpoint name either way.
    fn effective_config(&self) -> scanlink::Result<Config> {
        let mut config = if let Some(path) = &self.config {
            Config::load_from_path(path)?
        } else {
            Config::default()
        };
        if let Some(endpoint) = &self.endpoint {
            config.endpoint.clone_from(endpoint);
        }
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one analysis request and print the verdict.
    Send {
        /// Text content to analyze.
        #[arg(long)]
        content: String,

        /// Share this file's open handle with the agent alongside the
        /// request.
        #[arg(long)]
        share: Option<PathBuf>,
    },

    /// Acknowledge a previously received response.
    Ack {
        /// Token of the response being acknowledged.
        token: Uuid,
    },

    /// Ask the agent to abandon in-flight requests.
    Cancel {
        /// Tokens of the requests to abandon.
        #[arg(required = true)]
        tokens: Vec<Uuid>,
    },
}

/// Verdict half of the demo wire schema.
#[derive(Debug, Deserialize)]
struct ResponsePayload {
    token: Uuid,
    verdict: String,
}

fn main() {
    let args = Cli::parse();

    let config = match args.effective_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let endpoint = config.endpoint.clone();
    let mut client = match Client::connect(config) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("Failed to connect to agent: {err}");
            eprintln!("Is scanlink-agentd running on endpoint '{endpoint}'?");
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(&mut client, args.command) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run_command(client: &mut Client, command: Command) -> scanlink::Result<()> {
    match command {
        Command::Send { content, share } => send_request(client, &content, share.as_deref()),
        Command::Ack { token } => {
            let payload = encode(&json!({ "kind": "ack", "token": token }))?;
            client.acknowledge(&payload)?;
            println!("acknowledged {token}");
            Ok(())
        }
        Command::Cancel { tokens } => {
            let count = tokens.len();
            let payload = encode(&json!({
                "kind": "cancel",
                "token": Uuid::new_v4(),
                "tokens": tokens,
            }))?;
            client.cancel_requests(&payload)?;
            println!("cancel issued for {count} request(s)");
            Ok(())
        }
    }
}

fn send_request(client: &mut Client, content: &str, share: Option<&Path>) -> scanlink::Result<()> {
    let token = Uuid::new_v4();
    let mut request = json!({ "kind": "request", "token": token, "content": content });

    // Held open until the exchange completes so the descriptor stays valid.
    let mut shared_file = None;
    if let Some(path) = share {
        let file = File::open(path)
            .map_err(|err| LinkError::Io(format!("open {}: {err}", path.display())))?;
        if let Some(handle) = client.share_resource(raw_resource(&file)) {
            request["resource"] = json!(handle);
        } else {
            eprintln!("warning: could not share {} with the agent", path.display());
        }
        shared_file = Some(file);
    }

    let payload = encode(&request)?;
    let raw = client.send(&payload)?;
    drop(shared_file);

    let response: ResponsePayload = serde_json::from_slice(&raw)
        .map_err(|err| LinkError::Protocol(format!("undecodable response: {err}")))?;
    if response.token != token {
        return Err(LinkError::Protocol(format!(
            "response token {} does not match request {token}",
            response.token
        )));
    }
    println!("token {token}: verdict {}", response.verdict);
    Ok(())
}

fn encode(value: &serde_json::Value) -> scanlink::Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| LinkError::Protocol(format!("encode payload: {err}")))
}

#[cfg(unix)]
fn raw_resource(file: &File) -> RawResource {
    use std::os::fd::AsRawFd;
    file.as_raw_fd()
}

#[cfg(windows)]
fn raw_resource(file: &File) -> RawResource {
    use std::os::windows::io::AsRawHandle;
    file.as_raw_handle()
}
