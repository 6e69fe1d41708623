#![recursion_limit = "256"]

mod command;
mod config;
mod event;
mod host;
mod mcp;
mod notation;
mod project;
mod transform;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use parking_lot::{Mutex, RwLock};

use command::CommandSource;
use config::{EngineConfig, DEFAULT_HOLDING_OFFSET, MAX_SLICES, MAX_SPLIT_FRAGMENTS};
use event::EventLog;
use host::{JournaledHost, Session};
use mcp::{run_as_proxy, serve_stdio, start_socket_server, ClipwrightMcp, SOCKET_PATH};
use notation::TimeSignature;
use transform::{transform_clips, TransformParams};

/// Clipwright - arrangement clip transforms for DAW timelines
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session file to load on startup
    #[arg(long)]
    session: Option<PathBuf>,

    /// Run one transform (JSON parameters) against --session and print the result
    #[arg(long)]
    transform: Option<String>,

    /// Where to save the session after --transform
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve MCP on a Unix socket instead of stdio
    #[arg(long)]
    listen: bool,

    /// Forward stdio JSON-RPC to a server already listening on the socket
    #[arg(long)]
    proxy: bool,

    /// Unix socket path for --listen and --proxy
    #[arg(long, default_value = SOCKET_PATH)]
    socket: PathBuf,

    /// Start of the holding area in beats; must lie past all musical content
    #[arg(long, default_value_t = DEFAULT_HOLDING_OFFSET)]
    holding_offset: f64,

    /// Most clips a single slice request may create
    #[arg(long, default_value_t = MAX_SLICES)]
    max_slices: usize,

    /// Most fragments a single split request may create
    #[arg(long, default_value_t = MAX_SPLIT_FRAGMENTS)]
    max_split_fragments: usize,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        if !(self.holding_offset > 0.0) || !self.holding_offset.is_finite() {
            bail!("--holding-offset must be a positive number of beats");
        }
        if self.max_slices == 0 {
            bail!("--max-slices must be at least 1");
        }
        if self.max_split_fragments == 0 {
            bail!("--max-split-fragments must be at least 1");
        }
        Ok(EngineConfig {
            max_slices: self.max_slices,
            max_split_fragments: self.max_split_fragments,
            ..EngineConfig::with_holding_offset(self.holding_offset)
        })
    }

    fn load_session(&self) -> Result<Session> {
        match &self.session {
            Some(path) => project::load_session(path),
            None => Ok(Session::new(TimeSignature::default())),
        }
    }
}

/// One-shot transform from the command line
fn run_once(args: &Args, params_json: &str, config: &EngineConfig) -> Result<()> {
    if args.session.is_none() {
        bail!("--transform needs a --session file to work on");
    }
    let params: TransformParams =
        serde_json::from_str(params_json).context("Failed to parse --transform parameters")?;
    let mut session = args.load_session()?;
    let log = RwLock::new(EventLog::new());

    let result = {
        let mut host = JournaledHost::new(&mut session, &log, CommandSource::Cli);
        transform_clips(&params, &mut host, config)?
    };
    info!("{} host calls made", log.read().len());
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(output) = &args.output {
        project::save_session(&session, output)?;
        info!("saved session to {}", output.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    // stdout carries JSON-RPC, so logs go to stderr
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    // Proxy mode: requires a server started with --listen
    if args.proxy {
        if let Err(e) = run_as_proxy(&args.socket) {
            // Write a JSON-RPC error to stdout so MCP clients see a clear message
            let msg = format!(
                "clipwright is not listening on {}. Start it first with: clipwright --listen ({})",
                args.socket.display(),
                e
            );
            let err_response = serde_json::json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {
                    "code": -32000,
                    "message": msg
                }
            });
            println!("{}", err_response);
            return Err(anyhow::anyhow!("{}", msg));
        }
        return Ok(());
    }

    let config = args.engine_config()?;

    if let Some(params) = &args.transform {
        return run_once(&args, params, &config);
    }

    let session = args.load_session()?;
    let mcp = Arc::new(ClipwrightMcp::new(
        Arc::new(Mutex::new(session)),
        Arc::new(RwLock::new(EventLog::new())),
        config,
    ));

    if args.listen {
        let shutdown = Arc::new(AtomicBool::new(false));
        let server = start_socket_server(mcp, &args.socket, shutdown)?;
        server
            .join()
            .map_err(|_| anyhow::anyhow!("socket server thread panicked"))?;
        return Ok(());
    }

    info!("serving MCP on stdio");
    serve_stdio(&mcp)
}
