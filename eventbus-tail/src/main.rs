//! eventbus-tail - print an event stream to stdout, one line per event.
//!
//! Usage: eventbus-tail [--newest] [--redis <url>] [--prefix <name>] [--json]
//!
//! Connection settings come from EVENTBUS_ENDPOINT, EVENTBUS_TOKEN,
//! EVENTBUS_STREAM, EVENTBUS_CLIENT and (optional) EVENTBUS_VERSION.
//! Output lines are `<partition>\t<offset>\t<body json>`.

mod telemetry;

use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;

use eventbus::{
    CheckpointStore, ClientConfig, Eventbus, HandlerError, MemoryCheckpointStore, Shutdown,
    StartPosition, StreamMessage,
};
use eventbus_ws::WsConnector;
use tracing::{error, info};

use crate::telemetry::{init_tracing, TracingConfig};

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    newest: bool,
    redis: Option<String>,
    prefix: Option<String>,
    json: bool,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--newest" | "-n" => parsed.newest = true,
            "--json" => parsed.json = true,
            "--redis" => {
                let url = iter.next().ok_or("--redis needs a url")?;
                parsed.redis = Some(url.clone());
            }
            "--prefix" => {
                let prefix = iter.next().ok_or("--prefix needs a name")?;
                parsed.prefix = Some(prefix.clone());
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(parsed)
}

fn usage() {
    eprintln!("eventbus-tail");
    eprintln!("=============");
    eprintln!("Usage: eventbus-tail [--newest] [--redis <url>] [--prefix <name>] [--json]");
    eprintln!();
    eprintln!("Env: EVENTBUS_ENDPOINT EVENTBUS_TOKEN EVENTBUS_STREAM EVENTBUS_CLIENT [EVENTBUS_VERSION]");
    eprintln!("Checkpoints are kept in memory unless --redis is given (key <prefix>:offsets,");
    eprintln!("prefix defaults to EVENTBUS_CLIENT).");
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        usage();
        return ExitCode::SUCCESS;
    }
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            usage();
            return ExitCode::from(2);
        }
    };

    let tracing_config = TracingConfig::default();
    init_tracing(&if args.json {
        tracing_config.with_json()
    } else {
        tracing_config
    });

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "eventbus-tail stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = ClientConfig::from_env()?;
    let start = if args.newest {
        StartPosition::Newest
    } else {
        StartPosition::Oldest
    };

    let shutdown = Shutdown::new();
    let s = shutdown.clone();
    ctrlc::set_handler(move || s.request())?;

    match args.redis {
        Some(url) => {
            let prefix = args.prefix.unwrap_or_else(|| config.client.clone());
            tail(config, redis_store(&url, &prefix)?, start, shutdown)
        }
        None => tail(config, MemoryCheckpointStore::new(), start, shutdown),
    }
}

#[cfg(feature = "redis")]
fn redis_store(url: &str, prefix: &str) -> Result<impl CheckpointStore + 'static, Box<dyn Error>> {
    use eventbus::checkpoint::{KeyValueCheckpointStore, RedisCommands};

    info!(url, prefix, "checkpointing to redis");
    Ok(KeyValueCheckpointStore::new(prefix, RedisCommands::open(url)?))
}

#[cfg(not(feature = "redis"))]
fn redis_store(url: &str, _prefix: &str) -> Result<MemoryCheckpointStore, Box<dyn Error>> {
    Err(format!("--redis {url}: built without the redis feature").into())
}

fn tail<S>(
    config: ClientConfig,
    store: S,
    start: StartPosition,
    shutdown: Shutdown,
) -> Result<(), Box<dyn Error>>
where
    S: CheckpointStore + 'static,
{
    info!(endpoint = %config.endpoint, stream = %config.stream, ?start, "tailing");
    let handle = Eventbus::builder(config, WsConnector::new(), store, print_message)
        .start_at(start)
        .shutdown(shutdown)
        .build()
        .run()?;
    handle.wait()?;
    Ok(())
}

fn print_message(message: StreamMessage) -> Result<(), HandlerError> {
    let mut out = io::stdout().lock();
    write!(out, "{}\t{}\t", message.partition, message.offset)?;
    out.write_all(message.body())?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
