use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workerctl::{
    validate_for_connection, validate_for_creation, ApiResult, ChannelState, ClientConfig,
    RpcClient, StoreRegistry, WorkerConfig, WorkerState,
};

/// Drive a worker through its UI server and follow its state
#[derive(Debug, Parser)]
#[command(name = "workerctl", version)]
struct Cli {
    /// Worker UI server address, overrides WORKER_URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Route prefix, overrides WORKER_API_PREFIX
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the current worker state
    State,
    /// Create a new worker
    Start(WorkerArgs),
    /// Attach the worker to a manager
    Connect(WorkerArgs),
    /// Shut the worker down
    Shutdown,
    /// Detach the worker from its manager
    Disconnect,
    /// Print every state update until interrupted
    Watch,
}

#[derive(Debug, Args)]
struct WorkerArgs {
    #[arg(short, long)]
    name: String,

    #[arg(long)]
    id: Option<String>,

    /// Find the manager through zeroconf instead of an explicit address
    #[arg(short, long)]
    zeroconf: bool,

    /// Manager ip
    #[arg(long)]
    ip: Option<String>,

    /// Manager port
    #[arg(short, long)]
    port: Option<u16>,

    /// Remove the worker's temp folder on shutdown
    #[arg(short, long)]
    delete_temp: bool,

    /// Port the worker itself listens on, 0 picks one
    #[arg(long, default_value_t = 0)]
    wport: u16,

    /// Seconds to wait for the manager
    #[arg(short, long)]
    timeout: Option<u32>,
}

impl From<WorkerArgs> for WorkerConfig {
    fn from(args: WorkerArgs) -> Self {
        WorkerConfig {
            name: args.name,
            wport: args.wport,
            delete_temp: args.delete_temp,
            id: args.id,
            zeroconf: args.zeroconf,
            ip: args.ip,
            port: args.port,
            timeout: args.timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workerctl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env().context("invalid environment")?;
    if let Some(url) = cli.url.as_deref() {
        config = config.with_base_url(url).context("invalid --url")?;
    }
    if let Some(prefix) = cli.prefix.as_deref() {
        config = config.with_prefix(prefix);
    }

    let client = RpcClient::from_config(&config).context("failed to build http client")?;
    tracing::debug!("Worker RPC base {}", client.base());

    match cli.command {
        Command::State => match client.get_state().await.context("GET /state failed")? {
            Err(err) if err.is_no_worker() => {
                tracing::info!("No worker running");
                print_json(&serde_json::Value::Null)
            }
            result => report(result),
        },
        Command::Start(args) => {
            let worker = WorkerConfig::from(args);
            validate_for_creation(&worker).context("refusing to start worker")?;
            report(client.start(&worker).await.context("POST /start failed")?)
        }
        Command::Connect(args) => {
            let worker = WorkerConfig::from(args);
            validate_for_connection(&worker).context("refusing to connect worker")?;
            report(client.connect(&worker).await.context("POST /connect failed")?)
        }
        Command::Shutdown => report(client.shutdown().await.context("POST /shutdown failed")?),
        Command::Disconnect => {
            report(client.disconnect().await.context("POST /disconnect failed")?)
        }
        Command::Watch => watch(&config).await,
    }
}

fn report(result: ApiResult<WorkerState>) -> Result<()> {
    match result {
        Ok(state) => print_json(&state),
        Err(err) => {
            if let Some(detail) = &err.server_message {
                eprintln!("{}", detail);
            }
            Err(err).context("worker rejected the request")
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn watch(config: &ClientConfig) -> Result<()> {
    let registry = StoreRegistry::populate(config);
    let worker = registry.worker().context("worker store not registered")?;

    let _printer = worker.subscribe(|state: &Option<WorkerState>| match state {
        Some(state) => {
            if let Err(e) = print_json(state) {
                tracing::warn!("Failed to print worker state: {}", e);
            }
        }
        None => tracing::info!("No worker running"),
    });

    let mut connectivity = worker.watch_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connectivity.borrow();
                tracing::info!("Update channel {:?}", state);
                if state == ChannelState::Closed {
                    tracing::warn!("Gave up reconnecting to {}", config.updates_url());
                    break;
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    registry.close_all();
    Ok(())
}
