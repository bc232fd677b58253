use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Progressive structured streaming server
#[derive(Parser)]
#[command(name = "trickle")]
#[command(about = "Stream typed records out of an LLM completion before it finishes", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the streaming HTTP server (default command)
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,tower=debug", // -vvv shows everything including dependencies
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(cli.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(cli.verbose >= 3) // Show line numbers for -vvv
        .init();

    debug!("trickle started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Some(Commands::Serve { host, port, config }) => run_serve(host, port, config).await,
        None => run_serve(None, None, None).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = trickle::config::Config::load(config_path.as_deref())?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let producer = Arc::new(trickle::producer::HttpProducer::new(
        config.upstream.endpoint.clone(),
        config.upstream.api_key.clone(),
        config.upstream.max_connect_retries,
        config.upstream.retry_delay_ms,
    )?);

    let registry = trickle::registry::PromptRegistry::builtin();
    let server = trickle::server::StreamServer::new(config, registry, producer);
    server.start().await
}
