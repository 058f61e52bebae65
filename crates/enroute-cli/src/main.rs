mod cmd;
mod output;
mod root;
mod session;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "enroute",
    about = "Keep a local store of airports and inbound flights in sync with a flight-data provider",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .enroute/)
    #[arg(long, global = true, env = "ENROUTE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Keep everything in memory instead of the on-disk store
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .enroute/config.yaml with defaults
    Init,

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Look up an airport, creating and fetching it on first use
    Airport {
        /// Airport code (e.g. KSFO)
        code: String,

        /// Seconds to wait for metadata on a first lookup (0 = don't wait)
        #[arg(long, default_value = "10")]
        wait: u64,

        /// Fetch metadata again even if the airport is already stored
        #[arg(long)]
        refresh: bool,
    },

    /// List stored airports ordered by location
    Airports,

    /// Poll inbound flights for an airport until Ctrl-C
    Watch {
        /// Airport codes; polling starts on the first
        #[arg(required = true)]
        codes: Vec<String>,

        /// Rotate the polled airport through CODES every N seconds
        #[arg(long, value_name = "SECS")]
        switch_every: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Watch { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Airport {
            code,
            wait,
            refresh,
        } => cmd::airport::show(&root, &code, wait, refresh, cli.ephemeral, cli.json),
        Commands::Airports => cmd::airport::list(&root, cli.ephemeral, cli.json),
        Commands::Watch {
            codes,
            switch_every,
        } => cmd::watch::run(&root, &codes, switch_every, cli.ephemeral, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
