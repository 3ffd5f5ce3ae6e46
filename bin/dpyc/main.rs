//! dpyc - client companion for the DPYC Oracle
//!
//! Generates Nostr identities, signs citizenship challenges and calls
//! oracle tools over HTTP.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use output::Tone;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dpyc", about = "DPYC Honor Chain command line client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new Nostr keypair
    Keygen,

    /// Sign the citizenship challenge for a nonce
    Sign {
        /// Secret key (bech32 nsec)
        #[arg(long, env = "DPYC_NSEC", hide_env_values = true)]
        nsec: String,

        /// Nonce returned by request_citizenship
        #[arg(long)]
        nonce: String,

        /// Print only the event JSON
        #[arg(short, long)]
        quiet: bool,
    },

    /// Invoke a tool on a running oracle
    Call {
        /// Tool name, e.g. lookup_member
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Oracle base URL
        #[arg(long, default_value = "http://localhost:8080", env = "DPYC_ORACLE_URL")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::status(Tone::Fail, &format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Keygen => commands::keygen::run(),
        Command::Sign { nsec, nonce, quiet } => commands::sign::run(&nsec, &nonce, quiet),
        Command::Call { tool, args, url } => commands::call::run(&url, &tool, args).await,
    }
}
