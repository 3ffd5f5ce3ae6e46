//! DPYC Oracle Server
//!
//! Runs the oracle's tool surface as a standalone HTTP server.
//! Settings come from the environment (see `OracleConfig::from_env`);
//! command-line flags override them.

use anyhow::Result;
use clap::Parser;
use dpyc_oracle::config::OracleConfig;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dpyc-oracle")]
#[command(about = "DPYC Oracle - community concierge for the DPYC Honor Chain")]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "8080", env = "ORACLE_PORT")]
    port: u16,

    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "ORACLE_HOST")]
    host: String,

    /// Raw content root of the community registry
    #[arg(long)]
    base_url: Option<String>,

    /// Registry cache TTL in seconds
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Repository receiving membership commits
    #[arg(long)]
    repo: Option<String>,

    /// Branch membership commits land on
    #[arg(long)]
    branch: Option<String>,

    #[arg(long)]
    github_api_url: Option<String>,

    /// Citizenship challenge lifetime in seconds
    #[arg(long)]
    challenge_ttl: Option<u64>,
}

impl Args {
    /// Layer command-line overrides on top of an environment-derived config
    fn apply(self, mut config: OracleConfig) -> OracleConfig {
        if let Some(base_url) = self.base_url {
            config.community_base_url = base_url;
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache_ttl_secs = ttl;
        }
        if let Some(repo) = self.repo {
            config.community_repo = repo;
        }
        if let Some(branch) = self.branch {
            config.branch = branch;
        }
        if let Some(url) = self.github_api_url {
            config.github_api_url = url;
        }
        if let Some(ttl) = self.challenge_ttl {
            config.challenge_ttl_secs = ttl;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dpyc_oracle=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let args = Args::parse();
    let host = args.host.clone();
    let port = args.port;
    let config = args.apply(OracleConfig::from_env());

    info!("Starting DPYC Oracle");
    info!("  Cache TTL: {}s", config.cache_ttl_secs);
    info!("  Challenge TTL: {}s", config.challenge_ttl_secs);

    dpyc_oracle::run_server(config, &host, port).await
}
