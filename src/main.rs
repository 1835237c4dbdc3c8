use clap::Parser;
use std::path::PathBuf;
use stronglink::http::server;
use stronglink::{RepoConfig, Repository};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sln-server", about = "Content-addressed document repository")]
struct Cli {
    /// Path to a TOML config file. Defaults are used for anything it omits.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = RepoConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let repo = Repository::open(&config)?;
    tracing::info!(port = config.port, repo_dir = %config.repo_dir.display(), "starting sln-server");

    server::run(repo, config.port, config.connection_timeout_secs, config.cookie_ttl_secs).await
}
