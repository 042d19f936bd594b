use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use unionchain_node::{settings, NodeService};
use unionchain_storage::Chain;

#[derive(Parser)]
#[clap(name = "unionchain-node")]
#[clap(author, version, about = "Unionchain - a small replicated ledger node", long_about = None)]
struct Cli {
    /// Listen address; must be a member of the static peer list.
    listen_addr: String,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop the last N blocks from the local chain and exit.
    Rollback {
        #[clap(default_value_t = settings::DEFAULT_ROLLBACK)]
        n: u64,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Rollback { n }) => rollback(&cli.listen_addr, n),
        None => run_node(&cli.listen_addr).await,
    }
}

async fn run_node(addr: &str) -> Result<()> {
    anyhow::ensure!(
        settings::LIST_ADDR.contains(&addr),
        "listen address {addr} is not a member of the peer list {:?}",
        settings::LIST_ADDR
    );

    let service = NodeService::start(&settings::chain_path(addr), addr, settings::peers_of(addr)).await?;
    info!("node running on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    drop(service);
    Ok(())
}

fn rollback(addr: &str, n: u64) -> Result<()> {
    let path = settings::chain_path(addr);
    anyhow::ensure!(std::path::Path::new(&path).exists(), "no chain at {path}");
    let chain = Chain::open(&path)?;

    if !chain.rollback(n) {
        anyhow::bail!("rollback of {n} blocks failed at height {}", chain.height());
    }
    info!("rolled back {n} blocks, height is now {}", chain.height());
    Ok(())
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
