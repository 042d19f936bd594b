//! Traffic generator: submits batches of random signed transactions to a
//! node over the client role, reporting the SetTX return codes.

use anyhow::Result;
use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};
use unionchain_core::Transaction;
use unionchain_crypto::Keypair;
use unionchain_network::{Client, Message, MSG_SET_TX};
use unionchain_node::handlers::decode_u64_body;

#[derive(Parser)]
#[clap(name = "txgen", about = "Submit random transactions to a unionchain node")]
struct Cli {
    /// Node address to submit to.
    addr: String,

    /// Transactions per batch.
    #[clap(long, default_value_t = 20)]
    batch: usize,

    /// Seconds between batches; 0 sends one batch and exits.
    #[clap(long, default_value_t = 3)]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    loop {
        let keypair = Keypair::generate();
        let mut client = Client::connect(&cli.addr).await?;
        let mut accepted = 0usize;

        for _ in 0..cli.batch {
            let payload: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(20)
                .map(char::from)
                .collect();
            let tx = Transaction::new(&keypair, payload.into_bytes())?;

            let resp = client.request(&Message::new(MSG_SET_TX, tx.to_bytes())).await?;
            match decode_u64_body(resp.body()) {
                Some(0) => accepted += 1,
                Some(code) => warn!("tx rejected with code {code}"),
                None => warn!("malformed SetTX response"),
            }
        }

        info!("submitted batch: {accepted}/{} accepted", cli.batch);

        if cli.interval == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_secs(cli.interval)).await;
    }

    Ok(())
}
