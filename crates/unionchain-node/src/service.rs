use crate::consensus;
use crate::handlers::{self, ChainState};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use unionchain_network::Node;

/// A running node: bootstrapped chain, gossip layer, listener and the
/// consensus timer.
pub struct NodeService {
    pub node: Arc<Node>,
    pub state: Arc<ChainState>,
    listener: JoinHandle<()>,
    timer: JoinHandle<()>,
}

impl NodeService {
    /// Bring a node up: sync the chain from the first reachable peer,
    /// register the dispatch table, dial the peers, start listening and
    /// start the timer. Returns once the node is serving.
    pub async fn start(path: &str, listen_addr: &str, peers: Vec<String>) -> anyhow::Result<Self> {
        let (chain, seeded_time) = consensus::bootstrap_chain(path, &peers).await?;
        info!(
            "chain ready at height {} (clock seeded to {seeded_time})",
            chain.height()
        );

        let state = Arc::new(ChainState {
            chain,
            current_time: AtomicU64::new(seeded_time),
        });

        let node = Node::new();
        handlers::register(&node, state.clone());

        for addr in &peers {
            match node.connect(addr).await {
                Ok(_) => info!("connected to peer {addr}"),
                Err(e) => warn!("peer {addr} unreachable: {e}"),
            }
        }

        let listener = {
            let node = node.clone();
            let addr = listen_addr.to_string();
            tokio::spawn(async move {
                if let Err(e) = node.listen(&addr).await {
                    error!("listener failed: {e}");
                }
            })
        };

        let timer = {
            let node = node.clone();
            let state = state.clone();
            tokio::spawn(consensus::run_timer(node, state, peers))
        };

        Ok(Self {
            node,
            state,
            listener,
            timer,
        })
    }
}

impl Drop for NodeService {
    fn drop(&mut self) {
        self.listener.abort();
        self.timer.abort();
    }
}
