use crate::codec::read_frame;
use crate::dedup::SeenFilter;
use crate::message::{frame_hash, Message};
use crate::settings::{IS_CLIENT, IS_NODE, MAPPING_SIZE, MAX_CONN, RETRY_LIMIT, TIME_LIMIT};
use crate::{NetworkError, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Handler invoked for one dispatched frame. Returns whether the frame was
/// handled; rejections count toward the connection's retry budget.
pub type Handler = Arc<dyn Fn(Arc<Node>, Conn, Message) -> BoxFuture<'static, bool> + Send + Sync>;

/// Shared write half of one connection, used for responses and broadcasts.
#[derive(Clone)]
pub struct Conn {
    id: u64,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
}

impl Conn {
    /// Write one frame to this connection.
    pub async fn send(&self, msg: &Message) -> Result<()> {
        self.send_frame(&msg.to_frame()).await
    }

    async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        self.writer.lock().await.write_all(frame).await?;
        Ok(())
    }
}

struct NodeData {
    peers: HashMap<u64, Conn>,
    handlers: HashMap<u32, Handler>,
    seen: SeenFilter,
}

/// Gossip node: accepts peer and client connections, deduplicates incoming
/// frames by hash and dispatches them to registered handlers.
///
/// Two locks: the data mutex guards the peer map, dispatch table and dedup
/// set (never held across await); the dispatch mutex serializes handler
/// bodies with each other and with the consensus tick.
pub struct Node {
    data: Mutex<NodeData>,
    dispatch: tokio::sync::Mutex<()>,
    next_conn_id: AtomicU64,
}

impl Node {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(NodeData {
                peers: HashMap::new(),
                handlers: HashMap::new(),
                seen: SeenFilter::new(MAPPING_SIZE),
            }),
            dispatch: tokio::sync::Mutex::new(()),
            next_conn_id: AtomicU64::new(0),
        })
    }

    /// Register the handler for a message head. Returns the node for
    /// chaining; registration happens before the node starts serving.
    pub fn handle(self: &Arc<Self>, head: u32, handler: Handler) -> Arc<Self> {
        self.data.lock().handlers.insert(head, handler);
        self.clone()
    }

    pub fn peer_count(&self) -> usize {
        self.data.lock().peers.len()
    }

    /// Serialize once, mark the frame seen, and fan it out to every peer on
    /// its own task. Never blocks the caller on peer IO.
    pub fn broadcast(&self, msg: &Message) {
        let frame = Arc::new(msg.to_frame());
        let peers: Vec<Conn> = {
            let mut data = self.data.lock();
            data.seen.insert(frame_hash(&frame));
            data.peers.values().cloned().collect()
        };

        for conn in peers {
            let frame = frame.clone();
            tokio::spawn(async move {
                if let Err(e) = conn.send_frame(&frame).await {
                    debug!("broadcast write failed: {e}");
                }
            });
        }
    }

    /// Accept loop. The first byte selects the role: node peers join the
    /// gossip set, clients are served without joining, anything else drops.
    pub async fn listen(self: Arc<Self>, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {addr}");

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            if self.peer_count() >= MAX_CONN {
                warn!("connection limit reached, dropping {peer_addr}");
                continue;
            }

            let node = self.clone();
            tokio::spawn(async move {
                node.accept_conn(stream).await;
            });
        }
    }

    async fn accept_conn(self: Arc<Self>, mut stream: TcpStream) {
        let mut role = [0u8; 1];
        match timeout(TIME_LIMIT, stream.read_exact(&mut role)).await {
            Ok(Ok(_)) => {}
            _ => return,
        }

        match role[0] {
            IS_NODE => {
                let (reader, conn) = self.register(stream);
                self.read_loop(reader, conn, true).await;
            }
            IS_CLIENT => {
                let (reader, writer) = stream.into_split();
                let conn = Conn {
                    id: self.next_conn_id.fetch_add(1, Ordering::Relaxed),
                    writer: Arc::new(tokio::sync::Mutex::new(writer)),
                };
                self.read_loop(reader, conn, false).await;
            }
            other => debug!("dropping connection with unknown role byte {other:#x}"),
        }
    }

    /// Dial a peer (node role) and join it to the gossip set.
    pub async fn connect(self: &Arc<Self>, addr: &str) -> Result<Conn> {
        if self.peer_count() >= MAX_CONN {
            return Err(NetworkError::ConnLimit);
        }

        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(&[IS_NODE]).await?;

        let (reader, conn) = self.register(stream);
        let node = self.clone();
        let loop_conn = conn.clone();
        tokio::spawn(async move {
            node.read_loop(reader, loop_conn, true).await;
        });

        Ok(conn)
    }

    fn register(&self, stream: TcpStream) -> (OwnedReadHalf, Conn) {
        let (reader, writer) = stream.into_split();
        let conn = Conn {
            id: self.next_conn_id.fetch_add(1, Ordering::Relaxed),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
        };
        self.data.lock().peers.insert(conn.id, conn.clone());
        (reader, conn)
    }

    /// Per-connection read loop: frames are dispatched in order received;
    /// duplicates are skipped; RETRY_LIMIT consecutive failures close the
    /// connection, as does any IO error or deadline miss.
    async fn read_loop(self: Arc<Self>, mut reader: OwnedReadHalf, conn: Conn, is_peer: bool) {
        let mut failures = 0u32;

        while failures < RETRY_LIMIT {
            let (msg, hash) = match read_frame(&mut reader).await {
                Ok(frame) => frame,
                Err(e) if e.closes_connection() => {
                    debug!("closing connection: {e}");
                    break;
                }
                Err(e) => {
                    debug!("dropping frame: {e}");
                    failures += 1;
                    continue;
                }
            };

            let handler = {
                let mut data = self.data.lock();
                if !data.seen.insert(hash) {
                    continue;
                }
                data.handlers.get(&msg.head()).cloned()
            };

            let Some(handler) = handler else {
                debug!("unknown message head {:#x}", msg.head());
                failures += 1;
                continue;
            };

            let handled = {
                let _guard = self.dispatch.lock().await;
                handler(self.clone(), conn.clone(), msg).await
            };

            if handled {
                failures = 0;
            } else {
                failures += 1;
            }
        }

        if is_peer {
            self.data.lock().peers.remove(&conn.id);
        }
    }

    /// Take the dispatch lock from outside the read loops; the consensus
    /// tick holds it so commit/produce rounds never race a handler.
    pub async fn lock_dispatch(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.dispatch.lock().await
    }
}
