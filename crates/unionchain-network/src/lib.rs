//! Peer coordination for unionchain: the length-prefixed JSON frame codec,
//! the gossip node with deduplicated broadcast and handler dispatch, and the
//! transient request/response client.

pub mod client;
pub mod codec;
pub mod dedup;
pub mod error;
pub mod message;
pub mod node;
pub mod settings;

pub use client::Client;
pub use dedup::SeenFilter;
pub use error::{NetworkError, Result};
pub use message::{
    frame_hash, Message, MASK_BIT, MSG_GET_BLOCK, MSG_GET_HEIGHT, MSG_GET_TIME, MSG_GET_TX,
    MSG_SET_BLOCK, MSG_SET_TX, NETWORK_TAG,
};
pub use node::{Conn, Handler, Node};
