use rand::RngCore;
use serde::{Deserialize, Serialize};
use unionchain_core::hex_serde;
use unionchain_crypto::{sha256, Hash};

pub const MSG_GET_TIME: u32 = 0x01;
pub const MSG_GET_HEIGHT: u32 = 0x02;
pub const MSG_GET_BLOCK: u32 = 0x03;
pub const MSG_SET_BLOCK: u32 = 0x04;
pub const MSG_GET_TX: u32 = 0x05;
pub const MSG_SET_TX: u32 = 0x06;

/// High bit marking a response frame.
pub const MASK_BIT: u32 = 1 << 31;

/// Frames carrying any other tag are dropped at the codec.
pub const NETWORK_TAG: &str = "union-network";

/// Wire envelope: a type tag, an opaque body, a random nonce (so identical
/// bodies still produce distinct frames for gossip dedup) and the network tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    head: u32,
    #[serde(with = "hex_serde::bytes")]
    body: Vec<u8>,
    #[serde(with = "hex_serde::array")]
    nonce: [u8; 16],
    network: String,
}

impl Message {
    pub fn new(head: u32, body: Vec<u8>) -> Self {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self {
            head,
            body,
            nonce,
            network: NETWORK_TAG.to_string(),
        }
    }

    /// A response to a request with the given head.
    pub fn response(head: u32, body: Vec<u8>) -> Self {
        Self::new(head | MASK_BIT, body)
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn is_response(&self) -> bool {
        self.head & MASK_BIT != 0
    }

    /// Serialized frame: u64 big-endian length, then the JSON bytes.
    pub fn to_frame(&self) -> Vec<u8> {
        // A struct of hex strings cannot fail to encode.
        let json = serde_json::to_vec(self).expect("message JSON encoding");
        let mut frame = Vec::with_capacity(8 + json.len());
        frame.extend_from_slice(&(json.len() as u64).to_be_bytes());
        frame.extend_from_slice(&json);
        frame
    }
}

/// Gossip dedup key of a serialized frame.
pub fn frame_hash(frame: &[u8]) -> Hash {
    sha256(frame)
}
