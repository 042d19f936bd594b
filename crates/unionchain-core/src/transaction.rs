use crate::constants::PAYLOAD_SIZE;
use crate::{hex_serde, CoreError, Hash, Result};
use serde::{Deserialize, Serialize};
use unionchain_crypto::{sha256_pair, verify_signature, Keypair};

/// Signed transaction with a canonical hash.
///
/// `hash = SHA256(validator || payload)` and `signature` is the validator's
/// signature over that hash. Instances are immutable once constructed; every
/// load path re-checks validity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "hex_serde::bytes")]
    payload: Vec<u8>,
    #[serde(with = "hex_serde::array")]
    validator: [u8; 32],
    #[serde(with = "hex_serde::array")]
    hash: Hash,
    #[serde(with = "hex_serde::bytes")]
    signature: Vec<u8>,
}

impl Transaction {
    /// Create and sign a new transaction. Fails if the payload exceeds
    /// [`PAYLOAD_SIZE`].
    pub fn new(keypair: &Keypair, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > PAYLOAD_SIZE {
            return Err(CoreError::PayloadTooLarge {
                got: payload.len(),
                max: PAYLOAD_SIZE,
            });
        }

        let validator = keypair.public_bytes();
        let hash = sha256_pair(&validator, &payload);
        let signature = keypair.sign(&hash);

        Ok(Self {
            payload,
            validator,
            hash,
            signature,
        })
    }

    /// Parse a transaction from its canonical bytes, rejecting invalid ones.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let tx: Self = serde_json::from_slice(bytes)?;
        if !tx.is_valid() {
            return Err(CoreError::InvalidTransaction);
        }
        Ok(tx)
    }

    /// Canonical serialization, identical on disk and on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        // A struct of hex strings cannot fail to encode.
        serde_json::to_vec(self).expect("transaction JSON encoding")
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn validator(&self) -> &[u8; 32] {
        &self.validator
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// A transaction is valid iff its recomputed hash matches the stored hash
    /// and the signature verifies under the validator key.
    pub fn is_valid(&self) -> bool {
        if self.hash != sha256_pair(&self.validator, &self.payload) {
            return false;
        }
        verify_signature(&self.validator, &self.hash, &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_transaction_is_valid() {
        let keypair = Keypair::generate();
        let tx = Transaction::new(&keypair, b"payload".to_vec()).unwrap();
        assert!(tx.is_valid());
        assert_eq!(tx.payload(), b"payload");
        assert_eq!(tx.validator(), &keypair.public_bytes());
    }

    #[test]
    fn test_payload_too_large() {
        let keypair = Keypair::generate();
        let result = Transaction::new(&keypair, vec![0u8; PAYLOAD_SIZE + 1]);
        assert!(matches!(result, Err(CoreError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_max_payload_accepted() {
        let keypair = Keypair::generate();
        let tx = Transaction::new(&keypair, vec![0u8; PAYLOAD_SIZE]).unwrap();
        assert!(tx.is_valid());
    }

    #[test]
    fn test_load_roundtrip() {
        let keypair = Keypair::generate();
        let tx = Transaction::new(&keypair, b"roundtrip".to_vec()).unwrap();
        let loaded = Transaction::load(&tx.to_bytes()).unwrap();
        assert_eq!(tx, loaded);
    }

    #[test]
    fn test_load_rejects_tampered_payload() {
        let keypair = Keypair::generate();
        let tx = Transaction::new(&keypair, b"aaaa".to_vec()).unwrap();
        let tampered = String::from_utf8(tx.to_bytes())
            .unwrap()
            .replace(&hex::encode(b"aaaa"), &hex::encode(b"bbbb"));
        assert!(Transaction::load(tampered.as_bytes()).is_err());
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(Transaction::load(b"not json").is_err());
    }

    #[test]
    fn test_signature_from_other_key_is_invalid() {
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let tx = Transaction::new(&keypair, b"x".to_vec()).unwrap();

        let mut forged = tx.clone();
        forged.signature = other.sign(tx.hash());
        assert!(!forged.is_valid());
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..PAYLOAD_SIZE)) {
            let keypair = Keypair::generate();
            let tx = Transaction::new(&keypair, payload).unwrap();
            let loaded = Transaction::load(&tx.to_bytes()).unwrap();
            prop_assert_eq!(tx, loaded);
        }
    }
}
