use crate::{CryptoError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Secret key size in bits.
pub const KEY_SIZE: usize = 256;

/// Signing key pair for transaction validators.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing: SigningKey::generate(&mut csprng),
        }
    }

    /// Create from secret key bytes. Fails unless the key is exactly
    /// [`KEY_SIZE`] bits long.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        if secret.len() * 8 != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                got: secret.len() * 8,
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(secret);
        Ok(Self {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    /// Sign a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }

    /// Public key bytes (the validator identity).
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Secret key bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }
}

/// Verify a signature against a public key and message.
///
/// Returns false for malformed keys or signatures as well as for a
/// non-matching signature; validation sites only care about the verdict.
pub fn verify_signature(public: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}
