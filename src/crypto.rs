//! Cryptographic primitives for Branchcoin
//!
//! Two capabilities live here: the content hash every entity is identified by,
//! and the sign/verify primitive that binds an input to the recipient key of the
//! output it spends. The ledger engine only sees the [`SignatureVerifier`] trait.

use crate::error::ChainError;
use crate::transaction::{Input, Transaction};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Incremental content hash over the textual form of an entity's fields.
///
/// The digest is always rendered as 64 uppercase hex digits, which is what makes
/// lexicographic comparison against a target a numeric comparison.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, field: impl AsRef<[u8]>) {
        self.inner.update(field.as_ref());
    }

    pub fn finish(self) -> String {
        hex::encode_upper(self.inner.finalize())
    }
}

/// Uppercase, fixed-width hex SHA-256 of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finish()
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::Crypto(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::Crypto(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| ChainError::Crypto(format!("Invalid secret key hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// The recipient key other parties pay to: hex of the compressed public key.
    pub fn recipient_key(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Signs SHA-256(message) and returns the compact signature bytes.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], ChainError> {
        let digest = Sha256::digest(message);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| ChainError::Crypto(format!("Failed to create message: {}", e)))?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact())
    }
}

/// Verifies an ECDSA signature given the raw public key bytes, message, and signature bytes.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::Crypto(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::Crypto(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| ChainError::Crypto(format!("Invalid public key: {}", e)))?;
    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::Crypto(format!("Failed to create message: {}", e)))?;
    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::Crypto(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::Crypto("Signature verification failed".to_string()))
}

/// Checks that an input is authorized by the owner of the output it spends.
pub trait SignatureVerifier: Send + Sync {
    /// `referenced` is the transaction holding the output `input` points at.
    fn verify(&self, input: &Input, tx: &Transaction, referenced: &Transaction) -> bool;
}

/// secp256k1 ECDSA over the transaction hash; recipient keys are compressed public keys in hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, input: &Input, tx: &Transaction, referenced: &Transaction) -> bool {
        let Some(signature) = input.signature.as_deref() else {
            return false;
        };
        let Some(output) = referenced.outputs.get(input.referenced_output_index as usize) else {
            return false;
        };
        let (Ok(key_bytes), Ok(signature_bytes)) =
            (hex::decode(&output.recipient_key), hex::decode(signature))
        else {
            return false;
        };
        verify_signature(&key_bytes, tx.hash().as_bytes(), &signature_bytes).is_ok()
    }
}

/// Signs the transaction hash and attaches the signature to every input.
pub fn sign_transaction(tx: &mut Transaction, keypair: &KeyPair) -> Result<(), ChainError> {
    let signature = hex::encode(keypair.sign(tx.hash().as_bytes())?);
    for input in &mut tx.inputs {
        input.signature = Some(signature.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Output;

    fn funding_tx(recipient: &str) -> Transaction {
        Transaction::coinbase(&"A".repeat(64), 500, recipient)
    }

    #[test]
    fn test_content_hash_is_fixed_width_uppercase() {
        let hash = sha256_hex("branchcoin");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(hash, sha256_hex("branch".to_string() + "coin"));
    }

    #[test]
    fn test_signing_and_verification() {
        let keypair = KeyPair::generate();
        let message = b"Hello, Branchcoin!";

        let signature = keypair.sign(message).unwrap();
        let result = verify_signature(&keypair.public_key.serialize(), message, &signature);
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_signature() {
        let keypair1 = KeyPair::generate();
        let keypair2 = KeyPair::generate();

        let signature = keypair1.sign(b"Test message").unwrap();
        let result = verify_signature(&keypair2.public_key.serialize(), b"Test message", &signature);
        assert_eq!(
            result.unwrap_err().to_string(),
            "Cryptographic error: Signature verification failed"
        );
    }

    #[test]
    fn test_secret_hex_roundtrip() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&keypair.secret_key_hex()).unwrap();
        assert_eq!(keypair.recipient_key(), restored.recipient_key());

        let result = KeyPair::from_secret_bytes(&[0u8; SECRET_KEY_SIZE - 1]);
        assert!(result.unwrap_err().to_string().contains("Secret key must be"));
    }

    #[test]
    fn test_signed_input_verifies_against_referenced_output() {
        let owner = KeyPair::generate();
        let funding = funding_tx(&owner.recipient_key());

        let mut spend = Transaction::new(
            vec![Input::new(funding.hash(), 0)],
            vec![Output::new(400, "payee")],
        );
        let unsigned_hash = spend.hash();
        sign_transaction(&mut spend, &owner).unwrap();

        assert_eq!(spend.hash(), unsigned_hash);
        assert!(Secp256k1Verifier.verify(&spend.inputs[0], &spend, &funding));
    }

    #[test]
    fn test_wrong_owner_or_missing_signature_fails() {
        let owner = KeyPair::generate();
        let thief = KeyPair::generate();
        let funding = funding_tx(&owner.recipient_key());

        let mut spend = Transaction::new(
            vec![Input::new(funding.hash(), 0)],
            vec![Output::new(400, thief.recipient_key())],
        );
        assert!(!Secp256k1Verifier.verify(&spend.inputs[0], &spend, &funding));

        sign_transaction(&mut spend, &thief).unwrap();
        assert!(!Secp256k1Verifier.verify(&spend.inputs[0], &spend, &funding));
    }
}
