use crate::consensus::MAX_TARGET;
use crate::crypto::ContentHasher;
use crate::transaction::{Input, Output, Transaction};
use serde::{Deserialize, Serialize};

/// Hash of the all-zero sentinel the genesis block points at.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

const GENESIS_NONCE: u32 = 22106;
const GENESIS_RECIPIENT: &str = "00000000000000000000000000000000";
const GENESIS_REWARD: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub previous_block_hash: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub nonce: u32,
    pub target: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        previous_block_hash: String,
        timestamp: i64,
        target: String,
        transactions: Vec<Transaction>,
    ) -> Self {
        Block {
            previous_block_hash,
            timestamp,
            nonce: 0,
            target,
            transactions,
        }
    }

    pub fn hash(&self) -> String {
        let mut hasher = self.header_prefix();
        hasher.update(self.nonce.to_string());
        hasher.update(self.hash_suffix());
        hasher.finish()
    }

    /// Hasher state after the fields that precede the nonce.
    pub(crate) fn header_prefix(&self) -> ContentHasher {
        let mut hasher = ContentHasher::new();
        hasher.update(&self.previous_block_hash);
        hasher.update(self.timestamp.to_string());
        hasher
    }

    /// Hashed text of the fields that follow the nonce.
    pub(crate) fn hash_suffix(&self) -> String {
        let mut suffix = self.target.clone();
        for tx in &self.transactions {
            suffix.push_str(&tx.hash());
        }
        suffix
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    pub fn contains_transaction(&self, hash: &str) -> bool {
        self.transactions.iter().any(|tx| tx.hash() == hash)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Block {}

/// The fixed first block every chain starts from. It is never revalidated.
pub fn genesis_block() -> Block {
    let coinbase = Transaction::new(
        vec![Input {
            signature: Some(String::new()),
            ..Input::new(GENESIS_PREVIOUS_HASH, 0)
        }],
        vec![Output::new(GENESIS_REWARD, GENESIS_RECIPIENT)],
    );

    Block {
        previous_block_hash: GENESIS_PREVIOUS_HASH.to_string(),
        timestamp: 0,
        nonce: GENESIS_NONCE,
        target: MAX_TARGET.to_string(),
        transactions: vec![coinbase],
    }
}
