//! Transaction types for Branchcoin

use crate::crypto::ContentHasher;
use serde::{Deserialize, Serialize};

/// Amount paid to one recipient key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub amount: u64,
    pub recipient_key: String,
}

impl Output {
    pub fn new(amount: u64, recipient_key: impl Into<String>) -> Self {
        Self {
            amount,
            recipient_key: recipient_key.into(),
        }
    }
}

/// Reference to an output of an earlier transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub referenced_tx_hash: String,
    pub referenced_output_index: u32,
    /// Absent until signed. Never part of the transaction hash.
    pub signature: Option<String>,
}

impl Input {
    pub fn new(referenced_tx_hash: impl Into<String>, referenced_output_index: u32) -> Self {
        Self {
            referenced_tx_hash: referenced_tx_hash.into(),
            referenced_output_index,
            signature: None,
        }
    }

    /// The (transaction hash, output index) pair this input consumes.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            tx_hash: self.referenced_tx_hash.clone(),
            index: self.referenced_output_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub tx_hash: String,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

impl Transaction {
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        Self { inputs, outputs }
    }

    /// Reward transaction for a block built on `parent_hash`.
    ///
    /// The synthetic input carries the parent hash so that every coinbase has a
    /// distinct identity; its empty signature is never checked.
    pub fn coinbase(parent_hash: &str, reward: u64, recipient_key: impl Into<String>) -> Self {
        let input = Input {
            referenced_tx_hash: parent_hash.to_string(),
            referenced_output_index: 0,
            signature: Some(String::new()),
        };
        Self::new(vec![input], vec![Output::new(reward, recipient_key)])
    }

    /// Content hash over inputs (without signatures) and outputs.
    pub fn hash(&self) -> String {
        let mut hasher = ContentHasher::new();
        for input in &self.inputs {
            hasher.update(&input.referenced_tx_hash);
            hasher.update(input.referenced_output_index.to_string());
        }
        for output in &self.outputs {
            hasher.update(output.amount.to_string());
            hasher.update(&output.recipient_key);
        }
        hasher.finish()
    }

    pub fn is_coinbase_shaped(&self) -> bool {
        self.inputs.len() == 1 && self.outputs.len() == 1
    }

    pub fn output_total(&self) -> u128 {
        self.outputs.iter().map(|o| o.amount as u128).sum()
    }

    pub fn spends(&self, outpoint: &OutPoint) -> bool {
        self.inputs.iter().any(|input| {
            input.referenced_output_index == outpoint.index
                && input.referenced_tx_hash == outpoint.tx_hash
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Transaction {}
