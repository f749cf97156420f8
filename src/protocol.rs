//! Messages exchanged with peers.
//!
//! The transport only moves already-encoded text; this module owns the JSON
//! shape. Every message carries a `kind` tag and a `payload`.

use crate::blockchain::Block;
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Message {
    Transaction(Transaction),
    Block(Block),
    /// Sender's best height.
    ChainHeight(u64),
    /// Sender's full persisted chain text.
    ChainSnapshot(String),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Transaction(_) => "transaction",
            Message::Block(_) => "block",
            Message::ChainHeight(_) => "chain-height",
            Message::ChainSnapshot(_) => "chain-snapshot",
        }
    }

    pub fn encode(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ChainError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::genesis_block;

    #[test]
    fn test_kind_tags() {
        let encoded = Message::ChainHeight(7).encode().unwrap();
        assert_eq!(encoded, r#"{"kind":"chain-height","payload":7}"#);

        let snapshot = Message::ChainSnapshot("a\nsidechain\n".to_string());
        let value: serde_json::Value = serde_json::from_str(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(value["kind"], snapshot.kind());
    }

    #[test]
    fn test_block_message_decodes() {
        let message = Message::Block(genesis_block());
        let decoded = Message::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.kind(), "block");
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        assert!(matches!(
            Message::decode(r#"{"kind":"ping","payload":1}"#),
            Err(ChainError::Serialization(_))
        ));
    }
}
