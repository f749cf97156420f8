//! Error types for Branchcoin

use thiserror::Error;

/// Failures outside of consensus: storage, parsing, keys and configuration.
///
/// Consensus rejections are never raised as errors; admission returns a
/// [`RejectReason`] inside its outcome instead.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt chain data: {0}")]
    CorruptChain(String),
    #[error("Chain does not start with the protocol genesis block")]
    GenesisMismatch,
    #[error("Cryptographic error: {0}")]
    Crypto(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Nonce space exhausted without meeting the target")]
    MiningExhausted,
    #[error("Insufficient funds: have {available}, need {needed}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("Funds are held by pending transactions: {spendable} spendable now, need {needed}")]
    FundsPending { needed: u64, spendable: u64 },
    #[error("Payment rejected: {0}")]
    PaymentRejected(RejectReason),
}

/// Why a block or transaction was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RejectReason {
    #[error("structurally invalid")]
    StructuralInvalid,
    #[error("block hash does not meet its target")]
    ProofOfWorkInvalid,
    #[error("target is malformed, above the maximum, or not the required value")]
    TargetInvalid,
    #[error("already known")]
    Duplicate,
    #[error("timestamp outside the accepted window")]
    TimestampInvalid,
    #[error("coinbase transaction has the wrong shape or reward")]
    CoinbaseInvalid,
    #[error("input refers to an unknown transaction or output")]
    UnknownInput,
    #[error("output already spent")]
    DoubleSpend,
    #[error("missing or invalid input signature")]
    InsufficientSignature,
    #[error("outputs spend more than the referenced inputs")]
    OverspendOutputs,
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
