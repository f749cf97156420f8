//! Branchcoin - a proof-of-work ledger that keeps every competing branch
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the chain tree, admission rules and the ledger engine
//! - [`transaction`] - Transaction types and spend validation
//! - [`mempool`] - Pending-transaction pool
//! - [`wallet`] - Payment construction from unspent outputs
//!
//! ## Consensus
//! - [`consensus`] - Targets, retargeting and the timestamp window
//! - [`economics`] - Coinbase reward schedule
//! - [`miner`] - Proof-of-work nonce search
//!
//! ## Cryptography
//! - [`crypto`] - Content hashing and secp256k1 signatures
//!
//! ## State Management
//! - [`persistence`] - Chain snapshot text and storage backends
//!
//! ## Networking & Integration
//! - [`protocol`] - Peer message encoding
//! - [`node`] - Control loop driving the engine
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;
pub mod wallet;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod economics;
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Networking & Integration
// ============================================================================
pub mod node;
pub mod protocol;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
