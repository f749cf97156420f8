// Thin re-export module: implementation lives in `blockchain/core.rs` and its
// submodules (entities, chain index, branch state, admission rules, engine).

pub mod core;
pub use core::*;
