// core.rs splits the ledger into the entity, tree, state, rules and engine layers.
pub mod block;
pub mod chain;
pub mod index;
pub mod orphans;
pub mod state;
pub mod validation;

pub use block::*;
pub use chain::*;
pub use index::*;
pub use orphans::*;
pub use state::*;
pub use validation::*;
