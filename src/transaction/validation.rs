//! Transaction validation shared by block admission and pool admission.

use super::types::{OutPoint, Transaction};
use crate::crypto::SignatureVerifier;
use crate::error::RejectReason;
use std::collections::HashSet;

/// Read access to the chain a transaction is checked against.
pub trait SpendView {
    /// A transaction recorded in this chain, looked up by hash.
    fn transaction(&self, hash: &str) -> Option<&Transaction>;

    /// Whether some transaction in this chain already consumes `outpoint`.
    fn is_spent(&self, outpoint: &OutPoint) -> bool;
}

/// At least one input, at least one output, every amount strictly positive.
pub fn check_structure(tx: &Transaction) -> Result<(), RejectReason> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(RejectReason::StructuralInvalid);
    }
    if tx.outputs.iter().any(|output| output.amount == 0) {
        return Err(RejectReason::StructuralInvalid);
    }
    Ok(())
}

/// Full check of a non-coinbase transaction against `view`.
///
/// `claimed` holds outpoints already consumed by other pending spends (earlier
/// transactions of the same block, or the pool). Each input this transaction
/// consumes is added to it once the transaction is accepted, so callers can thread
/// one set through a whole block.
pub fn check_spend(
    tx: &Transaction,
    view: &dyn SpendView,
    claimed: &mut HashSet<OutPoint>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), RejectReason> {
    check_structure(tx)?;

    let mut consumed: HashSet<OutPoint> = HashSet::with_capacity(tx.inputs.len());
    let mut input_total: u128 = 0;

    for input in &tx.inputs {
        let referenced = view
            .transaction(&input.referenced_tx_hash)
            .ok_or(RejectReason::UnknownInput)?;
        let output = referenced
            .outputs
            .get(input.referenced_output_index as usize)
            .ok_or(RejectReason::UnknownInput)?;

        let outpoint = input.outpoint();
        if view.is_spent(&outpoint) || claimed.contains(&outpoint) || consumed.contains(&outpoint) {
            return Err(RejectReason::DoubleSpend);
        }

        if !verifier.verify(input, tx, referenced) {
            return Err(RejectReason::InsufficientSignature);
        }

        input_total += output.amount as u128;
        consumed.insert(outpoint);
    }

    if tx.output_total() > input_total {
        return Err(RejectReason::OverspendOutputs);
    }

    claimed.extend(consumed);
    Ok(())
}
