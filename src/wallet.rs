//! Payment construction for key holders.
//!
//! Picks the sender's unspent outputs that no pooled transaction has claimed,
//! newest first, until the amount is covered, and returns any surplus to the
//! sender as change.

use crate::blockchain::{Blockchain, UnspentOutput};
use crate::crypto::{sign_transaction, KeyPair};
use crate::error::{ChainError, RejectReason};
use crate::transaction::{Input, OutPoint, Output, Transaction};
use std::collections::HashSet;
use tracing::debug;

/// Outputs chosen to fund a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    pub inputs: Vec<UnspentOutput>,
    pub total: u64,
}

/// Chooses unclaimed outputs from `unspent` covering `amount`.
///
/// Fails with [`ChainError::InsufficientFunds`] when the outputs cannot cover
/// the amount even counting claimed ones, and with [`ChainError::FundsPending`]
/// when they could but pooled transactions hold too much of them.
pub fn select_coins(
    unspent: &[UnspentOutput],
    claimed: &HashSet<OutPoint>,
    amount: u64,
) -> Result<CoinSelection, ChainError> {
    let mut inputs = Vec::new();
    let mut total = 0u64;
    for utxo in unspent.iter().rev() {
        if total >= amount {
            break;
        }
        if claimed.contains(&utxo.outpoint) {
            continue;
        }
        total = total.saturating_add(utxo.output.amount);
        inputs.push(utxo.clone());
    }

    if total < amount {
        let available = unspent
            .iter()
            .fold(0u64, |sum, utxo| sum.saturating_add(utxo.output.amount));
        return Err(if available < amount {
            ChainError::InsufficientFunds {
                needed: amount,
                available,
            }
        } else {
            ChainError::FundsPending {
                needed: amount,
                spendable: total,
            }
        });
    }
    Ok(CoinSelection { inputs, total })
}

/// Signed transaction paying `amount` from `sender` to `recipient_key` on the
/// current best chain.
pub fn build_payment(
    chain: &Blockchain,
    sender: &KeyPair,
    recipient_key: &str,
    amount: u64,
) -> Result<Transaction, ChainError> {
    if amount == 0 {
        return Err(ChainError::PaymentRejected(RejectReason::StructuralInvalid));
    }
    let sender_key = sender.recipient_key();
    let unspent = chain.unspent_outputs_for(&sender_key);
    let selection = select_coins(&unspent, chain.mempool().claimed(), amount)?;

    let inputs = selection
        .inputs
        .iter()
        .map(|utxo| Input::new(utxo.outpoint.tx_hash.clone(), utxo.outpoint.index))
        .collect();
    let mut outputs = vec![Output::new(amount, recipient_key)];
    let change = selection.total - amount;
    if change > 0 {
        outputs.push(Output::new(change, sender_key));
    }

    let mut tx = Transaction::new(inputs, outputs);
    sign_transaction(&mut tx, sender)?;
    debug!(
        inputs = selection.inputs.len(),
        amount,
        change,
        "payment built"
    );
    Ok(tx)
}
