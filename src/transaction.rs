//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{check_spend, check_structure, SpendView};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{sign_transaction, KeyPair, Secp256k1Verifier};
    use crate::error::RejectReason;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct TestView {
        txs: HashMap<String, Transaction>,
        spent: HashSet<OutPoint>,
    }

    impl TestView {
        fn with(txs: Vec<Transaction>) -> Self {
            Self {
                txs: txs.into_iter().map(|tx| (tx.hash(), tx)).collect(),
                spent: HashSet::new(),
            }
        }
    }

    impl SpendView for TestView {
        fn transaction(&self, hash: &str) -> Option<&Transaction> {
            self.txs.get(hash)
        }

        fn is_spent(&self, outpoint: &OutPoint) -> bool {
            self.spent.contains(outpoint)
        }
    }

    fn signed_spend(owner: &KeyPair, funding: &Transaction, amount: u64) -> Transaction {
        let mut tx = Transaction::new(
            vec![Input::new(funding.hash(), 0)],
            vec![Output::new(amount, "recipient")],
        );
        sign_transaction(&mut tx, owner).unwrap();
        tx
    }

    #[test]
    fn test_hash_ignores_signatures() {
        let mut tx = Transaction::new(vec![Input::new("AB", 1)], vec![Output::new(5, "k")]);
        let before = tx.hash();
        tx.inputs[0].signature = Some("deadbeef".to_string());
        assert_eq!(tx.hash(), before);
        assert_eq!(before.len(), 64);
    }

    #[test]
    fn test_hash_depends_on_every_field() {
        let base = Transaction::new(vec![Input::new("AB", 1)], vec![Output::new(5, "k")]);
        let other_index = Transaction::new(vec![Input::new("AB", 2)], vec![Output::new(5, "k")]);
        let other_amount = Transaction::new(vec![Input::new("AB", 1)], vec![Output::new(6, "k")]);
        assert_ne!(base.hash(), other_index.hash());
        assert_ne!(base.hash(), other_amount.hash());
        assert_eq!(base, base.clone());
    }

    #[test]
    fn test_json_uses_camel_case_and_roundtrips() {
        let tx = Transaction::coinbase(&"0".repeat(64), 5000, "miner");
        let json = tx.to_json().unwrap();
        assert!(json.contains("\"referencedTxHash\""));
        assert!(json.contains("\"recipientKey\":\"miner\""));

        let back = Transaction::from_json(&json).unwrap();
        assert_eq!(back.hash(), tx.hash());
        assert_eq!(back.inputs[0].signature.as_deref(), Some(""));
    }

    #[test]
    fn test_structure_rules() {
        let no_inputs = Transaction::new(vec![], vec![Output::new(1, "k")]);
        let no_outputs = Transaction::new(vec![Input::new("AB", 0)], vec![]);
        let zero_amount = Transaction::new(vec![Input::new("AB", 0)], vec![Output::new(0, "k")]);
        assert_eq!(check_structure(&no_inputs), Err(RejectReason::StructuralInvalid));
        assert_eq!(check_structure(&no_outputs), Err(RejectReason::StructuralInvalid));
        assert_eq!(check_structure(&zero_amount), Err(RejectReason::StructuralInvalid));
    }

    #[test]
    fn test_valid_spend_claims_its_inputs() {
        let owner = KeyPair::generate();
        let funding = Transaction::coinbase(&"1".repeat(64), 100, owner.recipient_key());
        let view = TestView::with(vec![funding.clone()]);
        let tx = signed_spend(&owner, &funding, 60);

        let mut claimed = HashSet::new();
        assert_eq!(check_spend(&tx, &view, &mut claimed, &Secp256k1Verifier), Ok(()));
        assert!(claimed.contains(&tx.inputs[0].outpoint()));

        // the same outpoint cannot be claimed twice in one pass
        let again = signed_spend(&owner, &funding, 50);
        assert_eq!(
            check_spend(&again, &view, &mut claimed, &Secp256k1Verifier),
            Err(RejectReason::DoubleSpend)
        );
    }

    #[test]
    fn test_spend_rejections() {
        let owner = KeyPair::generate();
        let funding = Transaction::coinbase(&"2".repeat(64), 100, owner.recipient_key());
        let mut view = TestView::with(vec![funding.clone()]);

        let overspend = signed_spend(&owner, &funding, 101);
        assert_eq!(
            check_spend(&overspend, &view, &mut HashSet::new(), &Secp256k1Verifier),
            Err(RejectReason::OverspendOutputs)
        );

        let unsigned = Transaction::new(
            vec![Input::new(funding.hash(), 0)],
            vec![Output::new(10, "recipient")],
        );
        assert_eq!(
            check_spend(&unsigned, &view, &mut HashSet::new(), &Secp256k1Verifier),
            Err(RejectReason::InsufficientSignature)
        );

        let mut bad_index = Transaction::new(
            vec![Input::new(funding.hash(), 3)],
            vec![Output::new(10, "recipient")],
        );
        sign_transaction(&mut bad_index, &owner).unwrap();
        assert_eq!(
            check_spend(&bad_index, &view, &mut HashSet::new(), &Secp256k1Verifier),
            Err(RejectReason::UnknownInput)
        );

        let mut twice = Transaction::new(
            vec![Input::new(funding.hash(), 0), Input::new(funding.hash(), 0)],
            vec![Output::new(150, "recipient")],
        );
        sign_transaction(&mut twice, &owner).unwrap();
        assert_eq!(
            check_spend(&twice, &view, &mut HashSet::new(), &Secp256k1Verifier),
            Err(RejectReason::DoubleSpend)
        );

        view.spent.insert(OutPoint { tx_hash: funding.hash(), index: 0 });
        let valid = signed_spend(&owner, &funding, 10);
        assert_eq!(
            check_spend(&valid, &view, &mut HashSet::new(), &Secp256k1Verifier),
            Err(RejectReason::DoubleSpend)
        );
    }
}
