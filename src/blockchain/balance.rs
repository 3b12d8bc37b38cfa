use super::block::Block;
use super::crypto::Address;

/// Net balance of `address` obtained by replaying every transaction in
/// chain order: received amounts minus sent amounts.
///
/// No fee is charged and no floor applies, so the result can be negative.
/// A self-transfer nets to zero.
pub fn balance_of(chain: &[Block], address: &Address) -> f64 {
    chain
        .iter()
        .flat_map(|block| block.transactions.iter())
        .fold(0.0, |mut balance, transaction| {
            if &transaction.sender == address {
                balance -= transaction.amount;
            }
            if &transaction.receiver == address {
                balance += transaction.amount;
            }
            balance
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Transaction;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn block_with(index: u64, transactions: Vec<Transaction>) -> Block {
        Block::new(index, Utc::now(), transactions, "prev".to_string(), 0)
    }

    fn tx(sender: &str, receiver: &str, amount: f64) -> Transaction {
        Transaction::new(Address::from(sender), Address::from(receiver), amount)
    }

    #[test]
    fn test_balance_replay() {
        let chain = vec![
            block_with(0, Vec::new()),
            block_with(1, vec![tx("A1", "B2", 1.0), Transaction::new_reward(Address::from("A1"), 0.5)]),
            block_with(2, vec![tx("B2", "C3", 0.4)]),
        ];

        assert!((balance_of(&chain, &Address::from("A1")) - (-0.5)).abs() < 1e-9);
        assert!((balance_of(&chain, &Address::from("B2")) - 0.6).abs() < 1e-9);
        assert!((balance_of(&chain, &Address::from("C3")) - 0.4).abs() < 1e-9);
        assert_eq!(balance_of(&chain, &Address::from("nobody")), 0.0);
    }

    #[test]
    fn test_self_transfer_nets_to_zero() {
        let chain = vec![block_with(1, vec![tx("A1", "A1", 5.0)])];
        assert_eq!(balance_of(&chain, &Address::from("A1")), 0.0);
    }

    fn arb_transaction() -> impl Strategy<Value = Transaction> {
        let names = prop::sample::select(vec!["A1", "B2", "C3", "SYSTEM"]);
        (names.clone(), names, 1u32..100).prop_map(|(sender, receiver, tenths)| {
            tx(sender, receiver, tenths as f64 / 10.0)
        })
    }

    proptest! {
        #[test]
        fn balances_sum_to_zero(blocks in prop::collection::vec(prop::collection::vec(arb_transaction(), 0..6), 1..6)) {
            let chain: Vec<Block> = blocks
                .into_iter()
                .enumerate()
                .map(|(index, transactions)| block_with(index as u64, transactions))
                .collect();

            let addresses: BTreeSet<&Address> = chain
                .iter()
                .flat_map(|block| block.transactions.iter())
                .flat_map(|tx| [&tx.sender, &tx.receiver])
                .collect();

            let total: f64 = addresses.iter().map(|address| balance_of(&chain, address)).sum();
            prop_assert!(total.abs() < 1e-6);

            for address in addresses {
                prop_assert_eq!(balance_of(&chain, address), balance_of(&chain, address));
            }
        }
    }
}
