//! Canonical hashing for token sets and step sequences
//!
//! Every value is ABI-encoded with fixed-width words before hashing, so two
//! different step sequences can never share a preimage.

use alloy_primitives::{keccak256, Address, B256};
use alloy_sol_types::SolValue;

use super::StrategyStep;

/// Sort and deduplicate a token set
pub fn canonical_tokens(tokens: &[Address]) -> Vec<Address> {
    let mut sorted = tokens.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// `keccak256(abi.encode(sortedUniqueTokens))`
pub fn tokens_hash(tokens: &[Address]) -> B256 {
    keccak256(canonical_tokens(tokens).abi_encode())
}

/// `keccak256(abi.encode(pool, outputToken, isBorrow))`
pub fn step_hash(step: &StrategyStep) -> B256 {
    keccak256((step.pool, step.output_token, step.is_borrow).abi_encode_params())
}

/// `keccak256(abi.encode(tokensHash, [stepHash...]))`
pub fn strategy_hash(tokens_hash: B256, steps: &[StrategyStep]) -> B256 {
    let step_hashes: Vec<B256> = steps.iter().map(step_hash).collect();
    keccak256((tokens_hash, step_hashes).abi_encode_params())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_address() -> impl Strategy<Value = Address> {
        any::<[u8; 20]>().prop_map(Address::from)
    }

    fn arb_step() -> impl Strategy<Value = StrategyStep> {
        (arb_address(), arb_address(), any::<bool>()).prop_map(|(pool, output_token, is_borrow)| {
            StrategyStep {
                pool,
                output_token,
                is_borrow,
            }
        })
    }

    proptest! {
        #[test]
        fn strategy_hash_is_deterministic(
            tokens in prop::collection::vec(arb_address(), 1..4),
            steps in prop::collection::vec(arb_step(), 1..5),
        ) {
            let th = tokens_hash(&tokens);
            prop_assert_eq!(strategy_hash(th, &steps), strategy_hash(th, &steps));
        }

        #[test]
        fn tokens_hash_ignores_order_and_duplicates(
            tokens in prop::collection::vec(arb_address(), 1..6),
        ) {
            let mut shuffled = tokens.clone();
            shuffled.reverse();
            shuffled.extend(tokens.iter().take(2).copied());
            prop_assert_eq!(tokens_hash(&tokens), tokens_hash(&shuffled));
        }

        #[test]
        fn borrow_flag_changes_the_hash(step in arb_step()) {
            let flipped = StrategyStep { is_borrow: !step.is_borrow, ..step.clone() };
            prop_assert_ne!(step_hash(&step), step_hash(&flipped));
        }
    }

    #[test]
    fn test_step_order_matters() {
        let a = StrategyStep::invest(Address::repeat_byte(1), Address::repeat_byte(2));
        let b = StrategyStep::invest(Address::repeat_byte(2), Address::repeat_byte(3));
        let th = tokens_hash(&[Address::repeat_byte(9)]);
        assert_ne!(
            strategy_hash(th, &[a.clone(), b.clone()]),
            strategy_hash(th, &[b, a])
        );
    }
}
