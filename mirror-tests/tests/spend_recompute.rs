//! Property: the spend flags maintained incrementally at commit time always
//! equal a full re-derivation over the same tables.

use mirror_tests::constants::{WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED};
use mirror_tests::utils::{chain_address, payment, spend, Scenario};
use proptest::prelude::*;
use speculolib::data::{BlockMeta, ChainKind, RemoteState, TxHash};
use speculolib::sync::sync;
use speculolib::test_framework::mocks::{block_hash, tx_hash};
use speculolib::utxos::full_spend_recompute;

fn external(index: u32) -> speculolib::data::AddressHash {
    chain_address(WALLET_ONE_PAYMENT_SEED, ChainKind::External, index)
}

/// A confirmed placement in a block whose hash is unique per transaction, so
/// a block reappearing at a rolled-back height is a genuinely new block.
fn confirmed_unique(n: u8, height: u64) -> RemoteState {
    RemoteState::InBlock {
        block: BlockMeta::from_parts(
            block_hash(100 + n),
            height.into(),
            height / 10,
            height * 10,
            height * 100,
        ),
        ordinal: 0,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn incremental_spend_flags_match_full_recompute(
        actions in proptest::collection::vec(0u8..4, 1..10)
    ) {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let outcome: Result<(), TestCaseError> = runtime.block_on(async move {
            let scenario = Scenario::new();
            let mut wallet = scenario
                .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
                .await;

            let mut height = 0u64;
            let mut n = 0u8;
            let mut spendable: Vec<TxHash> = Vec::new();

            for action in actions {
                n += 1;
                match action {
                    // a confirmed payment to one of three addresses
                    0 => {
                        height += 1;
                        scenario.remote.add_transaction(payment(
                            n,
                            confirmed_unique(n, height),
                            external(u32::from(n % 3)),
                            50,
                        ));
                        spendable.push(tx_hash(n));
                    }
                    // a pending spend of some earlier output
                    1 => {
                        if let Some(target) = spendable.get(n as usize % spendable.len().max(1)) {
                            scenario.remote.add_transaction(spend(
                                n,
                                RemoteState::Mempool,
                                *target,
                                0,
                                vec![(external(u32::from(n % 3)), 20)],
                            ));
                        }
                    }
                    // a confirmed spend of some earlier output
                    2 => {
                        if let Some(target) = spendable.get(n as usize % spendable.len().max(1)) {
                            height += 1;
                            scenario.remote.add_transaction(spend(
                                n,
                                confirmed_unique(n, height),
                                *target,
                                0,
                                vec![(external(u32::from(n % 3)), 20)],
                            ));
                        }
                    }
                    // a reorg halfway down
                    _ => {
                        if height > 1 {
                            height /= 2;
                            scenario.remote.rollback_to(height);
                        }
                    }
                }

                sync(scenario.remote.clone(), &scenario.store, &mut wallet)
                    .await
                    .expect("pass against the mock remote");

                let incremental = scenario.store.snapshot();
                let mut full = incremental.clone();
                full_spend_recompute(&mut full);
                prop_assert_eq!(incremental, full);
            }
            Ok(())
        });
        outcome?;
    }
}
