//! End-to-end reconciliation scenarios against the mock remote.

use mirror_tests::constants::{
    WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED, WALLET_TWO_PAYMENT_SEED,
    WALLET_TWO_STAKING_SEED,
};
use mirror_tests::utils::{chain_address, confirmed_in, payment, spend, Scenario};
use speculolib::data::{ChainKind, RemoteState};
use speculolib::error::SyncError;
use speculolib::sync::sync;
use speculolib::test_framework::mocks::{block_meta, normalize_sync_times, tx_hash};
use speculolib::wallet::confirmation_status::ConfirmationStatus;

fn external(index: u32) -> speculolib::data::AddressHash {
    chain_address(WALLET_ONE_PAYMENT_SEED, ChainKind::External, index)
}

fn internal(index: u32) -> speculolib::data::AddressHash {
    chain_address(WALLET_ONE_PAYMENT_SEED, ChainKind::Internal, index)
}

#[tokio::test]
async fn sync_is_idempotent_without_remote_changes() {
    let scenario = Scenario::new();
    let mut wallet = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;

    scenario
        .remote
        .add_transaction(payment(1, confirmed_in(1, 0), external(0), 100));
    scenario
        .remote
        .add_transaction(payment(2, RemoteState::Mempool, external(1), 40));

    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    let mut first = scenario.store.snapshot();

    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    let mut second = scenario.store.snapshot();

    normalize_sync_times(&mut first);
    normalize_sync_times(&mut second);
    assert_eq!(first, second);

    assert_eq!(wallet.balance(&scenario.store), 100);
    assert_eq!(wallet.pending_balance(&scenario.store), 140);
}

#[tokio::test]
async fn reorg_reverts_status_spends_and_cursor() {
    let scenario = Scenario::new();
    let mut wallet = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;

    scenario
        .remote
        .add_transaction(payment(1, confirmed_in(1, 0), external(0), 100));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();

    // a later transaction spends the 100 and returns 40 in change
    let foreign = chain_address([9; 32], ChainKind::External, 0);
    scenario.remote.add_transaction(spend(
        2,
        confirmed_in(2, 0),
        tx_hash(1),
        0,
        vec![(foreign, 60), (internal(0), 40)],
    ));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    assert_eq!(wallet.balance(&scenario.store), 40);
    assert_eq!(
        scenario.store.last_sync(wallet.id()).unwrap().block,
        Some(block_meta(2).hash())
    );

    // the block holding the spend becomes unreachable
    scenario.remote.rollback_to(1);
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();

    let tables = scenario.store.read();
    assert_eq!(
        tables.transaction_by_hash(&tx_hash(2)).unwrap().status,
        ConfirmationStatus::Reorganized
    );
    assert_eq!(tables.transaction_by_hash(&tx_hash(2)).unwrap().block, None);
    assert_eq!(
        tables.transaction_by_hash(&tx_hash(1)).unwrap().status,
        ConfirmationStatus::Confirmed(1.into())
    );
    drop(tables);

    // the spent output is spendable again, the change output is gone
    assert_eq!(wallet.balance(&scenario.store), 100);
    let cursor = scenario.store.last_sync(wallet.id()).unwrap();
    assert_eq!(cursor.block, Some(block_meta(1).hash()));
    assert_eq!(u64::from(cursor.height), 1);
}

#[tokio::test]
async fn eviction_without_rollback_drops_a_pending_transaction() {
    let scenario = Scenario::new();
    let mut wallet = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;

    scenario.remote.add_block(block_meta(1));
    scenario
        .remote
        .add_transaction(payment(1, RemoteState::Mempool, external(0), 50));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    assert_eq!(wallet.pending_balance(&scenario.store), 50);

    // mempool eviction, chain advances, no reorg
    scenario.remote.evict_transaction(tx_hash(1));
    scenario.remote.add_block(block_meta(2));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();

    let tables = scenario.store.read();
    assert_eq!(
        tables.transaction_by_hash(&tx_hash(1)).unwrap().status,
        ConfirmationStatus::Dropped
    );
    drop(tables);
    assert_eq!(wallet.pending_balance(&scenario.store), 0);
}

#[tokio::test]
async fn eviction_during_a_rollback_reorganizes_instead() {
    let scenario = Scenario::new();
    let mut wallet = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;

    // confirmed history pins the cursor to block 1
    scenario
        .remote
        .add_transaction(payment(1, confirmed_in(1, 0), external(0), 100));
    scenario
        .remote
        .add_transaction(payment(2, RemoteState::Mempool, external(1), 50));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();

    // everything the remote served is rolled away, mempool included
    scenario.remote.rollback_to(0);
    scenario.remote.evict_transaction(tx_hash(2));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();

    let tables = scenario.store.read();
    assert_eq!(
        tables.transaction_by_hash(&tx_hash(1)).unwrap().status,
        ConfirmationStatus::Reorganized
    );
    assert_eq!(
        tables.transaction_by_hash(&tx_hash(2)).unwrap().status,
        ConfirmationStatus::Reorganized
    );
    drop(tables);

    let cursor = scenario.store.last_sync(wallet.id()).unwrap();
    assert_eq!(cursor.block, None);
    assert_eq!(u64::from(cursor.height), 0);
}

#[tokio::test]
async fn failed_stays_failed_through_eviction_and_rollback() {
    let scenario = Scenario::new();
    let mut wallet = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;

    scenario
        .remote
        .add_transaction(payment(1, confirmed_in(1, 0), external(0), 100));
    scenario.remote.add_transaction(payment(
        2,
        RemoteState::Failed {
            reason: "script rejected".to_string(),
        },
        external(1),
        30,
    ));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    {
        let tables = scenario.store.read();
        let record = tables.transaction_by_hash(&tx_hash(2)).unwrap();
        assert_eq!(record.status, ConfirmationStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("script rejected"));
    }

    // the remote re-serves it as pending; failure is sticky
    scenario
        .remote
        .set_transaction_state(tx_hash(2), RemoteState::Mempool);
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    assert_eq!(
        scenario
            .store
            .read()
            .transaction_by_hash(&tx_hash(2))
            .unwrap()
            .status,
        ConfirmationStatus::Failed
    );

    // a full rollback does not revive it either
    scenario.remote.rollback_to(0);
    scenario.remote.evict_transaction(tx_hash(2));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    assert_eq!(
        scenario
            .store
            .read()
            .transaction_by_hash(&tx_hash(2))
            .unwrap()
            .status,
        ConfirmationStatus::Failed
    );
}

#[tokio::test]
async fn wallets_with_disjoint_addresses_never_see_each_other() {
    let scenario = Scenario::new();
    let mut wallet_one = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;
    let mut wallet_two = scenario
        .create_wallet(2, WALLET_TWO_PAYMENT_SEED, WALLET_TWO_STAKING_SEED)
        .await;

    let to_wallet_two = chain_address(WALLET_TWO_PAYMENT_SEED, ChainKind::External, 0);
    scenario
        .remote
        .add_transaction(payment(1, confirmed_in(1, 0), to_wallet_two, 75));

    sync(scenario.remote.clone(), &scenario.store, &mut wallet_one)
        .await
        .unwrap();
    sync(scenario.remote.clone(), &scenario.store, &mut wallet_two)
        .await
        .unwrap();

    assert_eq!(wallet_one.balance(&scenario.store), 0);
    assert!(wallet_one.all_utxos(&scenario.store).is_empty());
    assert_eq!(wallet_two.balance(&scenario.store), 75);
    assert_eq!(wallet_two.all_utxos(&scenario.store).len(), 1);

    // wallet one's cursor never left genesis
    assert_eq!(scenario.store.last_sync(wallet_one.id()).unwrap().block, None);
}

#[tokio::test]
async fn create_and_spend_in_one_pass_leaves_only_the_change() {
    let scenario = Scenario::new();
    let mut wallet = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;

    let foreign = chain_address([9; 32], ChainKind::External, 0);
    scenario
        .remote
        .add_transaction(payment(1, confirmed_in(1, 0), external(0), 100));
    scenario.remote.add_transaction(spend(
        2,
        confirmed_in(2, 0),
        tx_hash(1),
        0,
        vec![(foreign, 70), (internal(0), 30)],
    ));

    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();

    let utxos = wallet.all_utxos(&scenario.store);
    assert_eq!(utxos.len(), 1);
    assert_eq!(utxos[0].value(), 30);
    assert_eq!(utxos[0].address(), internal(0));
    assert_eq!(wallet.balance(&scenario.store), 30);
}

#[tokio::test]
async fn transport_failure_aborts_the_pass_without_mutation() {
    let scenario = Scenario::new();
    let mut wallet = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;
    scenario
        .remote
        .add_transaction(payment(1, confirmed_in(1, 0), external(0), 100));
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    let before = scenario.store.snapshot();

    scenario.remote.set_unreachable(true);
    let result = sync(scenario.remote.clone(), &scenario.store, &mut wallet).await;
    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert_eq!(scenario.store.snapshot(), before);

    // the next successful pass picks up from the same cursor
    scenario.remote.set_unreachable(false);
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();
    assert_eq!(wallet.balance(&scenario.store), 100);
}

#[tokio::test]
async fn pagination_reassembles_a_long_history() {
    let scenario = Scenario::new();
    let mut wallet = scenario
        .create_wallet(1, WALLET_ONE_PAYMENT_SEED, WALLET_ONE_STAKING_SEED)
        .await;

    // three times the page size, alternating over two addresses
    for n in 1..=12u8 {
        let address = if n % 2 == 0 { external(0) } else { external(1) };
        scenario
            .remote
            .add_transaction(payment(n, confirmed_in(n as u64, 0), address, 10));
    }
    sync(scenario.remote.clone(), &scenario.store, &mut wallet)
        .await
        .unwrap();

    assert_eq!(wallet.balance(&scenario.store), 120);
    assert_eq!(
        scenario.store.last_sync(wallet.id()).unwrap().block,
        Some(block_meta(12).hash())
    );
}
