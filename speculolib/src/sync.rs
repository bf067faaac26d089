//! Entrypoint for the reconciliation engine.
//!
//! One pass fetches the remote history of a wallet's addresses relative to
//! its sync cursor, classifies the result against the mirror, resolves
//! vanished transactions into dropped or reorganized, extends address
//! discovery, and commits everything (including the moved cursor) as one
//! batch. A pass that fails anywhere before the commit leaves the mirror
//! exactly as it was.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;

use crate::client::fetch::fetch;
use crate::client::{get_best_block, get_transaction_history, FetchRequest, RemoteSource};
use crate::data::{
    AddressHash, BlockHash, BlockMeta, Digest, HistoryQuery, HistoryResponse, RemoteState,
    RemoteTransaction, TransactionId, TxHash, WalletId,
};
use crate::error::{SyncError, TransportError};
use crate::ledger::batch::StoreBatch;
use crate::ledger::tables::{
    BlockRecord, CertificateRecord, LastSyncInfo, Tables, TransactionRecord, UtxoInput, UtxoOutput,
};
use crate::ledger::LedgerStore;
use crate::wallet::addresses::{discover, ChainView};
use crate::wallet::confirmation_status::{ConfirmationStatus, SpendStatus};
use crate::data::OutputId;
use crate::wallet::Wallet;

/// Syncs a wallet's view of the mirror to the latest remote state.
///
/// Idempotent: with no remote change, a second call rewrites nothing but the
/// cursor timestamp. Takes the wallet mutably so passes for one wallet are
/// serialized by construction; passes for different wallets over the same
/// store may run concurrently and at worst retry on commit conflict.
pub async fn sync<R: RemoteSource>(
    remote: R,
    store: &LedgerStore,
    wallet: &mut Wallet,
) -> Result<(), SyncError> {
    tracing::info!(wallet = %wallet.id(), "Reconciling wallet against remote history...");

    // requests ride a channel to the fetcher task; dropping the sender is
    // how the pass hangs up, whether it finished or was abandoned
    let (fetch_request_sender, fetch_request_receiver) = mpsc::unbounded_channel();
    let fetcher_handle = tokio::spawn(fetch(fetch_request_receiver, remote));

    let outcome = reconcile(fetch_request_sender.clone(), store, wallet).await;

    drop(fetch_request_sender);
    fetcher_handle
        .await
        .map_err(|_| TransportError::Disconnected)?;

    outcome
}

enum FetchedHistory {
    Tail(Vec<RemoteTransaction>),
    Rollback,
}

async fn reconcile(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    store: &LedgerStore,
    wallet: &mut Wallet,
) -> Result<(), SyncError> {
    let now = unix_time();
    let wallet_id = wallet.id();
    let cursor = store.last_sync(wallet_id);

    let (monitored, pagination_after) = {
        let tables = store.read();
        let monitored: Vec<AddressHash> = tables
            .wallet_addresses(wallet_id)
            .map(|address| address.hash)
            .collect();
        let pagination_after = cursor
            .as_ref()
            .and_then(|info| info.block)
            .and_then(|block| last_known_transaction_in(&tables, wallet_id, &block));
        (monitored, pagination_after)
    };

    let best = get_best_block(fetch_request_sender.clone()).await?;

    let until = cursor.as_ref().and_then(|info| info.block);
    let page_size = wallet.config().history_page_size;
    let (remote_transactions, rollback) = match fetch_history_pages(
        &fetch_request_sender,
        &monitored,
        until,
        pagination_after,
        page_size,
    )
    .await?
    {
        FetchedHistory::Tail(transactions) => (transactions, false),
        FetchedHistory::Rollback => {
            tracing::warn!(
                wallet = %wallet_id,
                "cursor block unknown to remote; refetching from genesis"
            );
            match fetch_history_pages(&fetch_request_sender, &monitored, None, None, page_size)
                .await
            {
                Ok(FetchedHistory::Tail(transactions)) => (transactions, true),
                Ok(FetchedHistory::Rollback) => {
                    return Err(SyncError::RollbackRecovery(
                        "remote rejected a genesis-anchored refetch".to_string(),
                    ))
                }
                Err(error) => return Err(SyncError::RollbackRecovery(error.to_string())),
            }
        }
    };

    // latest observation wins per hash, then deterministic replay order
    let mut by_hash: HashMap<TxHash, RemoteTransaction> = HashMap::new();
    for transaction in remote_transactions {
        by_hash.insert(transaction.tx_hash(), transaction);
    }
    let mut remote_transactions: Vec<RemoteTransaction> = by_hash.into_values().collect();
    remote_transactions.sort_by_key(|transaction| transaction.replay_order());

    let mut batch = store.begin();
    let mut pass = PassState::default();

    {
        let tables = store.read();
        for transaction in &remote_transactions {
            classify_remote_transaction(&tables, &mut batch, &mut pass, transaction, now);
        }
        resolve_absent_transactions(
            &tables,
            &mut batch,
            &mut pass,
            wallet_id,
            rollback,
            cursor_advanced(&best, &cursor),
            now,
        );
        pass.known_blocks = tables.blocks.clone();
        pass.wallet_statuses = tables
            .wallet_transaction_ids(wallet_id)
            .into_iter()
            .filter_map(|id| tables.transaction(id))
            .map(|record| (record.tx_hash, (record.status, record.block)))
            .collect();
        tracing::debug!(
            wallet = %wallet_id,
            fetched = remote_transactions.len(),
            upserted = pass.staged_status.len(),
            rollback,
            "classified remote history"
        );
    }

    // discovery rides the same fetcher; new addresses join the same commit
    let mut discovered: Vec<AddressHash> = Vec::new();
    for chain in wallet.capability().chains() {
        let keys = wallet.capability().derivation_for(chain)?.clone();
        let view = ChainView::from_tables(&store.read(), wallet_id, chain, &pass.newly_used);
        let new_addresses = discover(
            &view,
            keys.as_ref(),
            wallet.config().gap_limit,
            Some(&fetch_request_sender),
        )
        .await?;
        for address in new_addresses {
            discovered.push(address.hash);
            batch.stage_new_address(wallet_id, chain, address.index, address.hash, address.is_used);
        }
    }

    // addresses first derived in this pass may hold history older than the
    // cursor; fetch it genesis-anchored so it lands in the same commit
    let mut all_transactions = remote_transactions;
    if !discovered.is_empty() {
        if let FetchedHistory::Tail(supplemental) =
            fetch_history_pages(&fetch_request_sender, &discovered, None, None, page_size).await?
        {
            let mut supplemental_by_hash: HashMap<TxHash, RemoteTransaction> = HashMap::new();
            for transaction in supplemental {
                if !pass.remote_hashes.contains(&transaction.tx_hash()) {
                    supplemental_by_hash.insert(transaction.tx_hash(), transaction);
                }
            }
            let mut supplemental: Vec<RemoteTransaction> =
                supplemental_by_hash.into_values().collect();
            supplemental.sort_by_key(|transaction| transaction.replay_order());
            let tables = store.read();
            for transaction in &supplemental {
                classify_remote_transaction(&tables, &mut batch, &mut pass, transaction, now);
            }
            drop(tables);
            all_transactions.extend(supplemental);
        }
    }

    {
        let tables = store.read();
        stage_resolved_rows(&tables, &mut batch, &mut pass, &all_transactions);
    }

    batch.stage_last_sync(compute_cursor(wallet_id, &pass, now));
    store.commit(batch)?;
    tracing::info!(wallet = %wallet_id, "Reconciliation pass committed.");
    Ok(())
}

/// Rolling state of one pass, shared between the classification and staging
/// phases.
#[derive(Default)]
struct PassState {
    /// Row ids assigned to transactions staged this pass.
    staged_ids: HashMap<TxHash, TransactionId>,
    /// Status (and block) each staged transaction will have after commit.
    staged_status: HashMap<TxHash, (ConfirmationStatus, Option<BlockHash>)>,
    /// Blocks staged this pass.
    staged_blocks: HashMap<BlockHash, BlockRecord>,
    /// Address hashes observed as used during this pass.
    newly_used: HashSet<AddressHash>,
    /// Hashes present in the remote response.
    remote_hashes: HashSet<TxHash>,
    /// Blocks already mirrored before the pass.
    known_blocks: std::collections::BTreeMap<BlockHash, BlockRecord>,
    /// Pre-pass status of every transaction visible to the wallet.
    wallet_statuses: HashMap<TxHash, (ConfirmationStatus, Option<BlockHash>)>,
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn cursor_advanced(best: &Option<BlockMeta>, cursor: &Option<LastSyncInfo>) -> bool {
    match (best, cursor) {
        (Some(best), Some(cursor)) => best.height() > cursor.height,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// The pagination anchor inside the cursor block: the hash of the highest
/// ordinal the mirror already holds there.
fn last_known_transaction_in(tables: &Tables, wallet: WalletId, block: &BlockHash) -> Option<TxHash> {
    tables
        .wallet_transaction_ids(wallet)
        .into_iter()
        .filter_map(|id| tables.transaction(id))
        .filter(|record| record.block.as_ref() == Some(block))
        .max_by_key(|record| record.ordinal)
        .map(|record| record.tx_hash)
}

async fn fetch_history_pages(
    fetch_request_sender: &UnboundedSender<FetchRequest>,
    addresses: &[AddressHash],
    until: Option<BlockHash>,
    mut after: Option<TxHash>,
    page_size: usize,
) -> Result<FetchedHistory, TransportError> {
    let mut transactions = Vec::new();
    loop {
        let query = HistoryQuery {
            addresses: addresses.to_vec(),
            until,
            after,
            page_size,
        };
        match get_transaction_history(fetch_request_sender.clone(), query).await? {
            HistoryResponse::Rollback => return Ok(FetchedHistory::Rollback),
            HistoryResponse::Tail(page) => {
                let page_len = page.len();
                if let Some(last) = page.last() {
                    after = Some(last.tx_hash());
                }
                transactions.extend(page);
                if page_len < page_size {
                    return Ok(FetchedHistory::Tail(transactions));
                }
            }
        }
    }
}

/// Stages the transaction-level consequence of one remote record: insert,
/// status transition, or nothing when digest and status both match.
fn classify_remote_transaction(
    tables: &Tables,
    batch: &mut StoreBatch,
    pass: &mut PassState,
    transaction: &RemoteTransaction,
    now: u64,
) {
    pass.remote_hashes.insert(transaction.tx_hash());
    let digest = Digest::of_remote(transaction);
    let (observed, block, ordinal, reported_error) = match transaction.state() {
        RemoteState::Mempool => (ConfirmationStatus::Pending, None, None, None),
        RemoteState::InBlock { block, ordinal } => (
            ConfirmationStatus::Confirmed(block.height()),
            Some(*block),
            Some(*ordinal),
            None,
        ),
        RemoteState::Failed { reason } => {
            (ConfirmationStatus::Failed, None, None, Some(reason.clone()))
        }
    };

    // usage marking for already-mirrored addresses; fresh ones are handled
    // by discovery itself
    for output in transaction.outputs() {
        if let Some(address) = tables.address_by_hash(&output.address()) {
            pass.newly_used.insert(address.hash);
            if !address.is_used {
                batch.stage_mark_used(address.id);
            }
        }
    }
    for certificate in transaction.certificates() {
        if let Some(address) = tables.address_by_hash(&certificate.staking_address()) {
            pass.newly_used.insert(address.hash);
            if !address.is_used {
                batch.stage_mark_used(address.id);
            }
        }
    }

    match tables.transaction_by_hash(&transaction.tx_hash()) {
        None => {
            let id = batch.allocate_transaction_id();
            if let Some(meta) = block {
                stage_block_once(tables, batch, pass, meta);
            }
            let record = TransactionRecord {
                id,
                tx_hash: transaction.tx_hash(),
                status: observed,
                block: block.map(|meta| meta.hash()),
                ordinal,
                digest,
                last_update_time: now,
                error_message: reported_error,
            };
            pass.staged_ids.insert(record.tx_hash, id);
            pass.staged_status
                .insert(record.tx_hash, (record.status, record.block));
            batch.stage_transaction(record);

            for (index, input) in transaction.inputs().iter().enumerate() {
                batch.stage_input(UtxoInput {
                    transaction: id,
                    index: index as u32,
                    spends: input.spends(),
                });
            }
        }
        Some(existing) => {
            let next_status = existing.status.transition(observed);
            let (next_block, next_ordinal) = if next_status.is_confirmed() {
                (block.map(|meta| meta.hash()), ordinal)
            } else {
                (None, None)
            };
            let next_error = match (&next_status, reported_error) {
                (ConfirmationStatus::Failed, Some(reason)) => Some(reason),
                (ConfirmationStatus::Failed, None) => existing.error_message.clone(),
                _ => None,
            };

            let unchanged = next_status == existing.status
                && next_block == existing.block
                && next_ordinal == existing.ordinal
                && digest == existing.digest
                && next_error == existing.error_message;
            if unchanged {
                return;
            }

            if next_status.is_confirmed() {
                if let Some(meta) = block {
                    stage_block_once(tables, batch, pass, meta);
                }
            }
            let record = TransactionRecord {
                id: existing.id,
                tx_hash: existing.tx_hash,
                status: next_status,
                block: next_block,
                ordinal: next_ordinal,
                digest,
                last_update_time: now,
                error_message: next_error,
            };
            pass.staged_ids.insert(record.tx_hash, existing.id);
            pass.staged_status
                .insert(record.tx_hash, (record.status, record.block));
            batch.stage_transaction(record);
        }
    }
}

fn stage_block_once(tables: &Tables, batch: &mut StoreBatch, pass: &mut PassState, meta: BlockMeta) {
    if tables.block(&meta.hash()).is_some() || pass.staged_blocks.contains_key(&meta.hash()) {
        return;
    }
    let record = BlockRecord {
        hash: meta.hash(),
        height: meta.height(),
        epoch: meta.epoch(),
        slot: meta.slot(),
        time: meta.time(),
    };
    pass.staged_blocks.insert(record.hash, record.clone());
    batch.stage_block(record);
}

/// Applies the dropped-versus-reorganized distinction to every wallet
/// transaction that vanished from the response.
fn resolve_absent_transactions(
    tables: &Tables,
    batch: &mut StoreBatch,
    pass: &mut PassState,
    wallet: WalletId,
    rollback: bool,
    advanced: bool,
    now: u64,
) {
    for id in tables.wallet_transaction_ids(wallet) {
        let record = match tables.transaction(id) {
            Some(record) => record,
            None => continue,
        };
        if pass.remote_hashes.contains(&record.tx_hash) {
            continue;
        }

        let next_status = if rollback {
            // the refetch window reaches back to genesis, so any live
            // transaction missing from it was carried only by rolled-back
            // blocks (or a mempool that no longer exists)
            record.status.invalidated_by_reorg()
        } else if advanced {
            record.status.evicted()
        } else {
            record.status
        };
        if next_status == record.status {
            continue;
        }

        let updated = TransactionRecord {
            id: record.id,
            tx_hash: record.tx_hash,
            status: next_status,
            block: None,
            ordinal: None,
            digest: record.digest,
            last_update_time: now,
            error_message: record.error_message.clone(),
        };
        pass.staged_ids.insert(updated.tx_hash, updated.id);
        pass.staged_status
            .insert(updated.tx_hash, (updated.status, updated.block));
        batch.stage_transaction(updated);
    }
}

/// Stages the rows that needed address resolution: outputs and certificates.
/// Runs after discovery so outputs paying an address first derived in this
/// very pass still land in the same commit.
fn stage_resolved_rows(
    tables: &Tables,
    batch: &mut StoreBatch,
    pass: &mut PassState,
    remote_transactions: &[RemoteTransaction],
) {
    let mut staged_outputs: HashSet<OutputId> = HashSet::new();
    let mut staged_certificates: Vec<CertificateRecord> = Vec::new();

    for transaction in remote_transactions {
        let id = match pass
            .staged_ids
            .get(&transaction.tx_hash())
            .copied()
            .or_else(|| {
                tables
                    .transaction_by_hash(&transaction.tx_hash())
                    .map(|record| record.id)
            }) {
            Some(id) => id,
            None => continue,
        };

        for (index, output) in transaction.outputs().iter().enumerate() {
            let output_id = OutputId::from_parts(id, index as u32);
            if tables.output(output_id).is_some() || staged_outputs.contains(&output_id) {
                continue;
            }
            let address = tables
                .address_by_hash(&output.address())
                .map(|address| address.id)
                .or_else(|| {
                    batch
                        .staged_address_by_hash(&output.address())
                        .map(|address| address.id)
                });
            if let Some(address) = address {
                staged_outputs.insert(output_id);
                batch.stage_output(UtxoOutput {
                    output_id,
                    address,
                    value: output.value(),
                    spend: SpendStatus::Unspent,
                });
            }
        }

        for certificate in transaction.certificates() {
            let staking_address = tables
                .address_by_hash(&certificate.staking_address())
                .map(|address| address.id)
                .or_else(|| {
                    batch
                        .staged_address_by_hash(&certificate.staking_address())
                        .map(|address| address.id)
                });
            let staking_address = match staking_address {
                Some(address) => address,
                None => continue,
            };
            let record = CertificateRecord {
                transaction: id,
                kind: certificate.kind(),
                payload: certificate.payload().to_vec(),
                staking_address,
            };
            if tables.certificates_of(id).contains(&record) || staged_certificates.contains(&record)
            {
                continue;
            }
            staged_certificates.push(record.clone());
            batch.stage_certificate(record);
        }
    }
}

/// The post-pass cursor: the highest block still holding one of the wallet's
/// confirmed transactions, or genesis when none remains.
fn compute_cursor(wallet: WalletId, pass: &PassState, now: u64) -> LastSyncInfo {
    let mut final_statuses = pass.wallet_statuses.clone();
    for (tx_hash, status) in &pass.staged_status {
        final_statuses.insert(*tx_hash, *status);
    }

    let best_block = final_statuses
        .values()
        .filter(|(status, _)| status.is_confirmed())
        .filter_map(|(_, block)| block.as_ref())
        .filter_map(|hash| {
            pass.staged_blocks
                .get(hash)
                .or_else(|| pass.known_blocks.get(hash))
        })
        .max_by_key(|block| (block.height, block.hash));

    match best_block {
        Some(block) => LastSyncInfo {
            wallet,
            block: Some(block.hash),
            height: block.height,
            slot: Some(block.slot),
            time: Some(now),
        },
        None => LastSyncInfo::genesis(wallet, Some(now)),
    }
}
