//! Module for handling all connections to the remote indexer.
//!
//! The reconciler never talks to the network directly: it sends a
//! [`FetchRequest`] to the [`crate::client::fetch::fetch`] task and awaits
//! the reply on a oneshot channel. Cancelling a pass simply stops sending
//! requests.

use futures::future::BoxFuture;
use tokio::sync::{mpsc::UnboundedSender, oneshot};

use crate::data::{AddressHash, BlockMeta, HistoryQuery, HistoryResponse};
use crate::error::TransportError;

pub mod fetch;

/// The collaborator serving remote data. Implementations live outside this
/// crate; whatever transport they use, every call may suspend and may fail
/// with a [`TransportError`].
pub trait RemoteSource: Send + Sync + 'static {
    /// The remote's current best block, or `None` before any block exists.
    fn best_block(&self) -> BoxFuture<'_, Result<Option<BlockMeta>, TransportError>>;

    /// Transaction history for a set of addresses relative to a cursor.
    fn transaction_history(
        &self,
        query: HistoryQuery,
    ) -> BoxFuture<'_, Result<HistoryResponse, TransportError>>;

    /// Which of the given addresses have ever appeared in remote history.
    fn used_addresses(
        &self,
        addresses: Vec<AddressHash>,
    ) -> BoxFuture<'_, Result<Vec<AddressHash>, TransportError>>;
}

/// Usage oracle consumed by address discovery. Implemented by the fetch
/// request channel, so discovery inside a pass rides the same fetcher task,
/// and directly by mock remotes in tests.
pub trait UsageOracle {
    fn check_used(
        &self,
        addresses: Vec<AddressHash>,
    ) -> BoxFuture<'_, Result<Vec<AddressHash>, TransportError>>;
}

/// Fetch requests are sent to the [`crate::client::fetch::fetch`] task when a
/// connection to the remote is required.
///
/// Each variant carries a [`tokio::sync::oneshot::Sender`] returning the
/// fetched data to the requester.
#[derive(Debug)]
pub enum FetchRequest {
    /// Gets the best block of the chain the remote currently serves.
    BestBlock(oneshot::Sender<Result<Option<BlockMeta>, TransportError>>),
    /// Gets one page of transaction history relative to a cursor.
    TransactionHistory(
        oneshot::Sender<Result<HistoryResponse, TransportError>>,
        HistoryQuery,
    ),
    /// Gets the subset of the given addresses with any remote history.
    UsedAddresses(
        oneshot::Sender<Result<Vec<AddressHash>, TransportError>>,
        Vec<AddressHash>,
    ),
}

/// Gets the best block from the remote.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently,
/// connected via the `fetch_request` channel.
pub async fn get_best_block(
    fetch_request_sender: UnboundedSender<FetchRequest>,
) -> Result<Option<BlockMeta>, TransportError> {
    let (sender, receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::BestBlock(sender))
        .map_err(|_| TransportError::Disconnected)?;
    receiver.await.map_err(|_| TransportError::Disconnected)?
}

/// Gets one page of transaction history from the remote.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently,
/// connected via the `fetch_request` channel.
pub async fn get_transaction_history(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    query: HistoryQuery,
) -> Result<HistoryResponse, TransportError> {
    let (sender, receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::TransactionHistory(sender, query))
        .map_err(|_| TransportError::Disconnected)?;
    receiver.await.map_err(|_| TransportError::Disconnected)?
}

/// Gets the used subset of the given addresses from the remote.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently,
/// connected via the `fetch_request` channel.
pub async fn get_used_addresses(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    addresses: Vec<AddressHash>,
) -> Result<Vec<AddressHash>, TransportError> {
    let (sender, receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::UsedAddresses(sender, addresses))
        .map_err(|_| TransportError::Disconnected)?;
    receiver.await.map_err(|_| TransportError::Disconnected)?
}

impl UsageOracle for UnboundedSender<FetchRequest> {
    fn check_used(
        &self,
        addresses: Vec<AddressHash>,
    ) -> BoxFuture<'_, Result<Vec<AddressHash>, TransportError>> {
        Box::pin(get_used_addresses(self.clone(), addresses))
    }
}
