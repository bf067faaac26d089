//! Queue and prioritise fetch requests to the remote.

use tokio::sync::mpsc::UnboundedReceiver;

use crate::client::{FetchRequest, RemoteSource};

/// Receives [`crate::client::FetchRequest`]s and services them against the
/// remote, one bounded request at a time. Returns when all senders are
/// dropped, which is how a pass hangs up.
pub async fn fetch<R: RemoteSource>(mut fetch_request_receiver: UnboundedReceiver<FetchRequest>, remote: R) {
    while let Some(fetch_request) = fetch_request_receiver.recv().await {
        fetch_from_remote(&remote, fetch_request).await;
    }
}

async fn fetch_from_remote<R: RemoteSource>(remote: &R, fetch_request: FetchRequest) {
    match fetch_request {
        FetchRequest::BestBlock(sender) => {
            tracing::debug!("Fetching best block.");
            let response = remote.best_block().await;
            // a dropped receiver means the requesting pass was cancelled
            let _ = sender.send(response);
        }
        FetchRequest::TransactionHistory(sender, query) => {
            tracing::debug!(
                addresses = query.addresses.len(),
                "Fetching transaction history page."
            );
            let response = remote.transaction_history(query).await;
            let _ = sender.send(response);
        }
        FetchRequest::UsedAddresses(sender, addresses) => {
            tracing::debug!(count = addresses.len(), "Fetching address usage.");
            let response = remote.used_addresses(addresses).await;
            let _ = sender.send(response);
        }
    }
}
