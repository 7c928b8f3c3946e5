use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use web3::types::Address;

use crate::metadata::TokenMetadataProvider;
use crate::types::{MarketSnapshot, TokenEntry};

/// Merged rows, replaced as a whole on every update.
pub type TokenList = Arc<Vec<TokenEntry>>;

/// Ordered union without duplicates; order is first appearance in `first` followed by `second`.
pub fn merge_token_addresses(first: &[Address], second: &[Address]) -> Vec<Address> {
    let mut seen = HashSet::with_capacity(first.len() + second.len());
    first
        .iter()
        .chain(second.iter())
        .filter(|address| seen.insert(**address))
        .copied()
        .collect()
}

fn snapshot_addresses(snapshot: &MarketSnapshot) -> Vec<Address> {
    snapshot
        .as_ref()
        .map(|markets| markets.iter().map(|m| m.token_address).collect())
        .unwrap_or_default()
}

async fn next_change(
    aave: &mut watch::Receiver<MarketSnapshot>,
    compound: &mut watch::Receiver<MarketSnapshot>,
) -> Result<(), watch::error::RecvError> {
    tokio::select! {
        changed = aave.changed() => changed,
        changed = compound.changed() => changed,
    }
}

/// Keeps the merged token list of both protocols and its metadata up to date.
///
/// Every change of the merged address list publishes placeholders first, then one update
/// per completed metadata lookup. Rows already resolved keep their metadata across
/// changes; a failed lookup leaves its row pending until the list changes again.
pub struct TokenResolver {
    rx: watch::Receiver<TokenList>,
    handle: JoinHandle<()>,
}

impl TokenResolver {
    pub fn spawn(
        provider: Arc<dyn TokenMetadataProvider>,
        mut aave: watch::Receiver<MarketSnapshot>,
        mut compound: watch::Receiver<MarketSnapshot>,
    ) -> Self {
        let (tx, rx) = watch::channel(TokenList::default());

        let handle = tokio::spawn(async move {
            let mut entries: Vec<TokenEntry> = Vec::new();
            let mut lookups = FuturesUnordered::new();

            loop {
                let aave_addresses = snapshot_addresses(&aave.borrow_and_update());
                let compound_addresses = snapshot_addresses(&compound.borrow_and_update());
                let addresses = merge_token_addresses(&aave_addresses, &compound_addresses);

                let unchanged = addresses.len() == entries.len()
                    && addresses.iter().zip(&entries).all(|(a, e)| *a == e.address);

                if !unchanged {
                    log::debug!(
                        "[TokenResolver::run] Token list changed: {} -> {} tokens",
                        entries.len(),
                        addresses.len()
                    );

                    entries = addresses
                        .into_iter()
                        .map(|address| {
                            entries
                                .iter()
                                .find(|e| e.address == address)
                                .cloned()
                                .unwrap_or_else(|| TokenEntry::pending(address))
                        })
                        .collect();

                    lookups = FuturesUnordered::new();
                    for entry in entries.iter().filter(|e| e.data.is_none()) {
                        let provider = provider.clone();
                        let address = entry.address;
                        lookups.push(async move { (address, provider.token_data(address).await) });
                    }

                    tx.send_replace(Arc::new(entries.clone()));
                }

                loop {
                    tokio::select! {
                        changed = next_change(&mut aave, &mut compound) => {
                            if changed.is_err() {
                                log::debug!("[TokenResolver::run] Market source closed, stopping");
                                return;
                            }
                            break;
                        }
                        Some((address, result)) = lookups.next(), if !lookups.is_empty() => {
                            match result {
                                Ok(token) => {
                                    if let Some(entry) = entries.iter_mut().find(|e| e.address == address) {
                                        entry.data = Some(token);
                                    }
                                    tx.send_replace(Arc::new(entries.clone()));
                                }
                                Err(e) => {
                                    log::warn!(
                                        "[TokenResolver::run] Metadata lookup for {:?} failed: {}",
                                        address,
                                        e
                                    );
                                }
                            }
                        }
                    }
                }
            }
        });

        Self { rx, handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<TokenList> {
        self.rx.clone()
    }
}

impl Drop for TokenResolver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
