//! Read-through cache of the accounts known to the platform.
//!
//! The snapshot is replaced wholesale on every successful refresh and never
//! patched in place. Readers get an `Arc` of the snapshot they observed, so
//! a refresh in progress is never seen half-written.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::error::BrokerError;
use crate::model::Account;
use crate::platform;
use crate::registry::ClientRegistry;

/// Pick the account to act on when none is named explicitly.
///
/// The first account of the ordered snapshot is used.
pub fn select_default_account(accounts: &[Account]) -> Option<&Account> {
    accounts.first()
}

struct Snapshot {
    /// Ticket of the refresh that produced this snapshot.
    generation: u64,
    accounts: Arc<Vec<Account>>,
}

/// Cached, ordered list of known accounts.
pub struct AccountStore {
    snapshot: RwLock<Snapshot>,
    tickets: AtomicU64,
}

impl AccountStore {
    /// Create a store with an empty snapshot.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Snapshot {
                generation: 0,
                accounts: Arc::new(Vec::new()),
            }),
            tickets: AtomicU64::new(0),
        }
    }

    /// The last refreshed snapshot, possibly empty.
    pub fn current(&self) -> Arc<Vec<Account>> {
        self.snapshot.read().accounts.clone()
    }

    /// The account [`select_default_account`] picks from the current snapshot.
    pub fn default_account(&self) -> Option<Account> {
        select_default_account(&self.current()).cloned()
    }

    /// Re-read the accounts from the platform and replace the snapshot.
    ///
    /// Returns the snapshot in place once the call completes, which is a
    /// newer listing than this call's own if a later refresh overtook it.
    /// On failure the snapshot is left unchanged.
    pub async fn refresh(&self, registry: &ClientRegistry) -> Result<Vec<Account>, BrokerError> {
        let client = registry.client()?;
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;

        let accounts = platform::call(|cb| client.list_accounts(cb))
            .await
            .map_err(|e| {
                warn!("Failed to load accounts: {}", e);
                BrokerError::Platform(e)
            })?;

        debug!("Loaded {} account(s)", accounts.len());
        let installed = self.replace(ticket, accounts);
        Ok(installed.as_ref().clone())
    }

    /// Install `accounts` unless a later refresh already did, and return the
    /// snapshot in place afterwards.
    fn replace(&self, ticket: u64, accounts: Vec<Account>) -> Arc<Vec<Account>> {
        let mut snapshot = self.snapshot.write();
        if ticket > snapshot.generation {
            *snapshot = Snapshot {
                generation: ticket,
                accounts: Arc::new(accounts),
            };
        } else {
            debug!("Discarding stale account listing {}", ticket);
        }
        snapshot.accounts.clone()
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore")
            .field("accounts", &self.current().len())
            .finish()
    }
}
