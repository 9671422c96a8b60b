//! Lease state machine
//!
//! Hands out accounts one caller at a time and takes them back. The lease
//! manager holds no lock of its own: checkout is the store's atomic
//! "claim the lowest-id available account" and every other transition is a
//! single-record conditional update, so all of them may run concurrently.
//!
//! Expired leases heal passively. Every checkout first runs a reclamation
//! pass that returns leases older than the TTL to `Available`; the pool runs
//! the same pass before stats queries and the reaper task runs it on a timer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::account::{AccountStatus, CredentialFields};
use crate::error::Result;
use crate::store::{AccountStore, Outcome};

/// An account handed to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedAccount {
    pub id: u64,
    pub fields: CredentialFields,
    /// Unix epoch milliseconds when the lease was granted
    pub leased_at: u64,
}

/// Result of a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkout {
    Leased(LeasedAccount),
    /// No account is available. Not an error.
    Empty,
}

/// Concurrency-safe checkout / release / finalize / reclaim over the store.
pub struct LeaseManager {
    store: Arc<AccountStore>,
    lease_ttl: Duration,
}

impl LeaseManager {
    pub fn new(store: Arc<AccountStore>, lease_ttl: Duration) -> Self {
        info!(lease_ttl_secs = lease_ttl.as_secs(), "lease manager initialized");
        Self { store, lease_ttl }
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Lease the lowest-id available account.
    ///
    /// Runs a reclamation pass first, so an abandoned lease is handed out
    /// again as soon as its TTL has passed.
    pub async fn checkout(&self) -> Result<Checkout> {
        self.reclaim_now().await?;

        let now = common::unix_millis();
        match self.store.claim_first_available(now).await? {
            Some(account) => {
                info!(account_id = account.id, "account leased");
                metrics::counter!("pool_checkouts_total", "result" => "leased").increment(1);
                Ok(Checkout::Leased(LeasedAccount {
                    id: account.id,
                    fields: account.fields,
                    leased_at: now,
                }))
            }
            None => {
                debug!("checkout found no available account");
                metrics::counter!("pool_checkouts_total", "result" => "empty").increment(1);
                Ok(Checkout::Empty)
            }
        }
    }

    /// Return a leased account to the pool.
    ///
    /// Releasing an available account is `Unchanged`. Releasing a consumed
    /// account is also `Unchanged`: a caller may race the finalize of its own
    /// lease, and consumption must win.
    pub async fn release(&self, id: u64) -> Result<Outcome> {
        let outcome = self
            .store
            .transition(id, |status| match status {
                AccountStatus::Leased { .. } => Some(AccountStatus::Available),
                AccountStatus::Available | AccountStatus::Consumed => None,
            })
            .await?;

        if outcome == Outcome::Updated {
            info!(account_id = id, "lease released");
            metrics::counter!("pool_releases_total").increment(1);
        } else {
            debug!(account_id = id, ?outcome, "release was a no-op");
        }
        Ok(outcome)
    }

    /// Retire an account after its verification code was retrieved.
    ///
    /// Valid from `Leased` and from `Available` (the lease may already have
    /// been reclaimed). Finalizing a consumed account is `Unchanged`.
    pub async fn finalize_consumed(&self, id: u64) -> Result<Outcome> {
        let outcome = self
            .store
            .transition(id, |status| match status {
                AccountStatus::Consumed => None,
                AccountStatus::Leased { .. } | AccountStatus::Available => {
                    Some(AccountStatus::Consumed)
                }
            })
            .await?;

        if outcome == Outcome::Updated {
            info!(account_id = id, "account consumed");
            metrics::counter!("pool_consumed_total").increment(1);
        } else {
            debug!(account_id = id, ?outcome, "finalize was a no-op");
        }
        Ok(outcome)
    }

    /// Return every lease older than `lease_ttl` at `now_ms` to `Available`.
    ///
    /// A lease is expired when `now_ms - leased_at > lease_ttl`. The age check
    /// and the write happen under the store lock, so a lease finalized or
    /// re-granted concurrently is never reclaimed on a stale reading.
    /// Returns the number of leases reclaimed.
    pub async fn reclaim_expired(&self, now_ms: u64, lease_ttl: Duration) -> Result<usize> {
        let ttl_ms = u64::try_from(lease_ttl.as_millis()).unwrap_or(u64::MAX);
        let reclaimed = self
            .store
            .update_where(|account| match account.status {
                AccountStatus::Leased { since_ms } if now_ms.saturating_sub(since_ms) > ttl_ms => {
                    Some(AccountStatus::Available)
                }
                _ => None,
            })
            .await?;

        for id in &reclaimed {
            info!(account_id = id, ttl_secs = lease_ttl.as_secs(), "expired lease reclaimed");
        }
        if !reclaimed.is_empty() {
            metrics::counter!("pool_reclaimed_total").increment(reclaimed.len() as u64);
        }
        Ok(reclaimed.len())
    }

    /// Reclaim against the wall clock and the configured TTL.
    pub async fn reclaim_now(&self) -> Result<usize> {
        self.reclaim_expired(common::unix_millis(), self.lease_ttl)
            .await
    }
}
