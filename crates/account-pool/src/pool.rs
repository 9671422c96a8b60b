//! Pool-wide views and bulk operations
//!
//! Stats, listing, import, and purge. Every read of aggregate state runs a
//! reclamation pass first, so counts never include leases that have already
//! expired.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::account::{AccountStatus, PoolStats};
use crate::error::Result;
use crate::import;
use crate::lease::LeaseManager;
use crate::store::AccountStore;

/// Which accounts a purge deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purge {
    Consumed,
    All,
}

impl Purge {
    fn matches(self, status: &AccountStatus) -> bool {
        match self {
            Purge::Consumed => *status == AccountStatus::Consumed,
            Purge::All => true,
        }
    }
}

/// Account as shown to administrators. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: u64,
    pub status: &'static str,
    pub leased_at: Option<u64>,
}

/// Pool status for the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolHealth {
    /// "healthy", "degraded", or "unhealthy"
    pub status: &'static str,
    pub accounts_total: usize,
    pub accounts_available: usize,
    pub accounts_leased: usize,
    pub accounts_consumed: usize,
}

/// Account pool: the lease manager plus aggregate and bulk operations.
pub struct Pool {
    leases: Arc<LeaseManager>,
    store: Arc<AccountStore>,
}

impl Pool {
    pub fn new(leases: Arc<LeaseManager>) -> Self {
        let store = leases.store().clone();
        Self { leases, store }
    }

    /// The lease manager for checkout, release, and finalize.
    pub fn leases(&self) -> &Arc<LeaseManager> {
        &self.leases
    }

    /// Counts by status, after reclaiming expired leases.
    pub async fn stats(&self) -> Result<PoolStats> {
        self.leases.reclaim_now().await?;
        let stats = self.store.count_by_status().await;

        metrics::gauge!("pool_accounts", "status" => "available").set(stats.available as f64);
        metrics::gauge!("pool_accounts", "status" => "leased").set(stats.leased as f64);
        metrics::gauge!("pool_accounts", "status" => "consumed").set(stats.consumed as f64);

        Ok(stats)
    }

    /// Health summary.
    ///
    /// Healthy while any account is available. Degraded when all remaining
    /// accounts are leased, since leases come back on release or expiry.
    /// Unhealthy when nothing is available or leased.
    pub async fn health(&self) -> Result<PoolHealth> {
        let stats = self.stats().await?;
        let status = if stats.available > 0 {
            "healthy"
        } else if stats.leased > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        Ok(PoolHealth {
            status,
            accounts_total: stats.total(),
            accounts_available: stats.available,
            accounts_leased: stats.leased,
            accounts_consumed: stats.consumed,
        })
    }

    /// All accounts, ordered by id, without credentials.
    pub async fn accounts(&self) -> Result<Vec<AccountSummary>> {
        self.leases.reclaim_now().await?;
        Ok(self
            .store
            .list()
            .await
            .into_iter()
            .map(|a| AccountSummary {
                id: a.id,
                status: a.status.label(),
                leased_at: a.leased_at(),
            })
            .collect())
    }

    /// Import newline-separated account lines. Returns the number inserted.
    ///
    /// Malformed lines are skipped; the well-formed ones are stored with one
    /// write.
    pub async fn bulk_import(&self, raw: &str) -> Result<usize> {
        let batch = import::parse_batch(raw);
        let lines = raw.lines().filter(|l| !l.trim().is_empty()).count();
        let skipped = lines - batch.len();
        if skipped > 0 {
            warn!(skipped, "import skipped malformed lines");
        }

        let ids = self.store.insert_many(batch).await?;
        info!(
            added = ids.len(),
            first_id = ids.first(),
            last_id = ids.last(),
            "accounts imported"
        );
        metrics::counter!("pool_imported_total").increment(ids.len() as u64);
        Ok(ids.len())
    }

    /// Delete accounts unconditionally. Returns the number deleted.
    pub async fn purge(&self, which: Purge) -> Result<usize> {
        let deleted = self
            .store
            .delete_where(|account| which.matches(&account.status))
            .await?;
        info!(deleted, scope = ?which, "accounts purged");
        Ok(deleted)
    }
}
