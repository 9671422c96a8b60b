//! Background lease reaper
//!
//! Checkout and stats queries already reclaim expired leases on demand. The
//! reaper covers idle periods, so the persisted file and the gauges stop
//! showing abandoned leases even when nobody is calling in.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::lease::LeaseManager;

/// Spawn a task that reclaims expired leases every `interval`.
///
/// Store failures are logged and retried on the next tick.
pub fn spawn_reaper_task(leases: Arc<LeaseManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately; startup has nothing to reap yet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            reap_cycle(&leases).await;
        }
    })
}

/// Run one reclamation pass. Returns the number of leases reclaimed.
async fn reap_cycle(leases: &LeaseManager) -> usize {
    match leases.reclaim_now().await {
        Ok(0) => {
            debug!("reaper found no expired leases");
            0
        }
        Ok(reclaimed) => {
            info!(reclaimed, "reaper reclaimed expired leases");
            reclaimed
        }
        Err(e) => {
            warn!(error = %e, "reaper pass failed, will retry next cycle");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountStatus, CredentialFields};
    use crate::store::AccountStore;

    async fn test_manager(dir: &tempfile::TempDir, ttl: Duration) -> Arc<LeaseManager> {
        let store = AccountStore::load(dir.path().join("accounts.json"))
            .await
            .unwrap();
        store
            .insert(CredentialFields {
                identity: "u1@example.com".into(),
                secret: "p1".into(),
                refresh_credential: "rt_1".into(),
                client_identifier: "client-1".into(),
            })
            .await
            .unwrap();
        Arc::new(LeaseManager::new(Arc::new(store), ttl))
    }

    #[tokio::test]
    async fn reap_cycle_reclaims_old_lease() {
        let dir = tempfile::tempdir().unwrap();
        let leases = test_manager(&dir, Duration::from_secs(60)).await;
        leases
            .store()
            .update_status(1, AccountStatus::Leased { since_ms: 1 })
            .await
            .unwrap();

        assert_eq!(reap_cycle(&leases).await, 1);
        assert_eq!(
            leases.store().get(1).await.unwrap().status,
            AccountStatus::Available
        );
    }

    #[tokio::test]
    async fn reap_cycle_leaves_fresh_lease() {
        let dir = tempfile::tempdir().unwrap();
        let leases = test_manager(&dir, Duration::from_secs(600)).await;
        leases.checkout().await.unwrap();

        assert_eq!(reap_cycle(&leases).await, 0);
        assert!(matches!(
            leases.store().get(1).await.unwrap().status,
            AccountStatus::Leased { .. }
        ));
    }

    #[tokio::test]
    async fn reaper_task_runs_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let leases = test_manager(&dir, Duration::from_secs(60)).await;
        leases
            .store()
            .update_status(1, AccountStatus::Leased { since_ms: 1 })
            .await
            .unwrap();

        let handle = spawn_reaper_task(leases.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(
            leases.store().get(1).await.unwrap().status,
            AccountStatus::Available
        );
    }
}
