//! Durable account table
//!
//! Keeps every account in memory, ordered by id, and mirrors the table to a
//! JSON file. A tokio Mutex serializes all access. Each mutation is applied to
//! a copy of the table, written with an atomic temp-file + rename, and only
//! then swapped in, so a failed write leaves memory and disk at the previous
//! state and no caller ever observes a half-applied change.
//!
//! Every mutation clones the whole table and rewrites the whole file, so a
//! write costs O(N) in the number of accounts. Fine for pools of thousands;
//! larger pools want an append log or an embedded database instead.
//!
//! Conditional updates (`claim_first_available`, `transition`,
//! `update_where`) evaluate their condition and apply their change inside one
//! acquisition of the mutex. That is what makes checkout and reclamation safe
//! without any lock in the lease manager.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::{Account, AccountStatus, CredentialFields, PoolStats};
use crate::error::{Error, Result};

/// Result of a targeted status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The account moved to the new status
    Updated,
    /// The account exists but the transition did not apply
    Unchanged,
    /// No account has this id
    NotFound,
}

/// On-disk and in-memory shape of the table.
///
/// `next_id` only ever grows, so ids of purged accounts are never handed out
/// again.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Table {
    next_id: u64,
    accounts: BTreeMap<u64, Account>,
}

impl Table {
    fn allocate(&mut self, fields: CredentialFields) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.accounts.insert(
            id,
            Account {
                id,
                fields,
                status: AccountStatus::Available,
            },
        );
        id
    }
}

/// Thread-safe, file-backed account table.
pub struct AccountStore {
    path: PathBuf,
    state: Mutex<Table>,
}

impl AccountStore {
    /// Load the table from `path`.
    ///
    /// A missing file is a cold start: the parent directory and an empty
    /// table are created. A file that does not parse is reported as
    /// `Corrupt` rather than silently replaced.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let table = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading account store: {e}")))?;
            let mut table: Table = serde_json::from_str(&contents)
                .map_err(|e| Error::Corrupt(format!("parsing {}: {e}", path.display())))?;

            if let Some(max_id) = table.accounts.keys().next_back().copied() {
                if table.next_id <= max_id {
                    warn!(
                        next_id = table.next_id,
                        max_id, "next_id behind stored ids, advancing"
                    );
                    table.next_id = max_id + 1;
                }
            }
            for (key, account) in &table.accounts {
                if *key != account.id {
                    return Err(Error::Corrupt(format!(
                        "record keyed {key} carries id {}",
                        account.id
                    )));
                }
            }

            info!(path = %path.display(), accounts = table.accounts.len(), "loaded account store");
            table
        } else {
            info!(path = %path.display(), "account store not found, starting empty");
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Io(format!("creating store directory: {e}")))?;
            }
            let table = Table {
                next_id: 1,
                accounts: BTreeMap::new(),
            };
            write_atomic(&path, &table).await?;
            table
        };

        Ok(Self {
            path,
            state: Mutex::new(table),
        })
    }

    /// Insert one account as `Available` and return its id.
    pub async fn insert(&self, fields: CredentialFields) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let id = next.allocate(fields);
        self.commit(&mut state, next).await?;
        debug!(account_id = id, "inserted account");
        Ok(id)
    }

    /// Insert a batch with a single write. Either all are stored or none.
    pub async fn insert_many(&self, batch: Vec<CredentialFields>) -> Result<Vec<u64>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let ids: Vec<u64> = batch.into_iter().map(|f| next.allocate(f)).collect();
        self.commit(&mut state, next).await?;
        debug!(count = ids.len(), "inserted account batch");
        Ok(ids)
    }

    /// Get a copy of one account.
    pub async fn get(&self, id: u64) -> Option<Account> {
        let state = self.state.lock().await;
        state.accounts.get(&id).cloned()
    }

    /// Copies of all accounts, ordered by id.
    pub async fn list(&self) -> Vec<Account> {
        let state = self.state.lock().await;
        state.accounts.values().cloned().collect()
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        self.state.lock().await.accounts.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Set an account's status unconditionally.
    pub async fn update_status(&self, id: u64, status: AccountStatus) -> Result<Outcome> {
        self.transition(id, |_| Some(status)).await
    }

    /// Apply `decide` to an account's current status and store its answer.
    ///
    /// `decide` returning `None`, or the status the account already has,
    /// leaves the record untouched (`Unchanged`, no write).
    pub async fn transition<F>(&self, id: u64, decide: F) -> Result<Outcome>
    where
        F: FnOnce(&AccountStatus) -> Option<AccountStatus>,
    {
        let mut state = self.state.lock().await;
        let current = match state.accounts.get(&id) {
            Some(account) => account.status,
            None => return Ok(Outcome::NotFound),
        };
        let new_status = match decide(&current) {
            Some(s) if s != current => s,
            _ => return Ok(Outcome::Unchanged),
        };

        let mut next = state.clone();
        if let Some(account) = next.accounts.get_mut(&id) {
            account.status = new_status;
        }
        self.commit(&mut state, next).await?;
        Ok(Outcome::Updated)
    }

    /// Lease the lowest-id `Available` account at `now_ms`.
    ///
    /// The scan and the mark happen under one lock acquisition, so two
    /// concurrent callers can never claim the same account.
    pub async fn claim_first_available(&self, now_ms: u64) -> Result<Option<Account>> {
        let mut state = self.state.lock().await;
        let id = match state
            .accounts
            .values()
            .find(|a| a.status == AccountStatus::Available)
        {
            Some(account) => account.id,
            None => return Ok(None),
        };

        let mut next = state.clone();
        let claimed = match next.accounts.get_mut(&id) {
            Some(account) => {
                account.status = AccountStatus::Leased { since_ms: now_ms };
                account.clone()
            }
            None => return Ok(None),
        };
        self.commit(&mut state, next).await?;
        Ok(Some(claimed))
    }

    /// Apply `decide` to every account; store all changes with one write.
    ///
    /// Returns the ids that changed.
    pub async fn update_where<F>(&self, decide: F) -> Result<Vec<u64>>
    where
        F: Fn(&Account) -> Option<AccountStatus>,
    {
        let mut state = self.state.lock().await;
        let changes: Vec<(u64, AccountStatus)> = state
            .accounts
            .values()
            .filter_map(|a| decide(a).filter(|s| *s != a.status).map(|s| (a.id, s)))
            .collect();
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let mut next = state.clone();
        for (id, status) in &changes {
            if let Some(account) = next.accounts.get_mut(id) {
                account.status = *status;
            }
        }
        self.commit(&mut state, next).await?;
        Ok(changes.into_iter().map(|(id, _)| id).collect())
    }

    /// Delete every account matching `predicate`. Returns the number deleted.
    pub async fn delete_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&Account) -> bool,
    {
        let mut state = self.state.lock().await;
        let doomed = state.accounts.values().filter(|a| predicate(a)).count();
        if doomed == 0 {
            return Ok(0);
        }

        let mut next = state.clone();
        next.accounts.retain(|_, a| !predicate(a));
        self.commit(&mut state, next).await?;
        debug!(count = doomed, "deleted accounts");
        Ok(doomed)
    }

    /// Counts by status.
    pub async fn count_by_status(&self) -> PoolStats {
        let state = self.state.lock().await;
        let mut stats = PoolStats::default();
        for account in state.accounts.values() {
            stats.count(&account.status);
        }
        stats
    }

    /// Persist `next`, then make it the live table.
    async fn commit(&self, live: &mut Table, next: Table) -> Result<()> {
        write_atomic(&self.path, &next).await?;
        *live = next;
        Ok(())
    }
}

/// Write the table to a file atomically.
///
/// Writes a temporary file next to the target and renames it over the
/// target. File permissions are 0600 since records carry secrets.
async fn write_atomic(path: &Path, table: &Table) -> Result<()> {
    let json = serde_json::to_string_pretty(table)
        .map_err(|e| Error::Corrupt(format!("serializing account store: {e}")))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("account store path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp store file: {e}")))?;

    Ok(())
}
