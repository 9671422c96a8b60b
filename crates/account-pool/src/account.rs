//! Account records and their status

use std::fmt;

use serde::{Deserialize, Serialize};

/// The opaque credential strings carried by an account.
///
/// The pool never interprets these; they are handed back verbatim on
/// checkout and passed to the verification collaborators.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialFields {
    pub identity: String,
    pub secret: String,
    pub refresh_credential: String,
    pub client_identifier: String,
}

impl fmt::Debug for CredentialFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialFields")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .field("refresh_credential", &"[REDACTED]")
            .field("client_identifier", &self.client_identifier)
            .finish()
    }
}

/// Lease status of an account.
///
/// Transitions:
/// - Available → Leased (checkout)
/// - Leased → Available (release, or lease TTL expired)
/// - Leased | Available → Consumed (verification code retrieved)
/// - Consumed → (purged by admin)
///
/// The lease timestamp only exists inside `Leased`, so an account can never
/// carry a stale `leased_at` after it leaves that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AccountStatus {
    Available,
    Leased {
        /// Unix epoch milliseconds when the lease was granted
        since_ms: u64,
    },
    Consumed,
}

impl AccountStatus {
    /// Status label for APIs and logging.
    pub fn label(&self) -> &'static str {
        match self {
            AccountStatus::Available => "available",
            AccountStatus::Leased { .. } => "leased",
            AccountStatus::Consumed => "consumed",
        }
    }
}

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    #[serde(flatten)]
    pub fields: CredentialFields,
    pub status: AccountStatus,
}

impl Account {
    /// When the current lease was granted; `None` unless leased.
    pub fn leased_at(&self) -> Option<u64> {
        match self.status {
            AccountStatus::Leased { since_ms } => Some(since_ms),
            _ => None,
        }
    }
}

/// Account counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub available: usize,
    pub leased: usize,
    pub consumed: usize,
}

impl PoolStats {
    pub fn total(&self) -> usize {
        self.available + self.leased + self.consumed
    }

    pub(crate) fn count(&mut self, status: &AccountStatus) {
        match status {
            AccountStatus::Available => self.available += 1,
            AccountStatus::Leased { .. } => self.leased += 1,
            AccountStatus::Consumed => self.consumed += 1,
        }
    }
}
