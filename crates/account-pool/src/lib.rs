//! Leasing and lifecycle engine for a shared pool of credential accounts
//!
//! Accounts are imported in bulk, handed out to one caller at a time, used to
//! fetch a one-time verification code, and then retired or returned. The pool
//! persists every account in a JSON-backed [`AccountStore`] and layers the
//! lease state machine on top.
//!
//! Account lifecycle:
//! 1. Admin imports `identity:secret:...:refresh:client` lines → `Available`
//! 2. Caller checks out the lowest-id available account → `Leased { since_ms }`
//! 3. Caller asks the [`Verifier`] for the code; a code found → `Consumed`
//! 4. Caller gives up → `release` → `Available`
//! 5. Caller vanishes → lease TTL passes → reclaimed to `Available` on the
//!    next checkout, stats query, or reaper tick
//! 6. Admin purges consumed (or all) accounts; identifiers are never reused

pub mod account;
pub mod error;
pub mod import;
pub mod lease;
pub mod pool;
pub mod reaper;
pub mod store;
pub mod verify;

pub use account::{Account, AccountStatus, CredentialFields, PoolStats};
pub use error::{Error, Result};
pub use lease::{Checkout, LeaseManager, LeasedAccount};
pub use pool::{AccountSummary, Pool, PoolHealth, Purge};
pub use reaper::spawn_reaper_task;
pub use store::{AccountStore, Outcome};
pub use verify::{Verifier, VerifyOutcome, VerifyRequest};
