//! Mailbox verification-code collaborators
//!
//! Everything the account pool needs from the outside world to turn a leased
//! account into a verification code lives here, behind two traits:
//!
//! 1. [`TokenSource`] exchanges an account's long-lived refresh credential for
//!    a short-lived access token (`OAuthTokenSource` talks to an OAuth token
//!    endpoint with `grant_type=refresh_token`)
//! 2. [`Mailbox`] lists inbox messages newest-first, one page at a time
//!    (`GraphMailbox` talks to a Graph-style REST mailbox)
//!
//! [`scan_mailbox`] walks those pages with a [`CodeMatcher`] and stops at the
//! first message from the trusted sender carrying a six-digit code. The crate
//! has no knowledge of the pool; the pool's verification adapter drives it.

pub mod code;
pub mod constants;
pub mod error;
pub mod mailbox;
pub mod token;

pub use code::{CodeMatcher, scan_mailbox};
pub use constants::*;
pub use error::{Error, Result};
pub use mailbox::{GraphMailbox, Mailbox, MessagePage, MessageSummary};
pub use token::{OAuthTokenSource, TokenResponse, TokenSource};
