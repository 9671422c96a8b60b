//! Collaborator defaults
//!
//! These are the values the service falls back to when the configuration
//! leaves them out. None of them are secrets.

/// Microsoft identity platform token endpoint (multi-tenant)
pub const DEFAULT_TOKEN_ENDPOINT: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Graph REST base for the signed-in user's mailbox
pub const DEFAULT_MAILBOX_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";

/// Scope requested on refresh. `offline_access` keeps the refresh token valid.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/Mail.Read offline_access";

/// Sender whose messages carry verification codes
pub const DEFAULT_TRUSTED_SENDER: &str = "noreply@redditmail.com";

/// Messages requested per mailbox page
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Number of consecutive digits that make up a verification code
pub const CODE_LENGTH: usize = 6;
