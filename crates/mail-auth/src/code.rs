//! Verification-code matching and the newest-first mailbox scan

use std::sync::LazyLock;

use common::Secret;
use regex::Regex;
use tracing::debug;

use crate::constants::CODE_LENGTH;
use crate::error::Result;
use crate::mailbox::{Mailbox, MessageSummary};

/// Six consecutive ASCII digits. `\d` would also accept non-ASCII digits.
static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("[0-9]{{{CODE_LENGTH}}}")).expect("code pattern is a valid regex")
});

/// Decides whether a message carries a verification code.
#[derive(Debug, Clone)]
pub struct CodeMatcher {
    trusted_sender: String,
}

impl CodeMatcher {
    /// `trusted_sender` is matched case-insensitively as a substring of the
    /// `From` header, so both `noreply@x.com` and `X <noreply@x.com>` match.
    pub fn new(trusted_sender: impl Into<String>) -> Self {
        Self {
            trusted_sender: trusted_sender.into().to_lowercase(),
        }
    }

    /// The first six-digit run in the subject of a trusted message.
    pub fn extract(&self, message: &MessageSummary) -> Option<String> {
        if !message.from.to_lowercase().contains(&self.trusted_sender) {
            return None;
        }
        CODE_PATTERN
            .find(&message.subject)
            .map(|m| m.as_str().to_string())
    }
}

/// Walk the mailbox newest-first until a code is found or the pages run out.
///
/// Returns `Ok(None)` after an exhaustive scan without a match. Errors from
/// the mailbox abort the scan and are returned unchanged.
pub async fn scan_mailbox(
    mailbox: &dyn Mailbox,
    matcher: &CodeMatcher,
    identity: &str,
    access_token: &Secret<String>,
) -> Result<Option<String>> {
    let mut cursor: Option<String> = None;
    let mut scanned = 0usize;

    loop {
        let page = mailbox
            .fetch_page(identity, access_token, cursor.as_deref())
            .await?;

        for message in &page.messages {
            scanned += 1;
            if let Some(code) = matcher.extract(message) {
                debug!(identity, scanned, "verification code found");
                return Ok(Some(code));
            }
        }

        match page.next {
            // A server repeating its own cursor would loop forever
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => {
                debug!(identity, scanned, "mailbox exhausted without a code");
                return Ok(None);
            }
        }
    }
}
