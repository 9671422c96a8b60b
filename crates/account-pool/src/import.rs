//! Bulk import text format
//!
//! One account per line, colon-separated:
//!
//! ```text
//! identity:secret:refresh_credential:client_identifier
//! identity:secret:anything:...:refresh_credential:client_identifier
//! ```
//!
//! The first two fields are always the identity and secret and the last two
//! are always the refresh credential and client identifier; anything in
//! between is ignored. Lines with fewer than four fields, and blank lines,
//! are skipped.

use crate::account::CredentialFields;

/// Minimum number of colon-separated fields for a line to be accepted.
pub const MIN_FIELDS: usize = 4;

/// Parse one line. `None` for blank or malformed lines.
pub fn parse_line(line: &str) -> Option<CredentialFields> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let parts: Vec<&str> = line.split(':').collect();
    let n = parts.len();
    if n < MIN_FIELDS {
        return None;
    }

    Some(CredentialFields {
        identity: parts[0].to_string(),
        secret: parts[1].to_string(),
        refresh_credential: parts[n - 2].to_string(),
        client_identifier: parts[n - 1].to_string(),
    })
}

/// Parse every acceptable line of `text`, in order.
pub fn parse_batch(text: &str) -> Vec<CredentialFields> {
    text.lines().filter_map(parse_line).collect()
}
