//! Verification workflow
//!
//! Turns a leased account into a verification code:
//! 1. Exchange the account's refresh credential for an access token
//! 2. Scan the mailbox newest-first for a code from the trusted sender
//! 3. Code found → finalize the account as consumed
//!
//! The verifier owns no state. When no code is found, or a collaborator
//! fails, the lease is left exactly as it was; the caller decides whether to
//! retry or release.

use std::sync::Arc;
use std::time::Duration;

use mail_auth::{CodeMatcher, Mailbox, TokenSource};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::lease::LeaseManager;

/// What the caller knows about its leased account.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub id: u64,
    pub identity: String,
    pub refresh_credential: String,
    pub client_identifier: String,
}

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// A code was found and the account is now consumed
    Code(String),
    /// The mailbox was scanned completely without a matching message
    NotFound,
    /// Token exchange or mailbox access failed or timed out
    CollaboratorError(String),
}

impl VerifyOutcome {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            VerifyOutcome::Code(_) => "code",
            VerifyOutcome::NotFound => "not_found",
            VerifyOutcome::CollaboratorError(_) => "collaborator_error",
        }
    }
}

/// Orchestrates token exchange, mailbox scan, and finalize.
pub struct Verifier {
    leases: Arc<LeaseManager>,
    tokens: Arc<dyn TokenSource>,
    mailbox: Arc<dyn Mailbox>,
    matcher: CodeMatcher,
    timeout: Duration,
}

impl Verifier {
    /// `timeout` bounds each collaborator stage separately.
    pub fn new(
        leases: Arc<LeaseManager>,
        tokens: Arc<dyn TokenSource>,
        mailbox: Arc<dyn Mailbox>,
        matcher: CodeMatcher,
        timeout: Duration,
    ) -> Self {
        Self {
            leases,
            tokens,
            mailbox,
            matcher,
            timeout,
        }
    }

    /// Run one verification attempt for `request`.
    ///
    /// Only a store failure while finalizing is an `Err`; collaborator
    /// problems are reported as `CollaboratorError`.
    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome> {
        let outcome = self.attempt(request).await?;
        metrics::counter!("pool_verifications_total", "outcome" => outcome.label()).increment(1);
        Ok(outcome)
    }

    async fn attempt(&self, request: &VerifyRequest) -> Result<VerifyOutcome> {
        let id = request.id;

        let exchange = self
            .tokens
            .access_token(&request.refresh_credential, &request.client_identifier);
        let token = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(token)) => token,
            Ok(Err(e)) => {
                warn!(account_id = id, error = %e, "token exchange failed, lease kept");
                return Ok(VerifyOutcome::CollaboratorError(e.to_string()));
            }
            Err(_) => {
                warn!(account_id = id, timeout_secs = self.timeout.as_secs_f64(), "token exchange timed out, lease kept");
                return Ok(VerifyOutcome::CollaboratorError(format!(
                    "token exchange timed out after {:?}",
                    self.timeout
                )));
            }
        };

        let scan = mail_auth::scan_mailbox(
            self.mailbox.as_ref(),
            &self.matcher,
            &request.identity,
            &token,
        );
        match tokio::time::timeout(self.timeout, scan).await {
            Ok(Ok(Some(code))) => {
                let outcome = self.leases.finalize_consumed(id).await?;
                info!(account_id = id, ?outcome, "verification code retrieved");
                Ok(VerifyOutcome::Code(code))
            }
            Ok(Ok(None)) => {
                info!(account_id = id, "no verification code yet, lease kept");
                Ok(VerifyOutcome::NotFound)
            }
            Ok(Err(e)) => {
                warn!(account_id = id, error = %e, "mailbox scan failed, lease kept");
                Ok(VerifyOutcome::CollaboratorError(e.to_string()))
            }
            Err(_) => {
                warn!(account_id = id, timeout_secs = self.timeout.as_secs_f64(), "mailbox scan timed out, lease kept");
                Ok(VerifyOutcome::CollaboratorError(format!(
                    "mailbox scan timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}
