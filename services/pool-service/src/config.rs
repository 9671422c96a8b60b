//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The admin token is loaded from the ADMIN_TOKEN env var or admin_token_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub admin_listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(skip)]
    pub admin_token: Option<Secret<String>>,
    /// Path to a file containing the admin token (alternative to ADMIN_TOKEN env var)
    #[serde(default)]
    pub admin_token_file: Option<PathBuf>,
}

/// Store and lease settings
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    pub store_path: PathBuf,
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

/// Token endpoint, mailbox, and code matching settings
#[derive(Debug, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_trusted_sender")]
    pub trusted_sender: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_mailbox_endpoint")]
    pub mailbox_endpoint: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            trusted_sender: default_trusted_sender(),
            token_endpoint: default_token_endpoint(),
            mailbox_endpoint: default_mailbox_endpoint(),
            scope: default_scope(),
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_max_connections() -> usize {
    256
}

fn default_lease_ttl() -> u64 {
    900
}

/// One week. A longer lease is indistinguishable from never reclaiming.
const MAX_LEASE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

fn default_reap_interval() -> u64 {
    60
}

fn default_trusted_sender() -> String {
    mail_auth::DEFAULT_TRUSTED_SENDER.to_string()
}

fn default_token_endpoint() -> String {
    mail_auth::DEFAULT_TOKEN_ENDPOINT.to_string()
}

fn default_mailbox_endpoint() -> String {
    mail_auth::DEFAULT_MAILBOX_ENDPOINT.to_string()
}

fn default_scope() -> String {
    mail_auth::DEFAULT_SCOPE.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_page_size() -> u32 {
    mail_auth::DEFAULT_PAGE_SIZE
}

impl PoolConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl VerificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn require_http_url(name: &str, url: &str) -> common::Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )));
    }
    Ok(())
}

fn require_nonzero(name: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        return Err(common::Error::Config(format!(
            "{name} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Admin token resolution order:
    /// 1. ADMIN_TOKEN env var
    /// 2. admin_token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_nonzero("max_connections", config.server.max_connections as u64)?;
        require_nonzero("lease_ttl_secs", config.pool.lease_ttl_secs)?;
        if config.pool.lease_ttl_secs > MAX_LEASE_TTL_SECS {
            return Err(common::Error::Config(format!(
                "lease_ttl_secs must be at most {MAX_LEASE_TTL_SECS}, got {}",
                config.pool.lease_ttl_secs
            )));
        }
        require_nonzero("reap_interval_secs", config.pool.reap_interval_secs)?;
        require_nonzero("timeout_secs", config.verification.timeout_secs)?;
        require_nonzero("page_size", u64::from(config.verification.page_size))?;
        require_http_url("token_endpoint", &config.verification.token_endpoint)?;
        require_http_url("mailbox_endpoint", &config.verification.mailbox_endpoint)?;

        if config.verification.trusted_sender.trim().is_empty() {
            return Err(common::Error::Config(
                "trusted_sender must not be empty".into(),
            ));
        }

        if config.server.listen_addr == config.server.admin_listen_addr {
            return Err(common::Error::Config(format!(
                "listen_addr and admin_listen_addr must differ, both are {}",
                config.server.listen_addr
            )));
        }

        // Resolve admin token: env var takes precedence over file
        if let Ok(token) = std::env::var("ADMIN_TOKEN") {
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.server.admin_token = Some(Secret::new(token));
            }
        } else if let Some(ref token_file) = config.server.admin_token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read admin_token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.server.admin_token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("account-pool.toml")
    }
}
