//! Directory connection configuration.
//!
//! [`DirectoryConfig`] is handed to the session at construction time. Nothing in the client
//! reads host names or credentials from ambient process state.

use crate::credentials::AdminCredentials;
use crate::dn::DistinguishedName;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default LDAP port.
pub const DEFAULT_LDAP_PORT: u16 = 389;
/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Default number of diagnostic events a session keeps.
pub const DEFAULT_ERROR_HISTORY_LIMIT: usize = 100;
/// Default group member-list attribute (POSIX groups).
pub const DEFAULT_MEMBER_ATTRIBUTE: &str = "memberUid";

/// How the transport is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plain `ldap://`, no encryption.
    None,
    /// `ldap://` upgraded with the StartTLS extended operation before binding.
    #[default]
    StartTls,
    /// TLS from the first byte (`ldaps://`).
    Ldaps,
}

/// Configuration for a directory session.
///
/// The same settings apply to the administrative connection and to every transient connection
/// opened for credential checks.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Directory server host name or address
    #[validate(length(min = 1))]
    pub host: String,

    /// Directory server port
    #[validate(range(min = 1))]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport security
    #[serde(default)]
    pub tls: TlsMode,

    /// Whether to verify the server certificate
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional PEM file with an additional trusted root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Administrative bind credentials
    #[validate(nested)]
    pub admin: AdminCredentials,

    /// Directory suffix, e.g. `dc=example,dc=com`
    pub base_dn: DistinguishedName,

    /// Base for user entries (falls back to `base_dn`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_user_dn: Option<DistinguishedName>,

    /// Base for group entries (falls back to `base_dn`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_group_dn: Option<DistinguishedName>,

    /// Group attribute listing member identifiers
    #[validate(length(min = 1))]
    #[serde(default = "default_member_attribute")]
    pub member_attribute: String,

    /// Connect (and StartTLS) timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per round-trip timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Diagnostic events kept in the session history; the oldest are dropped first
    #[validate(range(min = 1, max = 100_000))]
    #[serde(default = "default_error_history_limit")]
    pub error_history_limit: usize,
}

const fn default_port() -> u16 {
    DEFAULT_LDAP_PORT
}

const fn default_tls_verify() -> bool {
    true
}

fn default_member_attribute() -> String {
    DEFAULT_MEMBER_ATTRIBUTE.to_string()
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

const fn default_error_history_limit() -> usize {
    DEFAULT_ERROR_HISTORY_LIMIT
}

impl DirectoryConfig {
    /// Creates a configuration with default port, StartTLS and timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is empty or the admin bind DN is blank.
    pub fn new(
        host: impl Into<String>,
        admin: AdminCredentials,
        base_dn: DistinguishedName,
    ) -> Result<Self, Error> {
        let config = Self {
            host: host.into(),
            port: default_port(),
            tls: TlsMode::default(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            admin,
            base_dn,
            base_user_dn: None,
            base_group_dn: None,
            member_attribute: default_member_attribute(),
            connection_timeout_secs: default_connection_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            error_history_limit: default_error_history_limit(),
        };

        config.check()?;
        Ok(config)
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed JSON and [`Error::Validation`] for out-of-range
    /// values.
    pub fn from_json(input: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| Error::Config(format!("invalid configuration: {e}")))?;
        config.check()?;
        Ok(config)
    }

    /// Runs field validation and checks the derived URL.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn check(&self) -> Result<(), Error> {
        self.validate()?;
        self.url()?;
        Ok(())
    }

    /// Set the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the transport security mode.
    #[must_use]
    pub const fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// Enable or disable certificate verification.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set a custom CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Override the user base DN.
    #[must_use]
    pub fn with_user_base_dn(mut self, dn: DistinguishedName) -> Self {
        self.base_user_dn = Some(dn);
        self
    }

    /// Override the group base DN.
    #[must_use]
    pub fn with_group_base_dn(mut self, dn: DistinguishedName) -> Self {
        self.base_group_dn = Some(dn);
        self
    }

    /// Override the member-list attribute.
    #[must_use]
    pub fn with_member_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.member_attribute = attribute.into();
        self
    }

    /// Set connect timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Set per-operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Set how many diagnostic events the session keeps.
    #[must_use]
    pub const fn with_error_history_limit(mut self, limit: usize) -> Self {
        self.error_history_limit = limit;
        self
    }

    /// Base DN for users.
    #[must_use]
    pub fn user_base_dn(&self) -> &DistinguishedName {
        self.base_user_dn.as_ref().unwrap_or(&self.base_dn)
    }

    /// Base DN for groups.
    #[must_use]
    pub fn group_base_dn(&self) -> &DistinguishedName {
        self.base_group_dn.as_ref().unwrap_or(&self.base_dn)
    }

    /// Connect timeout as a `Duration`.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Operation timeout as a `Duration`.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Builds the server URL from host, port and TLS mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host does not form a valid URL.
    pub fn url(&self) -> Result<Url, Error> {
        let scheme = match self.tls {
            TlsMode::Ldaps => "ldaps",
            TlsMode::None | TlsMode::StartTls => "ldap",
        };
        Ok(Url::parse(&format!("{scheme}://{}:{}", self.host, self.port))?)
    }
}
