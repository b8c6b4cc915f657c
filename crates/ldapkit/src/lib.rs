//! Directory session client for OpenLDAP-style servers.
//!
//! A [`DirectorySession`] holds one connection bound as the administrative principal and exposes
//! record operations on it (search, add, modify, rename, delete, recursive delete) plus group
//! membership maintenance. Credentials are checked by an [`Authenticator`] on separate,
//! short-lived connections. Failures come back as `false` or an empty result; the detail goes to
//! a [`DiagnosticSink`].
//!
//! ```no_run
//! use ldapkit::{AdminCredentials, DirectoryConfig, DirectorySession, DistinguishedName};
//!
//! # async fn run() -> ldapkit::Result<()> {
//! let config = DirectoryConfig::new(
//!     "ldap.example.com",
//!     AdminCredentials::new("cn=admin,dc=example,dc=com", "secret"),
//!     DistinguishedName::parse("dc=example,dc=com")?,
//! )?;
//! let mut session = DirectorySession::open(config).await;
//! let groups = session
//!     .memberships("ou=groups,dc=example,dc=com", "ann")
//!     .await;
//! session.close().await;
//! # let _ = groups;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod auth;
mod diagnostics;
mod groups;
mod ldap;
mod normalize;
mod raw;
mod record;
mod session;
mod subtree;
mod transport;

pub use auth::Authenticator;
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, MemorySink, Severity, TracingSink};
pub use ldap::{result_code_name, LdapConnector};
pub use normalize::{normalize, strip_counts, EntryKey, NormalizedEntry, NormalizedValue};
pub use raw::{RawKey, RawTree, RawValue, COUNT_KEY};
pub use record::ModificationRecord;
pub use session::{DirectorySession, SessionState};
pub use transport::{
    Connector, DirectoryModification, DirectoryTransport, LastError, LdapEntry, SearchScope,
};

pub use ldapkit_core::{
    AdminCredentials, DirectoryConfig, DistinguishedName, Error, TlsMode,
    DEFAULT_ERROR_HISTORY_LIMIT, DEFAULT_LDAP_PORT,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ldapkit_core::Result<T>;
