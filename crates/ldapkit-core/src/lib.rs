//! # ldapkit-core
//!
//! Foundation types for the `ldapkit` directory session client.
//!
//! Nothing in this crate performs I/O. It carries the pieces shared by every layer of the
//! client: the error type, administrative credentials, distinguished names and the directory
//! configuration record.
//!
//! ## Modules
//!
//! - [`error`] - Error kinds reported by directory operations
//! - [`credentials`] - Administrative bind credentials
//! - [`dn`] - Distinguished name parsing and manipulation
//! - [`config`] - Connection and base DN configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod dn;
pub mod error;

// Re-export commonly used types
pub use config::{DirectoryConfig, TlsMode, DEFAULT_ERROR_HISTORY_LIMIT, DEFAULT_LDAP_PORT};
pub use credentials::AdminCredentials;
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use error::{Error, Result};
