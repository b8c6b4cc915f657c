//! Administrative bind credentials.
//!
//! The session binds its long-lived connection with these credentials. The password is held as a
//! [`SecretString`] so it never shows up in `Debug` output or serialized configuration.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Credentials used for the administrative bind.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AdminCredentials {
    /// Bind DN of the administrative principal
    #[validate(length(min = 1))]
    pub bind_dn: String,

    /// Bind password
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub bind_password: SecretString,
}

impl AdminCredentials {
    /// Create new admin credentials.
    ///
    /// # Arguments
    ///
    /// * `bind_dn` - The DN of the admin entry, e.g. `cn=admin,dc=example,dc=com`
    /// * `bind_password` - The admin password
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, bind_password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(bind_password.into()),
        }
    }

    /// Get the LDAP bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the LDAP bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}
