//! Transport seam between the session engine and the wire protocol.
//!
//! A [`Connector`] opens handles; a [`DirectoryTransport`] is one live handle. Each method is a
//! single round trip. [`LdapConnector`](crate::LdapConnector) is the `ldap3` implementation;
//! anything else implementing these traits can stand in for it.

use async_trait::async_trait;
use ldapkit_core::Result;
use std::collections::BTreeMap;

/// Search breadth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// The base entry only.
    Base,
    /// Immediate children of the base.
    OneLevel,
    /// The base and all of its descendants.
    #[default]
    Subtree,
}

/// One entry as returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute values in server order.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute with its values.
    #[must_use]
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }
}

/// A single change within a modify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add values to an attribute, keeping existing ones.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Remove specific values (an empty list removes the attribute).
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete.
        values: Vec<String>,
    },
    /// Replace all values (an empty list clears the attribute).
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    /// Attribute this change targets.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Delete { attribute, .. }
            | Self::Replace { attribute, .. } => attribute,
        }
    }
}

/// Server-side detail of the most recent failure on a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    /// LDAP result code.
    pub code: u32,
    /// Symbolic error text for the code.
    pub error: String,
    /// Extended diagnostic message sent by the server.
    pub diagnostic: String,
}

/// One live directory handle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryTransport: Send {
    /// Simple bind as `dn`.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Search below `base_dn`, returning the matching entries.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>>;

    /// Create an entry.
    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()>;

    /// Apply modifications to an entry.
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;

    /// Delete a leaf entry.
    async fn delete(&mut self, dn: &str) -> Result<()>;

    /// Rename `dn` to `new_rdn` under `new_parent`.
    async fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_parent: &str,
        delete_old_rdn: bool,
    ) -> Result<()>;

    /// Release the handle.
    async fn unbind(&mut self) -> Result<()>;

    /// Detail of the last failed round trip, if the server reported one.
    fn last_error(&self) -> Option<LastError>;
}

/// Factory for [`DirectoryTransport`] handles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new handle (TCP connect plus StartTLS where configured), not yet bound.
    async fn connect(&self) -> Result<Box<dyn DirectoryTransport>>;

    /// Endpoint description used in diagnostics.
    fn endpoint(&self) -> String;
}
