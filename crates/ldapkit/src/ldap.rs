//! `ldap3`-backed transport.

use crate::transport::{
    Connector, DirectoryModification, DirectoryTransport, LastError, LdapEntry, SearchScope,
};
use async_trait::async_trait;
use base64::Engine;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use ldapkit_core::{DirectoryConfig, Error, Result, TlsMode};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Opens `ldap3` connections using a [`DirectoryConfig`].
pub struct LdapConnector {
    config: Arc<DirectoryConfig>,
}

impl LdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for LdapConnector {
    async fn connect(&self) -> Result<Box<dyn DirectoryTransport>> {
        let url = self.config.url()?;
        let settings = build_ldap_settings(&self.config)?;

        debug!(url = %url, tls = ?self.config.tls, "connecting to directory");
        let (conn, ldap) = LdapConnAsync::with_settings(settings, url.as_str())
            .await
            .map_err(|err| Error::Connect {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        ldap3::drive!(conn);

        Ok(Box::new(LdapTransport {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
            last_error: None,
        }))
    }

    fn endpoint(&self) -> String {
        self.config.url().map_or_else(
            |_| format!("{}:{}", self.config.host, self.config.port),
            String::from,
        )
    }
}

struct LdapTransport {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
    last_error: Option<LastError>,
}

impl LdapTransport {
    fn record(&mut self, err: LdapError) -> Error {
        match err {
            LdapError::LdapResult { result } => {
                let failure = LastError {
                    code: result.rc,
                    error: result_code_name(result.rc).to_string(),
                    diagnostic: result.text,
                };
                let message = if failure.diagnostic.is_empty() {
                    failure.error.clone()
                } else {
                    format!("{}: {}", failure.error, failure.diagnostic)
                };
                self.last_error = Some(failure);
                Error::transport(Some(result.rc), message)
            }
            other => {
                self.last_error = None;
                Error::transport(None, other.to_string())
            }
        }
    }

    fn settle(&mut self, outcome: ldap3::result::Result<ldap3::LdapResult>) -> Result<()> {
        match outcome.and_then(ldap3::LdapResult::success) {
            Ok(_) => {
                self.last_error = None;
                Ok(())
            }
            Err(err) => Err(self.record(err)),
        }
    }
}

#[async_trait]
impl DirectoryTransport for LdapTransport {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let outcome = bounded(
            self.operation_timeout,
            "bind",
            self.inner.simple_bind(dn, password),
        )
        .await?;
        self.settle(outcome)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>> {
        let outcome = bounded(
            self.operation_timeout,
            "search",
            self.inner
                .search(base_dn, scope.into(), filter, attributes.to_vec()),
        )
        .await?;

        let (entries, _) = match outcome.and_then(ldap3::SearchResult::success) {
            Ok(found) => found,
            Err(err) => return Err(self.record(err)),
        };
        self.last_error = None;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_from_search)
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| {
                (
                    name.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let outcome = bounded(self.operation_timeout, "add", self.inner.add(dn, attrs)).await?;
        self.settle(outcome)
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Add { attribute, values } => {
                    Mod::Add(attribute.clone(), values.iter().cloned().collect())
                }
                DirectoryModification::Delete { attribute, values } => {
                    Mod::Delete(attribute.clone(), values.iter().cloned().collect())
                }
                DirectoryModification::Replace { attribute, values } => {
                    Mod::Replace(attribute.clone(), values.iter().cloned().collect())
                }
            })
            .collect::<Vec<Mod<String>>>();

        let outcome =
            bounded(self.operation_timeout, "modify", self.inner.modify(dn, mods)).await?;
        self.settle(outcome)
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let outcome = bounded(self.operation_timeout, "delete", self.inner.delete(dn)).await?;
        self.settle(outcome)
    }

    async fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_parent: &str,
        delete_old_rdn: bool,
    ) -> Result<()> {
        let outcome = bounded(
            self.operation_timeout,
            "rename",
            self.inner
                .modifydn(dn, new_rdn, delete_old_rdn, Some(new_parent)),
        )
        .await?;
        self.settle(outcome)
    }

    async fn unbind(&mut self) -> Result<()> {
        let outcome = bounded(self.operation_timeout, "unbind", self.inner.unbind()).await?;
        outcome.map_err(|err| self.record(err))
    }

    fn last_error(&self) -> Option<LastError> {
        self.last_error.clone()
    }
}

/// Converts an `ldap3` entry, carrying binary values as standard base64 text.
///
/// `ldap3` moves an attribute to `bin_attrs` when any of its values is not UTF-8.
fn entry_from_search(entry: SearchEntry) -> LdapEntry {
    let mut converted = LdapEntry {
        dn: entry.dn,
        attributes: entry.attrs.into_iter().collect(),
    };
    for (name, values) in entry.bin_attrs {
        debug!(dn = %converted.dn, attribute = %name, "binary attribute encoded as base64");
        let encoded = values
            .iter()
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
            .collect();
        converted.attributes.insert(name, encoded);
    }
    converted
}

async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(format!("directory {operation} timed out")))
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.tls == TlsMode::StartTls);

    if config.tls == TlsMode::None {
        return Ok(settings);
    }

    if !config.tls_verify {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| Error::Config(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = &config.tls_ca_cert {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::Config(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::Config(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::Config(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

/// Symbolic name of an LDAP result code (RFC 4511 §4.1.9).
#[must_use]
pub fn result_code_name(rc: u32) -> &'static str {
    match rc {
        0 => "success",
        1 => "operationsError",
        2 => "protocolError",
        3 => "timeLimitExceeded",
        4 => "sizeLimitExceeded",
        7 => "authMethodNotSupported",
        8 => "strongerAuthRequired",
        16 => "noSuchAttribute",
        17 => "undefinedAttributeType",
        19 => "constraintViolation",
        20 => "attributeOrValueExists",
        21 => "invalidAttributeSyntax",
        32 => "noSuchObject",
        34 => "invalidDNSyntax",
        48 => "inappropriateAuthentication",
        49 => "invalidCredentials",
        50 => "insufficientAccessRights",
        51 => "busy",
        52 => "unavailable",
        53 => "unwillingToPerform",
        64 => "namingViolation",
        65 => "objectClassViolation",
        66 => "notAllowedOnNonLeaf",
        67 => "notAllowedOnRDN",
        68 => "entryAlreadyExists",
        69 => "objectClassModsProhibited",
        71 => "affectsMultipleDSAs",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapkit_core::{AdminCredentials, DistinguishedName};

    fn config(tls: TlsMode) -> DirectoryConfig {
        DirectoryConfig::new(
            "ldap.example.com",
            AdminCredentials::new("cn=admin,dc=example,dc=com", "secret"),
            DistinguishedName::parse("dc=example,dc=com").unwrap(),
        )
        .unwrap()
        .with_tls(tls)
    }

    #[test]
    fn scope_conversion() {
        assert!(matches!(Scope::from(SearchScope::Base), Scope::Base));
        assert!(matches!(Scope::from(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(Scope::from(SearchScope::Subtree), Scope::Subtree));
    }

    #[test]
    fn endpoint_reflects_tls_mode() {
        let plain = LdapConnector::new(Arc::new(config(TlsMode::StartTls)));
        assert_eq!(plain.endpoint(), "ldap://ldap.example.com:389");

        let secure = LdapConnector::new(Arc::new(config(TlsMode::Ldaps).with_port(636)));
        assert_eq!(secure.endpoint(), "ldaps://ldap.example.com:636");
    }

    #[test]
    fn settings_reject_missing_ca_file() {
        let config = config(TlsMode::StartTls)
            .with_ca_cert(std::path::PathBuf::from("/nonexistent/ldapkit-ca.pem"));
        assert!(matches!(
            build_ldap_settings(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn binary_attributes_survive_as_base64() {
        let entry = SearchEntry {
            dn: "uid=ann,ou=people,dc=example,dc=com".to_string(),
            attrs: std::collections::HashMap::from([(
                "uid".to_string(),
                vec!["ann".to_string()],
            )]),
            bin_attrs: std::collections::HashMap::from([(
                "jpegPhoto".to_string(),
                vec![vec![0xFF, 0xD8, 0xFF]],
            )]),
        };

        let converted = entry_from_search(entry);
        assert_eq!(converted.attributes["uid"], vec!["ann"]);
        assert_eq!(converted.attributes["jpegPhoto"], vec!["/9j/"]);

        let normalized = crate::normalize::normalize(Some(&crate::raw::RawTree::from_entries(&[
            converted,
        ])));
        let ann = normalized
            .child("uid=ann,ou=people,dc=example,dc=com")
            .unwrap();
        assert_eq!(ann.first("jpegPhoto"), Some("/9j/"));
    }

    #[test]
    fn result_code_names() {
        assert_eq!(result_code_name(49), "invalidCredentials");
        assert_eq!(result_code_name(66), "notAllowedOnNonLeaf");
        assert_eq!(result_code_name(9999), "other");
    }
}
