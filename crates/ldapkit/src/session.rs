//! The administrative directory session.

use crate::auth::Authenticator;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, Reporter, Severity, TracingSink};
use crate::ldap::LdapConnector;
use crate::normalize::{normalize, NormalizedEntry};
use crate::raw::RawTree;
use crate::record::ModificationRecord;
use crate::transport::{Connector, DirectoryModification, DirectoryTransport, SearchScope};
use ldapkit_core::{DirectoryConfig, DistinguishedName, Error, Result};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Filter matching every entry.
pub(crate) const ANY_OBJECT_FILTER: &str = "(objectClass=*)";

/// Lifecycle of a [`DirectorySession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no connection attempted yet.
    Uninitialized,
    /// Connect and admin bind in progress.
    Connecting,
    /// Admin bind succeeded; operations are issued.
    Bound,
    /// Connect or bind failed; operations fail fast.
    Degraded,
    /// Released; operations fail fast.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Bound => "bound",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Session bound as the administrative principal.
///
/// Operations return `bool` or an empty result on failure. The failure itself goes to the
/// [`DiagnosticSink`] and into the session's error history ([`errors`](Self::errors)). One caller
/// at a time: mutating methods take `&mut self`. Credential checks only need `&self` and run
/// on their own connections.
pub struct DirectorySession {
    config: Arc<DirectoryConfig>,
    connector: Arc<dyn Connector>,
    reporter: Arc<Reporter>,
    transport: Option<Box<dyn DirectoryTransport>>,
    state: SessionState,
}

impl DirectorySession {
    /// Opens a session over `ldap3`, reporting to `tracing`.
    ///
    /// Never fails: if the connection or the admin bind fails, the failure is reported and the
    /// returned session is [`SessionState::Degraded`].
    pub async fn open(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector = Arc::new(LdapConnector::new(config.clone()));
        Self::open_with(config, connector, Arc::new(TracingSink)).await
    }

    /// Opens a session with a custom transport factory and diagnostic sink.
    pub async fn open_with(
        config: Arc<DirectoryConfig>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let mut session = Self::with_connector(config, connector, sink);
        session.connect().await;
        session
    }

    /// Creates an unconnected session; call [`connect`](Self::connect) before use.
    #[must_use]
    pub fn with_connector(
        config: Arc<DirectoryConfig>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let reporter = Arc::new(Reporter::new(sink, config.error_history_limit));
        Self {
            config,
            connector,
            reporter,
            transport: None,
            state: SessionState::Uninitialized,
        }
    }

    /// Connects and binds as the administrative principal.
    ///
    /// Also retries a degraded session. A closed session stays closed.
    pub async fn connect(&mut self) -> bool {
        match self.state {
            SessionState::Bound => return true,
            SessionState::Closed => {
                self.fail(
                    &Error::SessionUnavailable("session is closed".to_string()),
                    json!({"operation": "connect"}),
                );
                return false;
            }
            SessionState::Uninitialized | SessionState::Connecting | SessionState::Degraded => {}
        }

        self.state = SessionState::Connecting;
        let endpoint = self.connector.endpoint();
        debug!(endpoint = %endpoint, "opening directory session");

        let mut transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(err) => {
                let err = match err {
                    Error::Connect { .. } => err,
                    other => Error::Connect {
                        url: endpoint.clone(),
                        message: other.to_string(),
                    },
                };
                self.reporter.report(DiagnosticEvent::from_error(
                    Severity::Critical,
                    &err,
                    json!({"endpoint": endpoint}),
                ));
                self.state = SessionState::Degraded;
                return false;
            }
        };

        let bind_dn = self.config.admin.bind_dn();
        if let Err(err) = transport
            .simple_bind(bind_dn, self.config.admin.bind_password())
            .await
        {
            let detail = transport.last_error();
            release(transport.as_mut()).await;
            let err = Error::Bind {
                dn: bind_dn.to_string(),
                message: err.to_string(),
            };
            self.reporter.report(
                DiagnosticEvent::from_error(
                    Severity::Critical,
                    &err,
                    json!({"endpoint": endpoint, "bind_dn": bind_dn}),
                )
                .with_server_detail(detail),
            );
            self.state = SessionState::Degraded;
            return false;
        }

        info!(endpoint = %endpoint, bind_dn, "directory session bound");
        self.transport = Some(transport);
        self.state = SessionState::Bound;
        true
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while the admin bind is live.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.state == SessionState::Bound
    }

    /// Configuration the session was opened with.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Searches and normalizes the result.
    ///
    /// `None` both when nothing matched and when the search failed; use
    /// [`try_search`](Self::try_search) or [`exists`](Self::exists) to tell them apart.
    pub async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
        scope: SearchScope,
    ) -> Option<NormalizedEntry> {
        let raw = self.try_search(base_dn, filter, attributes, scope).await.ok()?;
        if raw.count().unwrap_or(0) == 0 {
            return None;
        }
        Some(normalize(Some(&raw)))
    }

    /// Searches, returning the count-prefixed result tree or the failure.
    ///
    /// Failures are reported like every other operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Search`] when the round trip fails and [`Error::SessionUnavailable`] when
    /// the session is not bound.
    pub async fn try_search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
        scope: SearchScope,
    ) -> Result<RawTree> {
        let attributes: Vec<String> = attributes.iter().map(ToString::to_string).collect();
        let outcome = match self.transport_mut("search") {
            Ok(transport) => transport
                .search(base_dn, scope, filter, &attributes)
                .await
                .map_err(|err| Error::Search {
                    base_dn: base_dn.to_string(),
                    filter: filter.to_string(),
                    message: err.to_string(),
                }),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(entries) => {
                debug!(base_dn, filter, matches = entries.len(), "search complete");
                Ok(RawTree::from_entries(&entries))
            }
            Err(err) => {
                self.fail(
                    &err,
                    json!({
                        "base_dn": base_dn,
                        "filter": filter,
                        "attributes": attributes,
                        "scope": format!("{scope:?}"),
                    }),
                );
                Err(err)
            }
        }
    }

    /// True iff a base-scope read of `dn` succeeds.
    ///
    /// A failed read is the answer here, so it is not reported.
    pub async fn exists(&mut self, dn: &str) -> bool {
        let Ok(transport) = self.transport_mut("read") else {
            return false;
        };
        let found = transport
            .search(dn, SearchScope::Base, ANY_OBJECT_FILTER, &["dn".to_string()])
            .await
            .is_ok();
        debug!(dn, found, "existence check");
        found
    }

    /// Creates an entry. Attributes with empty values are left out.
    pub async fn add(&mut self, dn: &str, record: &ModificationRecord) -> bool {
        let attributes = record.for_add();
        let outcome = match self.transport_mut("add") {
            Ok(transport) => {
                transport
                    .add(dn, &attributes)
                    .await
                    .map_err(|err| Error::Add {
                        dn: dn.to_string(),
                        message: err.to_string(),
                    })
            }
            Err(err) => Err(err),
        };
        self.conclude(outcome, || json!({"dn": dn, "record": record.redacted()}))
    }

    /// Replaces attribute values. Attributes with empty values are cleared.
    pub async fn modify(&mut self, dn: &str, record: &ModificationRecord) -> bool {
        let modifications = record.for_modify();
        let outcome = match self.transport_mut("modify") {
            Ok(transport) => transport
                .modify(dn, &modifications)
                .await
                .map_err(|err| Error::Modify {
                    dn: dn.to_string(),
                    message: err.to_string(),
                }),
            Err(err) => Err(err),
        };
        self.conclude(outcome, || json!({"dn": dn, "record": record.redacted()}))
    }

    /// Adds values, keeping the ones already present.
    pub async fn add_attribute(&mut self, dn: &str, record: &ModificationRecord) -> bool {
        let modifications = record.for_value_add();
        self.change_values(dn, record, "add attribute values", &modifications)
            .await
    }

    /// Removes specific values, keeping the others.
    pub async fn delete_attribute(&mut self, dn: &str, record: &ModificationRecord) -> bool {
        let modifications = record.for_value_delete();
        self.change_values(dn, record, "delete attribute values", &modifications)
            .await
    }

    async fn change_values(
        &mut self,
        dn: &str,
        record: &ModificationRecord,
        operation: &str,
        modifications: &[DirectoryModification],
    ) -> bool {
        let outcome = match self.transport_mut(operation) {
            Ok(transport) => transport
                .modify(dn, modifications)
                .await
                .map_err(|err| Error::Attribute {
                    dn: dn.to_string(),
                    message: err.to_string(),
                }),
            Err(err) => Err(err),
        };
        self.conclude(outcome, || {
            json!({"dn": dn, "operation": operation, "record": record.redacted()})
        })
    }

    /// Renames `dn` to `new_rdn` under `new_parent`, dropping the old RDN value.
    pub async fn rename(&mut self, dn: &str, new_rdn: &str, new_parent: &str) -> bool {
        let outcome = match self.transport_mut("rename") {
            Ok(transport) => transport
                .rename(dn, new_rdn, new_parent, true)
                .await
                .map_err(|err| Error::Rename {
                    dn: dn.to_string(),
                    new_rdn: new_rdn.to_string(),
                    message: err.to_string(),
                }),
            Err(err) => Err(err),
        };
        self.conclude(outcome, || {
            json!({"dn": dn, "new_rdn": new_rdn, "new_parent": new_parent})
        })
    }

    /// Moves `dn` under `new_parent`, keeping its own RDN.
    pub async fn move_entry(&mut self, dn: &str, new_parent: &str) -> bool {
        let rdn = match DistinguishedName::parse(dn) {
            Ok(parsed) => parsed.rdn(),
            Err(err) => {
                self.fail(&Error::from(err), json!({"dn": dn, "new_parent": new_parent}));
                return false;
            }
        };
        self.rename(dn, &rdn, new_parent).await
    }

    /// Deletes a single leaf entry.
    pub async fn delete(&mut self, dn: &str) -> bool {
        let outcome = match self.transport_mut("delete") {
            Ok(transport) => transport
                .delete(dn)
                .await
                .map_err(|err| Error::Delete {
                    dn: dn.to_string(),
                    message: err.to_string(),
                }),
            Err(err) => Err(err),
        };
        if outcome.is_ok() {
            debug!(dn, "entry deleted");
        }
        self.conclude(outcome, || json!({"dn": dn}))
    }

    /// Sets `userPassword` without checking the old one.
    pub async fn set_password(&mut self, dn: &str, password: &str) -> bool {
        let record = ModificationRecord::new().with("userPassword", password);
        self.modify(dn, &record).await
    }

    /// Independent credential checker sharing this session's factory and diagnostics.
    #[must_use]
    pub fn authenticator(&self) -> Authenticator {
        Authenticator::shared(self.connector.clone(), self.reporter.clone())
    }

    /// Checks a principal's credentials on a fresh connection.
    ///
    /// The admin connection and its bound identity are untouched.
    pub async fn authenticate(&self, user_dn: &str, password: &str) -> bool {
        self.authenticator().authenticate(user_dn, password).await
    }

    /// Releases the admin connection. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            release(transport.as_mut()).await;
            info!(endpoint = %self.connector.endpoint(), "directory session closed");
        }
        self.state = SessionState::Closed;
    }

    /// Events reported through this session, oldest first.
    ///
    /// Only the latest [`DirectoryConfig::error_history_limit`] events are kept, including those
    /// from authenticators handed out by [`authenticator`](Self::authenticator).
    #[must_use]
    pub fn errors(&self) -> Vec<DiagnosticEvent> {
        self.reporter.history()
    }

    /// The most recent reported event.
    #[must_use]
    pub fn last_error(&self) -> Option<DiagnosticEvent> {
        self.reporter.last()
    }

    /// Forgets the reported events; the sink is unaffected.
    pub fn clear_errors(&self) {
        self.reporter.clear();
    }

    /// Reported messages, one per line, each followed by the server's diagnostic when present.
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.reporter
            .history()
            .iter()
            .map(|event| match &event.server_message {
                Some(server) => format!("{}: {server}", event.message),
                None => event.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Reports a warning that is not tied to a single round trip.
    pub(crate) fn warn(&self, err: &Error, context: Value) {
        self.reporter
            .report(DiagnosticEvent::from_error(Severity::Warning, err, context));
    }

    fn transport_mut(&mut self, operation: &str) -> Result<&mut Box<dyn DirectoryTransport>> {
        let state = self.state;
        match self.transport.as_mut() {
            Some(transport) if state == SessionState::Bound => Ok(transport),
            _ => Err(Error::SessionUnavailable(format!(
                "cannot {operation}: session is {state}"
            ))),
        }
    }

    fn conclude(&self, outcome: Result<()>, context: impl FnOnce() -> Value) -> bool {
        match outcome {
            Ok(()) => true,
            Err(err) => {
                self.fail(&err, context());
                false
            }
        }
    }

    fn fail(&self, err: &Error, context: Value) {
        let detail = match err {
            Error::SessionUnavailable(_) | Error::InvalidDn(_) => None,
            _ => self
                .transport
                .as_ref()
                .and_then(|transport| transport.last_error()),
        };
        self.reporter.report(
            DiagnosticEvent::from_error(Severity::Error, err, context).with_server_detail(detail),
        );
    }
}

/// Unbinds, logging rather than reporting a failure.
pub(crate) async fn release(transport: &mut dyn DirectoryTransport) {
    if let Err(err) = transport.unbind().await {
        debug!(error = %err, "unbind failed");
    }
}
