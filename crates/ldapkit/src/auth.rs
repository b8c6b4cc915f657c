//! Credential verification on disposable connections.

use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, Reporter, Severity};
use crate::session::release;
use crate::transport::Connector;
use ldapkit_core::{Error, DEFAULT_ERROR_HISTORY_LIMIT};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Checks a principal's own credentials.
///
/// Every attempt opens its own connection, binds once, and unbinds before returning, so an
/// administrative session's bound identity is never touched. Calls are independent and can run
/// concurrently.
#[derive(Clone)]
pub struct Authenticator {
    connector: Arc<dyn Connector>,
    reporter: Arc<Reporter>,
}

impl Authenticator {
    /// Creates an authenticator with its own diagnostic history of
    /// [`DEFAULT_ERROR_HISTORY_LIMIT`] events.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self::shared(
            connector,
            Arc::new(Reporter::new(sink, DEFAULT_ERROR_HISTORY_LIMIT)),
        )
    }

    pub(crate) fn shared(connector: Arc<dyn Connector>, reporter: Arc<Reporter>) -> Self {
        Self {
            connector,
            reporter,
        }
    }

    /// True iff a simple bind as `user_dn` with `password` succeeds.
    ///
    /// A blank DN or password is rejected before any connection is made, since many servers
    /// treat such a bind as an anonymous success.
    pub async fn authenticate(&self, user_dn: &str, password: &str) -> bool {
        if user_dn.is_empty() || password.is_empty() {
            self.reporter.report(DiagnosticEvent::from_error(
                Severity::Critical,
                &Error::EmptyCredentials,
                json!({"user_dn": user_dn}),
            ));
            return false;
        }

        let mut transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(err) => {
                let endpoint = self.connector.endpoint();
                self.reporter.report(DiagnosticEvent::from_error(
                    Severity::Error,
                    &err,
                    json!({"endpoint": endpoint, "user_dn": user_dn}),
                ));
                return false;
            }
        };

        let outcome = transport.simple_bind(user_dn, password).await;
        let detail = outcome
            .as_ref()
            .err()
            .and_then(|_| transport.last_error());
        release(transport.as_mut()).await;

        match outcome {
            Ok(()) => {
                info!(user_dn, "credentials accepted");
                true
            }
            Err(err) => {
                debug!(user_dn, error = %err, "credentials rejected");
                let severity = if err.is_invalid_credentials() {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                let err = Error::Bind {
                    dn: user_dn.to_string(),
                    message: err.to_string(),
                };
                self.reporter.report(
                    DiagnosticEvent::from_error(severity, &err, json!({"user_dn": user_dn}))
                        .with_server_detail(detail),
                );
                false
            }
        }
    }
}
