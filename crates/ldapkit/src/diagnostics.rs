//! Structured diagnostics.
//!
//! Failures never surface as rich errors from the session API; they are reported here instead.
//! A [`DiagnosticSink`] receives each [`DiagnosticEvent`], and the [`Reporter`] shared by a session
//! and its authenticators also keeps the history behind `errors()` / `last_error()`.

use crate::transport::LastError;
use chrono::{DateTime, Utc};
use ldapkit_core::Error;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, warn};

/// How bad an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recoverable oddity, e.g. a composite operation left work undone.
    Warning,
    /// A single operation failed.
    Error,
    /// The session itself is unusable.
    Critical,
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticEvent {
    /// Severity level.
    pub severity: Severity,
    /// Stable code of the underlying error kind.
    pub code: &'static str,
    /// Human-readable description.
    pub message: String,
    /// Target DN, payload and similar details.
    pub context: Value,
    /// Symbolic server error for the failed round trip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_error: Option<String>,
    /// Extended diagnostic message from the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_message: Option<String>,
    /// When the event was raised.
    pub at: DateTime<Utc>,
}

impl DiagnosticEvent {
    /// Builds an event from an error.
    #[must_use]
    pub fn from_error(severity: Severity, error: &Error, context: Value) -> Self {
        Self {
            severity,
            code: error.error_code(),
            message: error.to_string(),
            context,
            server_error: None,
            server_message: None,
            at: Utc::now(),
        }
    }

    /// Attaches the transport's last server error, if any.
    #[must_use]
    pub fn with_server_detail(mut self, detail: Option<LastError>) -> Self {
        if let Some(detail) = detail {
            self.server_error = Some(format!("{} ({})", detail.error, detail.code));
            if !detail.diagnostic.is_empty() {
                self.server_message = Some(detail.diagnostic);
            }
        }
        self
    }
}

/// Receiver of diagnostic events.
pub trait DiagnosticSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: &DiagnosticEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: &DiagnosticEvent) {
        let server_error = event.server_error.as_deref().unwrap_or_default();
        let server_message = event.server_message.as_deref().unwrap_or_default();
        match event.severity {
            Severity::Critical | Severity::Error => error!(
                code = event.code,
                severity = ?event.severity,
                context = %event.context,
                server_error,
                server_message,
                "{}",
                event.message
            ),
            Severity::Warning => warn!(
                code = event.code,
                context = %event.context,
                server_error,
                server_message,
                "{}",
                event.message
            ),
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of all events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Codes of all events received so far.
    #[must_use]
    pub fn codes(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.code).collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, event: &DiagnosticEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Shared reporting path: forwards to the sink and records the most recent events.
pub(crate) struct Reporter {
    sink: Arc<dyn DiagnosticSink>,
    history: Mutex<VecDeque<DiagnosticEvent>>,
    limit: usize,
}

impl Reporter {
    /// Keeps at most `limit` events (at least one); older ones are dropped first.
    pub(crate) fn new(sink: Arc<dyn DiagnosticSink>, limit: usize) -> Self {
        Self {
            sink,
            history: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    pub(crate) fn report(&self, event: DiagnosticEvent) {
        self.sink.emit(&event);
        let mut history = self.lock();
        if history.len() == self.limit {
            history.pop_front();
        }
        history.push_back(event);
    }

    pub(crate) fn history(&self) -> Vec<DiagnosticEvent> {
        self.lock().iter().cloned().collect()
    }

    pub(crate) fn last(&self) -> Option<DiagnosticEvent> {
        self.lock().back().cloned()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DiagnosticEvent>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
