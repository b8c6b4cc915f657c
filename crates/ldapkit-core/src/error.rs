//! Error types for directory operations.
//!
//! Every failure the client can observe maps onto one [`Error`] variant. The public session
//! contract converts these into boolean or empty results after reporting them, so the variants
//! mostly travel through diagnostics rather than through return values.

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The transport could not be created or the server was unreachable
    #[error("Connection to {url} failed: {message}")]
    Connect {
        /// Endpoint that was dialled
        url: String,
        /// Underlying failure
        message: String,
    },

    /// Credentials were rejected or the bind call failed
    #[error("Bind as `{dn}` failed: {message}")]
    Bind {
        /// Principal used for the bind
        dn: String,
        /// Underlying failure
        message: String,
    },

    /// Search round trip failed
    #[error("Search for {filter} in `{base_dn}` failed: {message}")]
    Search {
        /// Search root
        base_dn: String,
        /// Filter that was sent
        filter: String,
        /// Underlying failure
        message: String,
    },

    /// Entry creation rejected
    #[error("Adding `{dn}` failed: {message}")]
    Add {
        /// Target entry
        dn: String,
        /// Underlying failure
        message: String,
    },

    /// Wholesale attribute replacement rejected
    #[error("Modifying `{dn}` failed: {message}")]
    Modify {
        /// Target entry
        dn: String,
        /// Underlying failure
        message: String,
    },

    /// Entry removal rejected
    #[error("Deleting `{dn}` failed: {message}")]
    Delete {
        /// Target entry
        dn: String,
        /// Underlying failure
        message: String,
    },

    /// Rename or move rejected
    #[error("Renaming `{dn}` to `{new_rdn}` failed: {message}")]
    Rename {
        /// Entry being renamed
        dn: String,
        /// Requested relative name
        new_rdn: String,
        /// Underlying failure
        message: String,
    },

    /// Incremental attribute value add/remove rejected
    #[error("Changing attribute values of `{dn}` failed: {message}")]
    Attribute {
        /// Target entry
        dn: String,
        /// Underlying failure
        message: String,
    },

    /// Blank DN or password passed to authentication
    #[error("Empty credentials: user DN and password are both required")]
    EmptyCredentials,

    /// The session is degraded or closed
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// Raw transport failure, with the server result code when one was received
    #[error("Transport error{}: {message}", .code.map(|c| format!(" (rc={c})")).unwrap_or_default())]
    Transport {
        /// LDAP result code
        code: Option<u32>,
        /// Diagnostic text
        message: String,
    },

    /// Round trip exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed distinguished name
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// LDAP result code for `invalidCredentials`.
pub const RC_INVALID_CREDENTIALS: u32 = 49;

impl Error {
    /// Builds a [`Error::Transport`] from a result code and message.
    #[must_use]
    pub fn transport(code: Option<u32>, message: impl Into<String>) -> Self {
        Self::Transport {
            code,
            message: message.into(),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "CONNECT_ERROR",
            Self::Bind { .. } => "BIND_ERROR",
            Self::Search { .. } => "SEARCH_ERROR",
            Self::Add { .. } => "ADD_ERROR",
            Self::Modify { .. } => "MODIFY_ERROR",
            Self::Delete { .. } => "DELETE_ERROR",
            Self::Rename { .. } => "RENAME_ERROR",
            Self::Attribute { .. } => "ATTRIBUTE_ERROR",
            Self::EmptyCredentials => "EMPTY_CREDENTIALS",
            Self::SessionUnavailable(_) => "SESSION_UNAVAILABLE",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidDn(_) => "INVALID_DN",
        }
    }

    /// Returns the LDAP result code carried by a transport error.
    #[must_use]
    pub const fn server_code(&self) -> Option<u32> {
        match self {
            Self::Transport { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns true if the server rejected the supplied credentials.
    #[must_use]
    pub const fn is_invalid_credentials(&self) -> bool {
        matches!(self.server_code(), Some(RC_INVALID_CREDENTIALS))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid directory URL: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}
