use crate::storage::StorageError;

/// Errors produced by the session and authentication lifecycle.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// No live session record exists.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    /// The `state` returned by the provider does not match the persisted one.
    #[error("OAuth2 state validation failed")]
    StateMismatch,

    #[error("No authorization URL returned for provider {provider}")]
    MissingAuthUrl { provider: String },

    /// The provider redirected back with an `error` parameter instead of a code.
    #[error("OAuth2 provider error: {error}")]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// Authentication succeeded upstream but the session record could not be written.
    #[error("Session could not be established")]
    SessionEstablishment,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The forced re-submission of a duplicate-login confirmation was refused.
    #[error("Duplicate-login confirmation rejected")]
    ConfirmationRejected { message: Option<String> },

    #[error("{operation} failed: {detail}")]
    Upstream {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    /// A newer request of the same kind started before this one completed.
    #[error("Superseded by a newer request")]
    Superseded,

    /// An operation was invoked in a flow phase that does not allow it.
    #[error("Invalid flow state: {0}")]
    InvalidState(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse grouping of [`Error`] used to pick the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    StateValidation,
    SessionEstablishment,
    Credentials,
    Upstream,
    Storage,
    Flow,
}

impl Error {
    /// Maps a transport error, keeping timeouts distinguishable.
    pub(crate) fn transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::StateMismatch => ErrorCategory::StateValidation,
            Self::SessionEstablishment | Self::NotAuthenticated | Self::SessionExpired => {
                ErrorCategory::SessionEstablishment
            }
            Self::InvalidCredentials | Self::ConfirmationRejected { .. } => {
                ErrorCategory::Credentials
            }
            Self::MissingAuthUrl { .. }
            | Self::Provider { .. }
            | Self::Upstream { .. }
            | Self::Http(_)
            | Self::Timeout => ErrorCategory::Upstream,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Superseded | Self::InvalidState(_) | Self::Config(_) => ErrorCategory::Flow,
        }
    }

    /// Message suitable for a transient notification.
    ///
    /// Credential failures stay generic so the message never reveals which
    /// field was wrong.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::StateMismatch => {
                "The sign-in request could not be verified. Please start the social login again."
            }
            Self::SessionExpired | Self::NotAuthenticated => {
                "Your session has ended. Please sign in again."
            }
            Self::SessionEstablishment => {
                "Sign-in succeeded but your session could not be saved. Please try again."
            }
            Self::InvalidCredentials => "Please check your email and password and try again.",
            Self::ConfirmationRejected { .. } => {
                "Signing in on this device failed. Please check your credentials and try again."
            }
            Self::MissingAuthUrl { .. } | Self::Provider { .. } => {
                "The login provider is unavailable right now. Please try again later."
            }
            Self::Upstream { .. } | Self::Http(_) => {
                "The server could not complete the request. Please try again later."
            }
            Self::Timeout => "The server took too long to respond. Please try again.",
            Self::Storage(_) => "Your browser storage is unavailable or full.",
            Self::Superseded | Self::InvalidState(_) | Self::Config(_) => {
                "Something went wrong. Please try again."
            }
        }
    }
}
