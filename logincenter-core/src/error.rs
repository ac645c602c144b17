use crate::result::LoginResult;

/// Errors surfaced by the logincenter crates.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The transport could not complete the request.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// A host-platform API failed.
    #[error("Platform error: {0}")]
    Platform(String),
    /// The persistent store rejected an operation.
    #[error("Storage error: {0}")]
    Storage(String),
    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The request could not be assembled.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// A request needing a session was not sent because login failed.
    #[error("Login failed, request not sent: {url}")]
    LoginRequired {
        /// Target of the request that was dropped.
        url: String,
        /// Result of the failed login attempt.
        result: LoginResult,
    },
    /// The backend kept rejecting the session after the automatic retry.
    #[error("Session rejected by backend: {url}")]
    SessionRejected {
        /// Target of the rejected request.
        url: String,
        /// Body returned by the last attempt.
        body: serde_json::Value,
    },
}

/// Failure reported by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (DNS, TLS, connection reset, timeout...).
    #[error("request failed: {0}")]
    Network(String),
    /// The request could not be built.
    #[error("invalid request: {0}")]
    Build(String),
}

/// Failure of a single login step.
///
/// Steps never propagate raw errors; they settle into a `StepError` that can be cloned
/// out to every caller sharing the step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{err_msg}")]
pub struct StepError {
    /// Detailed, machine-oriented reason.
    pub err_msg: String,
    /// Optional message suitable for showing to the user.
    pub toast_msg: Option<String>,
}

impl StepError {
    /// Create a step failure without a user-facing message.
    pub fn new(err_msg: impl Into<String>) -> Self {
        Self {
            err_msg: err_msg.into(),
            toast_msg: None,
        }
    }

    /// Attach a user-facing message.
    pub fn with_toast(mut self, toast_msg: Option<String>) -> Self {
        self.toast_msg = toast_msg;
        self
    }
}

impl From<AuthError> for StepError {
    fn from(err: AuthError) -> Self {
        StepError::new(err.to_string())
    }
}
