//! Error types for the Wahlplakat client.

use thiserror::Error;

/// Errors that can occur when using the Wahlplakat client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to send a frame through the realtime transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the realtime transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// An HTTP request could not be completed (network failure, bad body).
    #[error("http error: {0}")]
    Http(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The peer sent a frame that violates the Engine.IO / Socket.IO framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Attempted to emit on the event channel while it is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Input was rejected before any request was made.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The control that triggers this operation is already busy.
    #[error("operation already in progress")]
    Busy,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        Self::Http(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::Http(format!("invalid url: {err}"))
    }
}

/// Form validation failures raised by the auth controller.
///
/// The `Display` output is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a username.")]
    MissingNickname,

    #[error("Username must be at most {max} characters long.")]
    NicknameTooLong { max: usize },

    #[error("Please enter a password.")]
    MissingPassword,

    #[error("Password must be at least {min} characters long.")]
    PasswordTooShort { min: usize },

    #[error("The passwords do not match.")]
    PasswordMismatch,

    #[error("No session token available.")]
    MissingToken,
}

/// A specialized [`Result`] type for Wahlplakat client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
