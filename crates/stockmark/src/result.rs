//! Result and error types for Stockmark.

use thiserror::Error;

/// Result type for Stockmark operations
pub type StockmarkResult<T> = Result<T, StockmarkError>;

/// Errors that can occur inside the engine.
///
/// None of these ever reach the host page: the public engine entry points
/// log them and degrade to leaving the page as the host rendered it.
#[derive(Debug, Error)]
pub enum StockmarkError {
    /// Request never produced a response (connection refused, DNS, reset)
    #[error("Transport failed: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// A single attempt exceeded the per-attempt timeout
    #[error("Request timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Endpoint rejected the request (4xx)
    #[error("Client error status {status}")]
    ClientStatus {
        /// HTTP status code
        status: u16,
    },

    /// Endpoint failed to serve the request (5xx or other non-success)
    #[error("Server error status {status}")]
    ServerStatus {
        /// HTTP status code
        status: u16,
    },

    /// Response body could not be interpreted
    #[error("Failed to decode response: {message}")]
    Decode {
        /// Error message
        message: String,
    },

    /// Durable cache tier failed to read or write
    #[error("Storage error: {message}")]
    Storage {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Selector text could not be parsed
    #[error("Invalid selector {selector:?}: {message}")]
    Selector {
        /// Selector text
        selector: String,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StockmarkError {
    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a storage error
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Map an HTTP status onto the client/server split.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        if status >= 400 && status < 500 {
            Self::ClientStatus { status }
        } else {
            Self::ServerStatus { status }
        }
    }

    /// Whether the stock client should try again after this failure.
    ///
    /// Client errors are unambiguous and never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::ServerStatus { .. }
        )
    }
}
