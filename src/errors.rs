//! Host-level error handling
//!
//! Failures that happen around the RPC layer (configuration, binding the
//! listener, running the server) live here. Per-call failures are modelled
//! by [`crate::fault::ServiceError`] and never reach this type.

use thiserror::Error;

/// Main error type for starting and running the host
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed while serving {addr}")]
    Serve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Registration error: {message}")]
    Registration { message: String },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

/// Type alias for Result with HostError
pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a bind error for the given address
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    pub fn serve(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Serve {
            addr: addr.into(),
            source,
        }
    }

    /// Create a handler registration error
    pub fn registration(message: impl Into<String>) -> Self {
        Self::Registration {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

impl From<figment::Error> for HostError {
    fn from(err: figment::Error) -> Self {
        HostError::config(err.to_string())
    }
}
