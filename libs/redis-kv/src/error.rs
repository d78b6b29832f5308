//! Error types for redis-kv

use crate::client::ClientStatus;
use std::time::Duration;
use thiserror::Error;

/// Identity prefixed to every adapter-level error message
pub const ADAPTER_NAME: &str = "RedisKvAdapter";

/// Failure reported by a store client
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection is not open (status: {0})")]
    NotConnected(ClientStatus),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[cfg(feature = "redis-backend")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("{0}")]
    Backend(String),
}

/// Adapter error surfaced to callers
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Adapter destroyed, or transport-level connect failure
    #[error("RedisKvAdapter: {operation} failed: connection error: {message}")]
    Connection {
        operation: &'static str,
        message: String,
    },

    /// Readiness not reached in time
    #[error("RedisKvAdapter: {operation} failed: connection timeout: {message}")]
    ConnectionTimeout {
        operation: &'static str,
        message: String,
    },

    /// A store call failed; the store's error is kept as the source
    #[error("RedisKvAdapter: {operation} failed: {source}")]
    Command {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("RedisKvAdapter: {operation} failed: serialization error: {message}")]
    Serialization {
        operation: &'static str,
        message: String,
    },

    #[error("RedisKvAdapter: invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

impl AdapterError {
    pub(crate) fn connection(operation: &'static str, message: impl Into<String>) -> Self {
        AdapterError::Connection {
            operation,
            message: message.into(),
        }
    }

    pub(crate) fn connection_timeout(operation: &'static str, message: impl Into<String>) -> Self {
        AdapterError::ConnectionTimeout {
            operation,
            message: message.into(),
        }
    }

    pub(crate) fn destroyed(operation: &'static str) -> Self {
        Self::connection(operation, "adapter has been destroyed")
    }

    /// Re-attribute a connection error to the operation that waited on it
    pub(crate) fn during(self, operation: &'static str) -> Self {
        match self {
            AdapterError::Connection { message, .. } => Self::connection(operation, message),
            AdapterError::ConnectionTimeout { message, .. } => {
                Self::connection_timeout(operation, message)
            },
            other => other,
        }
    }

    /// Name of the failing operation, if the error carries one
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            AdapterError::Connection { operation, .. }
            | AdapterError::ConnectionTimeout { operation, .. }
            | AdapterError::Command { operation, .. }
            | AdapterError::Serialization { operation, .. } => Some(operation),
            AdapterError::Config(_) => None,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AdapterError::Connection { .. } | AdapterError::ConnectionTimeout { .. }
        )
    }
}

impl From<common::Error> for AdapterError {
    fn from(err: common::Error) -> Self {
        AdapterError::Config(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_destroyed_error() {
        let err = AdapterError::destroyed("get");
        assert_eq!(
            err.to_string(),
            "RedisKvAdapter: get failed: connection error: adapter has been destroyed"
        );
        assert!(err.is_connection_error());
        assert_eq!(err.operation(), Some("get"));
    }

    #[test]
    fn test_connection_error_takes_waiting_operation() {
        let err = AdapterError::connection_timeout("connect", "not ready").during("mset");
        assert!(matches!(
            err,
            AdapterError::ConnectionTimeout {
                operation: "mset",
                ..
            }
        ));
        assert!(err.to_string().contains("mset failed: connection timeout"));

        // Other variants keep their own operation
        let err = AdapterError::Serialization {
            operation: "get",
            message: "bad json".to_string(),
        }
        .during("mget");
        assert_eq!(err.operation(), Some("get"));
    }

    #[test]
    fn test_command_error_keeps_cause() {
        let err = AdapterError::Command {
            operation: "mget",
            source: StoreError::Backend("ERR wrong number of arguments".to_string()),
        };
        let message = err.to_string();
        assert!(message.starts_with(ADAPTER_NAME));
        assert!(message.contains("mget"));
        assert!(message.contains("ERR wrong number of arguments"));
        assert_eq!(err.operation(), Some("mget"));

        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "ERR wrong number of arguments");
    }

    #[test]
    fn test_not_connected_error() {
        let err = StoreError::NotConnected(ClientStatus::End);
        assert_eq!(err.to_string(), "connection is not open (status: end)");
    }

    #[test]
    fn test_timeout_error() {
        let err = AdapterError::connection_timeout("connect", "not ready after 50 attempts");
        assert!(err.to_string().contains("connection timeout"));
        assert_eq!(err.operation(), Some("connect"));
    }

    #[test]
    fn test_from_common_error() {
        let err: AdapterError = common::Error::config("bad port").into();
        assert!(matches!(err, AdapterError::Config(_)));
        assert!(err.to_string().contains("bad port"));
        assert!(err.operation().is_none());
    }
}
