//! Cache error types.

use thiserror::Error;

/// Failures raised by a cache tier.
///
/// Coordinators never surface these to callers; they are logged and the
/// affected tier is treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached (pool exhausted, connection refused).
    #[error("cache backend unavailable: {message}")]
    Unavailable { message: String },

    /// The backend was reached but rejected the command.
    #[error("cache backend error: {message}")]
    Backend { message: String },

    /// A payload could not be encoded or decoded.
    #[error("cache payload serialization failed: {message}")]
    Serialization { message: String },
}

impl CacheError {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            Self::unavailable(err.to_string())
        } else {
            Self::backend(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::unavailable(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CacheError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CacheError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// The caller's cancellation signal fired before the request completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request cancelled")]
pub struct Cancelled;

/// Outcome of dispatching a request through the pipeline.
///
/// Handler failures pass through unchanged; cache failures never appear here.
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Handler(E),
}

impl<E> DispatchError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the handler error, if this is one.
    pub fn into_handler(self) -> Option<E> {
        match self {
            Self::Handler(err) => Some(err),
            Self::Cancelled => None,
        }
    }
}

impl<E> From<Cancelled> for DispatchError<E> {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
