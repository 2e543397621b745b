//! Error types for key derivation, TTL lookup and the compute facade.

use crate::cache::key::CacheKey;
use std::sync::Arc;
use std::time::Duration;

/// A namespace/filter pair could not be turned into an unambiguous key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyEncodingError {
    #[error("invalid cache namespace {0:?}: must be non-empty and contain no ':'")]
    InvalidNamespace(String),
    #[error("filters are not serializable: {0}")]
    Unserializable(String),
    #[error("filters must serialize to an object, got {0}")]
    NotAnObject(&'static str),
}

/// A TTL class name that is not part of the policy table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown TTL class `{0}`")]
pub struct UnknownTtlClass(pub String);

/// Failure surfaced by [`ComputeCache`](crate::cache::ComputeCache).
///
/// Producer errors are passed through untouched: every caller coalesced onto
/// the same computation receives a clone of the same `Arc`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<E> {
    #[error(transparent)]
    Key(#[from] KeyEncodingError),
    #[error("{0}")]
    Producer(Arc<E>),
    #[error("gave up waiting for `{key}` after {waited:?}")]
    Timeout { key: CacheKey, waited: Duration },
}

impl<E> CacheError<E> {
    /// The producer's error, if this failure came from the producer.
    pub fn producer_error(&self) -> Option<&Arc<E>> {
        match self {
            CacheError::Producer(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::Timeout { .. })
    }
}
