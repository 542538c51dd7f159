//! Routing error types

use crate::registry::RegistryError;
use thiserror::Error;

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors raised while planning a query.
#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    /// Registry lookup failed (unroutable key, unknown shard)
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RoutingError {
    /// Stable string code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Registry(e) => e.code(),
        }
    }
}
