use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur against the key-value store or its payloads
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("key-value store error: {source}")]
    Store {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("cache payload serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Wrap any backend error
    pub fn store<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store {
            source: Box::new(error),
        }
    }
}
