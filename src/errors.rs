// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Error taxonomy for routing, ingestion and storage.

use thiserror::Error;

/// Failure talking to a routing engine, baseline or paid.
#[derive(Debug, Error)]
pub enum RoutingEngineError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("engine returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed engine response: {0}")]
    Malformed(String),

    #[error("engine found no route")]
    NoRoute,

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl RoutingEngineError {
    /// Maps a reqwest error, folding timeouts into their own variant.
    pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            RoutingEngineError::Timeout(timeout_ms)
        } else {
            RoutingEngineError::Network(err)
        }
    }
}

/// The only hard failure `compute_route` surfaces.
#[derive(Debug, Error)]
pub enum RouteCalculationError {
    #[error("baseline routing engine failed: {0}")]
    BaselineEngine(#[source] RoutingEngineError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not get a database connection: {0}")]
    Pool(String),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("bad stored geometry: {0}")]
    Geometry(String),

    #[error("could not (de)serialize stored json: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("missing row: {0}")]
    NotFound(String),
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for StoreError {
    fn from(err: bb8::RunError<E>) -> Self {
        StoreError::Pool(err.to_string())
    }
}

/// Anything that goes wrong while polling one feed source.
#[derive(Debug, Error)]
pub enum FeedPollError {
    #[error("http error fetching feed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned http status {0}")]
    Status(u16),

    #[error("feed payload is not valid json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("feed payload is not usable: {0}")]
    Payload(String),

    #[error("unsupported feed format: {0}")]
    UnsupportedFormat(String),

    #[error("store error while ingesting: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_become_store_errors() {
        let err: bb8::RunError<diesel_async::pooled_connection::PoolError> =
            bb8::RunError::TimedOut;

        let store_error = StoreError::from(err);

        assert!(matches!(store_error, StoreError::Pool(ref message) if message.contains("Timed out")));
    }
}
