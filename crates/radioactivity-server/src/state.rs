//! Shared application state for the HTTP API.
//!
//! [`AppState`] holds the ingestion endpoint (and through it the
//! aggregator and score store), the emitter used to render incidents for
//! the presentation layer, and request limits. Handlers share one
//! instance behind an [`Arc`](std::sync::Arc).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use radioactivity_core::aggregator::Aggregator;
use radioactivity_core::emitter::Emitter;
use radioactivity_core::ingest::IngestionEndpoint;

/// Default value for [`AppState::max_batch_size`].
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// State shared by every request handler.
pub struct AppState {
    /// Validates and forwards incident batches.
    pub ingest: IngestionEndpoint,
    /// Renders incidents for entities on request.
    pub emitter: Emitter,
    /// Largest batch `POST /api/incidents` accepts.
    pub max_batch_size: usize,
    /// When the server state was created.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state with the default batch limit.
    pub fn new(ingest: IngestionEndpoint, emitter: Emitter) -> Self {
        Self {
            ingest,
            emitter,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            started_at: Utc::now(),
        }
    }

    /// Override the batch limit.
    #[must_use]
    pub const fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// The aggregator behind the ingestion endpoint.
    pub const fn aggregator(&self) -> &Arc<Aggregator> {
        self.ingest.aggregator()
    }
}
