//! Decay, aggregation and ingestion for the radioactivity engine.
//!
//! Incidents enter through the [`IngestionEndpoint`], which validates each
//! item of a batch on its own and hands valid incidents to the
//! [`Aggregator`]. The aggregator merges them into per-entity scores held
//! by a [`ScoreStore`], evaluating decay lazily on every read and merge.
//! A background sweep keeps stored values fresh and reclaims long-decayed
//! scores.
//!
//! # Modules
//!
//! - [`aggregator`] -- Merge rule, lazy reads, top list and decay sweep.
//! - [`config`] -- Configuration loading from `radioactivity.yaml` into
//!   strongly-typed structs.
//! - [`decay`] -- Exponential, linear and count decay profiles.
//! - [`emitter`] -- Incidents attached to rendered entities.
//! - [`ingest`] -- Batch validation and forwarding.
//! - [`signing`] -- HMAC signatures on emitted incidents.
//! - [`store`] -- [`ScoreStore`] trait and [`MemoryScoreStore`].
//! - [`sweep`] -- Periodic sweep task.
//!
//! [`IngestionEndpoint`]: ingest::IngestionEndpoint
//! [`Aggregator`]: aggregator::Aggregator
//! [`ScoreStore`]: store::ScoreStore
//! [`MemoryScoreStore`]: store::MemoryScoreStore

pub mod aggregator;
pub mod config;
pub mod decay;
pub mod emitter;
pub mod ingest;
pub mod signing;
pub mod store;
pub mod sweep;
