//! Score store trait and the sharded in-memory implementation.
//!
//! The store is the single serialization point for score mutations: every
//! read-modify-write on one entity goes through [`ScoreStore::update`],
//! which the implementation must run atomically with respect to every
//! other operation on the same entity id. Operations on different entity
//! ids must not contend on a global lock.
//!
//! [`MemoryScoreStore`] splits the key space into a fixed number of shards,
//! each guarded by its own [`tokio::sync::Mutex`]. The `PostgreSQL`
//! implementation lives in the `radioactivity-db` crate.

use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};

use async_trait::async_trait;
use radioactivity_types::{EntityId, Score};
use tokio::sync::Mutex;

/// Errors raised by a score store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("score store unavailable: {message}")]
    Unavailable {
        /// Backend error message.
        message: String,
    },

    /// The operation did not finish within the configured bound.
    #[error("score store operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The bound that was exceeded.
        timeout_ms: u64,
    },
}

/// Read-modify-write step passed to [`ScoreStore::update`].
///
/// Receives the current record (if any) and returns the record to store.
/// Returning `None` leaves an absent entity absent and removes a present
/// one.
pub type ScoreUpdate<'a> = &'a (dyn Fn(Option<&Score>) -> Option<Score> + Send + Sync);

/// Keyed persistence for [`Score`] records.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Fetch the stored record for `entity_id`.
    async fn get(&self, entity_id: &EntityId) -> Result<Option<Score>, StoreError>;

    /// Insert or replace the record for `score.entity_id()`.
    async fn upsert(&self, score: Score) -> Result<(), StoreError>;

    /// Atomically apply `step` to the record for `entity_id`.
    ///
    /// Returns the record as stored afterwards (`None` when absent).
    async fn update(
        &self,
        entity_id: &EntityId,
        step: ScoreUpdate<'_>,
    ) -> Result<Option<Score>, StoreError>;

    /// Delete the record for `entity_id`. Returns whether one existed.
    async fn remove(&self, entity_id: &EntityId) -> Result<bool, StoreError>;

    /// Snapshot of every stored record, in no particular order.
    async fn scan(&self) -> Result<Vec<Score>, StoreError>;

    /// At most `limit` records with the highest stored values, highest
    /// first.
    ///
    /// Stored values are never below the decayed value, so the true
    /// leaders at any later time are drawn from the head of this list.
    /// Backends that can rank without reading every record should
    /// override this.
    async fn candidates(&self, limit: usize) -> Result<Vec<Score>, StoreError> {
        let mut scores = self.scan().await?;
        scores.sort_by(|a, b| {
            b.value()
                .total_cmp(&a.value())
                .then_with(|| a.entity_id().cmp(b.entity_id()))
        });
        scores.truncate(limit);
        Ok(scores)
    }

    /// Short backend name for logging.
    fn backend_name(&self) -> &'static str;
}

type Shard = Mutex<HashMap<EntityId, Score>>;

/// In-process score store with per-shard locking.
///
/// Entity ids are hashed onto one of `shard_count` shards. Two entities
/// only contend if they land on the same shard, and then only for the
/// duration of a single map operation.
#[derive(Debug)]
pub struct MemoryScoreStore {
    shards: Box<[Shard]>,
    hasher: RandomState,
}

impl MemoryScoreStore {
    /// Create an empty store with `shard_count` shards (at least one).
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of stored records.
    pub async fn len(&self) -> usize {
        let mut total: usize = 0;
        for shard in &*self.shards {
            total = total.saturating_add(shard.lock().await.len());
        }
        total
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[allow(clippy::cast_possible_truncation, clippy::indexing_slicing)]
    fn shard(&self, entity_id: &EntityId) -> &Shard {
        let hash = self.hasher.hash_one(entity_id);
        // shards is never empty, see `new`.
        let index = hash.checked_rem(self.shards.len() as u64).unwrap_or(0) as usize;
        &self.shards[index]
    }
}

impl Default for MemoryScoreStore {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn get(&self, entity_id: &EntityId) -> Result<Option<Score>, StoreError> {
        Ok(self.shard(entity_id).lock().await.get(entity_id).cloned())
    }

    async fn upsert(&self, score: Score) -> Result<(), StoreError> {
        let mut shard = self.shard(score.entity_id()).lock().await;
        shard.insert(score.entity_id().clone(), score);
        Ok(())
    }

    async fn update(
        &self,
        entity_id: &EntityId,
        step: ScoreUpdate<'_>,
    ) -> Result<Option<Score>, StoreError> {
        let mut shard = self.shard(entity_id).lock().await;
        match step(shard.get(entity_id)) {
            Some(next) => {
                shard.insert(entity_id.clone(), next.clone());
                Ok(Some(next))
            }
            None => {
                shard.remove(entity_id);
                Ok(None)
            }
        }
    }

    async fn remove(&self, entity_id: &EntityId) -> Result<bool, StoreError> {
        Ok(self
            .shard(entity_id)
            .lock()
            .await
            .remove(entity_id)
            .is_some())
    }

    async fn scan(&self) -> Result<Vec<Score>, StoreError> {
        let mut all = Vec::new();
        for shard in &*self.shards {
            all.extend(shard.lock().await.values().cloned());
        }
        Ok(all)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
