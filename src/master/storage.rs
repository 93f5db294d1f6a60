//! Persistence of match state and metadata.
//!
//! Backends implement either the async [`Storage`] trait directly or the
//! blocking [`SyncStorage`] trait, which [`Blocking`] lifts into `Storage`.
//! Metadata is stored under [`metadata_key`].

use crate::master::error::StorageError;
use crate::master::metadata::GameMetadata;
use crate::state::{GameData, State};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument};

/// Key under which a match's metadata is stored.
pub fn metadata_key(game_id: &str) -> String {
    format!("{}:metadata", game_id)
}

/// Async storage backend.
#[async_trait]
pub trait Storage<G: GameData>: Send + Sync {
    /// Loads the state of a match.
    async fn get_state(&self, game_id: &str) -> Result<Option<State<G>>, StorageError>;

    /// Stores the state of a match.
    async fn set_state(&self, game_id: &str, state: State<G>) -> Result<(), StorageError>;

    /// Loads the metadata of a match.
    async fn get_metadata(&self, game_id: &str) -> Result<Option<GameMetadata>, StorageError>;

    /// Stores the metadata of a match.
    async fn set_metadata(&self, game_id: &str, metadata: GameMetadata) -> Result<(), StorageError>;
}

/// Blocking storage backend.
pub trait SyncStorage<G: GameData>: Send + Sync {
    /// Loads the state of a match.
    fn get_state(&self, game_id: &str) -> Result<Option<State<G>>, StorageError>;

    /// Stores the state of a match.
    fn set_state(&self, game_id: &str, state: State<G>) -> Result<(), StorageError>;

    /// Loads the metadata of a match.
    fn get_metadata(&self, game_id: &str) -> Result<Option<GameMetadata>, StorageError>;

    /// Stores the metadata of a match.
    fn set_metadata(&self, game_id: &str, metadata: GameMetadata) -> Result<(), StorageError>;
}

/// Exposes a [`SyncStorage`] through the async [`Storage`] interface.
#[derive(Debug, Default)]
pub struct Blocking<S>(S);

impl<S> Blocking<S> {
    /// Wraps a blocking backend.
    pub fn new(inner: S) -> Self {
        Self(inner)
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.0
    }
}

#[async_trait]
impl<G, S> Storage<G> for Blocking<S>
where
    G: GameData,
    S: SyncStorage<G>,
{
    async fn get_state(&self, game_id: &str) -> Result<Option<State<G>>, StorageError> {
        self.0.get_state(game_id)
    }

    async fn set_state(&self, game_id: &str, state: State<G>) -> Result<(), StorageError> {
        self.0.set_state(game_id, state)
    }

    async fn get_metadata(&self, game_id: &str) -> Result<Option<GameMetadata>, StorageError> {
        self.0.get_metadata(game_id)
    }

    async fn set_metadata(
        &self,
        game_id: &str,
        metadata: GameMetadata,
    ) -> Result<(), StorageError> {
        self.0.set_metadata(game_id, metadata)
    }
}

/// In-process backend keeping everything in hash maps.
#[derive(Debug)]
pub struct InMemoryStorage<G> {
    states: Mutex<HashMap<String, State<G>>>,
    metadata: Mutex<HashMap<String, GameMetadata>>,
}

impl<G> Default for InMemoryStorage<G> {
    fn default() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            metadata: Mutex::new(HashMap::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<G: GameData> InMemoryStorage<G> {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the store for use as an async [`Storage`].
    pub fn into_async(self) -> Blocking<Self> {
        Blocking::new(self)
    }

    /// IDs of every stored match.
    pub fn game_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.states).keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl<G: GameData> SyncStorage<G> for InMemoryStorage<G> {
    #[instrument(skip(self))]
    fn get_state(&self, game_id: &str) -> Result<Option<State<G>>, StorageError> {
        Ok(lock(&self.states).get(game_id).cloned())
    }

    #[instrument(skip(self, state), fields(state_id = state.state_id))]
    fn set_state(&self, game_id: &str, state: State<G>) -> Result<(), StorageError> {
        debug!("Storing state");
        lock(&self.states).insert(game_id.to_string(), state);
        Ok(())
    }

    #[instrument(skip(self))]
    fn get_metadata(&self, game_id: &str) -> Result<Option<GameMetadata>, StorageError> {
        Ok(lock(&self.metadata).get(&metadata_key(game_id)).cloned())
    }

    #[instrument(skip(self, metadata))]
    fn set_metadata(&self, game_id: &str, metadata: GameMetadata) -> Result<(), StorageError> {
        lock(&self.metadata).insert(metadata_key(game_id), metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Game, MoveDef, MoveResult};
    use crate::reducer::Reducer;
    use std::sync::Arc;

    fn sample_state() -> State<u8> {
        Reducer::new(
            Game::new("noop", |_ctx, _random, _data| 0u8)
                .with_move("noop", MoveDef::new(|mc, _args| MoveResult::NewState(*mc.g))),
        )
        .initialize(2, None)
    }

    #[test]
    fn test_metadata_key_format() {
        assert_eq!(metadata_key("abc"), "abc:metadata");
    }

    #[tokio::test]
    async fn test_blocking_adapter_roundtrip() {
        let backend = Arc::new(InMemoryStorage::<u8>::new().into_async());
        let storage: Arc<dyn Storage<u8>> = backend.clone();
        assert!(storage.get_state("m1").await.unwrap().is_none());

        storage.set_state("m1", sample_state()).await.unwrap();
        storage
            .set_metadata("m1", GameMetadata::open_seats("noop", 2))
            .await
            .unwrap();

        let state = storage.get_state("m1").await.unwrap().unwrap();
        assert_eq!(state.ctx.num_players, 2);
        assert!(storage.get_metadata("m1").await.unwrap().is_some());
        assert_eq!(backend.inner().game_ids(), vec!["m1".to_string()]);
    }
}
