//! Authoritative match coordinator.
//!
//! The master owns nothing but references to its collaborators: it loads a
//! match from [`Storage`], checks the request, runs the [`Reducer`],
//! broadcasts per-recipient views through [`Transport`] and persists the new
//! state. Requests for the same match are serialized by a per-match lock, and
//! the client's `_stateID` is still compared against the stored one so stale
//! clients are turned away.

mod auth;
mod error;
mod metadata;
mod redact;
mod storage;
mod transport;

pub use auth::{
    Authenticator, CredentialAuth, CustomAuth, NoAuth, does_game_require_authentication,
    is_action_from_authentic_player,
};
pub use error::{MasterError, MasterErrorKind, StorageError, TransportError};
pub use metadata::{GameMetadata, PlayerMetadata, PublicPlayer};
pub use redact::{filtered_state, redact_log};
pub use storage::{Blocking, InMemoryStorage, Storage, SyncStorage, metadata_key};
pub use transport::{
    ChannelTransport, Envelope, MessageFor, SyncInfo, Transport, TransportMessage, UpdateInfo,
};

use crate::action::Action;
use crate::game::Game;
use crate::reducer::Reducer;
use crate::state::{GameData, LogEntry, State};
use derive_more::Display;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, instrument, warn};

/// Why an update was turned away without touching the match.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Rejection {
    /// The match already ended.
    #[display("game over")]
    GameOver,
    /// Undo and redo need the current player and no active-player set.
    #[display("undo/redo not allowed right now")]
    UndoNotAllowed,
    /// The player may not act right now.
    #[display("player not active")]
    PlayerNotActive,
    /// The move does not exist for this player in the current phase or stage.
    #[display("move {} unavailable", _0)]
    MoveUnavailable(String),
    /// The client's state version does not match the stored one.
    #[display("stale state: expected {}, received {}", expected, received)]
    StaleState {
        /// Stored version.
        expected: u64,
        /// Version the client sent.
        received: u64,
    },
    /// The reducer refused the action.
    #[display("action refused")]
    Refused,
    /// Clients may not replace the state wholesale.
    #[display("restore is not accepted from clients")]
    RestoreNotAllowed,
}

/// Result of a handled update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The action was applied, broadcast and persisted.
    Applied {
        /// New state version.
        state_id: u64,
        /// Entries the action produced, unredacted.
        deltalog: Vec<LogEntry>,
    },
    /// The action was turned away; nothing was broadcast or stored.
    Rejected(Rejection),
}

impl UpdateOutcome {
    /// Returns true for [`UpdateOutcome::Applied`].
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Per-match async locks.
///
/// An entry lives only while someone holds or waits for its lock.
#[derive(Debug, Default)]
struct MatchLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MatchLocks {
    async fn acquire(&self, game_id: &str) -> MatchGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(game_id.to_string()).or_default())
        };
        MatchGuard {
            locks: self,
            game_id: game_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive access to one match.
struct MatchGuard<'a> {
    locks: &'a MatchLocks,
    game_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MatchGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map's own handle is the only one left: nobody holds or awaits the lock.
        if locks.get(&self.game_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.game_id);
            debug!(game_id = %self.game_id, "Released match lock");
        }
    }
}

/// Coordinates one game type across many matches.
pub struct Master<G: GameData> {
    reducer: Reducer<G>,
    storage: Arc<dyn Storage<G>>,
    transport: Arc<dyn Transport<G>>,
    auth: Arc<dyn Authenticator>,
    locks: MatchLocks,
}

impl<G: GameData> std::fmt::Debug for Master<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Master")
            .field("game", &self.reducer.game().name())
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl<G: GameData> Master<G> {
    /// Master without authentication.
    #[instrument(skip_all, fields(game = %game.name()))]
    pub fn new(
        game: Game<G>,
        storage: Arc<dyn Storage<G>>,
        transport: Arc<dyn Transport<G>>,
    ) -> Self {
        info!("Creating master");
        Self {
            reducer: Reducer::new(game),
            storage,
            transport,
            auth: Arc::new(NoAuth),
            locks: MatchLocks::default(),
        }
    }

    /// Replaces the authenticator.
    pub fn with_auth(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = auth;
        self
    }

    /// The reducer used for every match.
    pub fn reducer(&self) -> &Reducer<G> {
        &self.reducer
    }

    /// Handles an action submitted by `player_id` against version `state_id`.
    #[instrument(skip(self, action), fields(action = action.kind()))]
    pub async fn on_update(
        &self,
        action: Action<G>,
        state_id: u64,
        game_id: &str,
        player_id: &str,
    ) -> Result<UpdateOutcome, MasterError> {
        let _guard = self.locks.acquire(game_id).await;

        let metadata = self.storage.get_metadata(game_id).await?;
        if self.auth.requires_auth(metadata.as_ref()) {
            let seat = metadata.as_ref().and_then(|metadata| metadata.player(player_id));
            if !self.auth.authenticate(action.credentials(), seat).await {
                warn!("Unauthorized action");
                return Err(MasterError::unauthorized());
            }
        }

        let Some(state) = self.storage.get_state(game_id).await? else {
            error!("Game not found");
            return Err(MasterError::game_not_found());
        };

        if let Some(rejection) = self.check(&state, &action, state_id, player_id) {
            info!(%rejection, "Update rejected");
            return Ok(UpdateOutcome::Rejected(rejection));
        }

        let action = action.with_player(player_id);
        let previous_log_len = state.log.len();
        let previous_state_id = state.state_id;
        let next = self.reducer.reduce(state, &action);
        if next.state_id == previous_state_id {
            info!("Reducer refused the action");
            return Ok(UpdateOutcome::Rejected(Rejection::Refused));
        }
        let deltalog: Vec<LogEntry> = next
            .log
            .get(previous_log_len..)
            .map(<[LogEntry]>::to_vec)
            .unwrap_or_default();

        let game = self.reducer.game();
        let message_for = |recipient: Option<&str>| {
            TransportMessage::Update(UpdateInfo {
                game_id: game_id.to_string(),
                state: filtered_state(game, &next, recipient),
                deltalog: redact_log(&deltalog, recipient),
            })
        };
        self.transport.send_all(game_id, &message_for).await?;

        let new_state_id = next.state_id;
        let gameover = next.ctx.gameover.clone();
        self.storage.set_state(game_id, next).await?;

        if let (Some(gameover), Some(mut metadata)) = (gameover, metadata) {
            metadata.set_gameover(gameover);
            self.storage.set_metadata(game_id, metadata).await?;
        }

        debug!(state_id = new_state_id, entries = deltalog.len(), "Update applied");
        Ok(UpdateOutcome::Applied {
            state_id: new_state_id,
            deltalog,
        })
    }

    fn check(
        &self,
        state: &State<G>,
        action: &Action<G>,
        state_id: u64,
        player_id: &str,
    ) -> Option<Rejection> {
        if state.ctx.is_game_over() {
            return Some(Rejection::GameOver);
        }

        if matches!(action, Action::Restore(_)) {
            return Some(Rejection::RestoreNotAllowed);
        }

        if matches!(action, Action::Undo(_) | Action::Redo(_))
            && (state.ctx.current_player != player_id || state.ctx.active_players.is_some())
        {
            return Some(Rejection::UndoNotAllowed);
        }

        let flow = self.reducer.flow();
        if !flow.is_player_active(&state.g, &state.ctx, player_id) {
            return Some(Rejection::PlayerNotActive);
        }

        let mut ignore_stale = false;
        if let Action::MakeMove(payload) = action {
            match flow.get_move(&state.ctx, &payload.move_type, player_id) {
                Some(def) => ignore_stale = def.ignores_stale_state_id(),
                None => return Some(Rejection::MoveUnavailable(payload.move_type.clone())),
            }
        }

        if !ignore_stale && state.state_id != state_id {
            return Some(Rejection::StaleState {
                expected: state.state_id,
                received: state_id,
            });
        }
        None
    }

    /// Sends the current view of a match to one client, creating the match if needed.
    #[instrument(skip(self))]
    pub async fn on_sync(
        &self,
        game_id: &str,
        player_id: Option<&str>,
        num_players: usize,
    ) -> Result<SyncInfo<G>, MasterError> {
        let _guard = self.locks.acquire(game_id).await;

        let metadata = self.storage.get_metadata(game_id).await?;
        let state = match self.storage.get_state(game_id).await? {
            Some(state) => state,
            None => {
                let setup_data = metadata
                    .as_ref()
                    .and_then(|metadata| metadata.setup_data().as_ref());
                let state = self.reducer.initialize(num_players, setup_data);
                info!(num_players = state.ctx.num_players, "Created match on first sync");
                self.storage.set_state(game_id, state).await?;
                self.storage
                    .get_state(game_id)
                    .await?
                    .ok_or_else(MasterError::game_not_found)?
            }
        };

        let info = SyncInfo {
            game_id: game_id.to_string(),
            state: filtered_state(self.reducer.game(), &state, player_id),
            log: redact_log(&state.log, player_id),
            filtered_metadata: metadata.as_ref().map(GameMetadata::public_players),
        };

        self.transport
            .send(Envelope::new(
                game_id.to_string(),
                player_id.map(str::to_string),
                TransportMessage::Sync(info.clone()),
            ))
            .await?;
        debug!(state_id = state.state_id, "Sync sent");
        Ok(info)
    }

    /// Records a player's connection status in the match metadata.
    #[instrument(skip(self))]
    pub async fn on_connection_change(
        &self,
        game_id: &str,
        player_id: &str,
        connected: bool,
    ) -> Result<(), MasterError> {
        let _guard = self.locks.acquire(game_id).await;

        let Some(mut metadata) = self.storage.get_metadata(game_id).await? else {
            error!("Metadata not found");
            return Err(MasterError::game_not_found());
        };
        let Some(seat) = metadata.player_mut(player_id) else {
            warn!("Player not in roster");
            return Ok(());
        };
        seat.set_connected(connected);
        metadata.touch();
        self.storage.set_metadata(game_id, metadata).await?;
        info!(connected, "Connection status updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_entry_removed_after_release() {
        let locks = MatchLocks::default();
        let first = locks.acquire("a").await;
        let other = locks.acquire("b").await;
        assert_eq!(locks.len(), 2);

        drop(first);
        assert_eq!(locks.len(), 1);
        drop(other);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_waiting() {
        let locks = MatchLocks::default();
        let held = locks.acquire("a").await;
        let waiter = locks.acquire("a");
        tokio::pin!(waiter);
        // Poll once so the waiter registers its handle.
        assert!(poll_once(waiter.as_mut()).await.is_none());

        drop(held);
        assert_eq!(locks.len(), 1);
        let next = waiter.await;
        assert_eq!(locks.len(), 1);
        drop(next);
        assert_eq!(locks.len(), 0);
    }

    async fn poll_once<F: std::future::Future + Unpin>(future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            output = future => Some(output),
            _ = tokio::task::yield_now() => None,
        }
    }
}
