//! Delivery of sync and update messages to connected clients.

use crate::master::error::TransportError;
use crate::master::metadata::PublicPlayer;
use crate::state::{GameData, LogEntry, PlayerId, State};
use async_trait::async_trait;
use derive_new::new;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Snapshot sent to a client joining a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "G: Serialize", deserialize = "G: DeserializeOwned"))]
pub struct SyncInfo<G> {
    /// Match ID.
    #[serde(rename = "gameID")]
    pub game_id: String,
    /// State filtered for the recipient.
    pub state: State<G>,
    /// Full log, redacted for the recipient.
    pub log: Vec<LogEntry>,
    /// Public roster, when the match has metadata.
    pub filtered_metadata: Option<Vec<PublicPlayer>>,
}

/// Incremental update broadcast after an accepted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "G: Serialize", deserialize = "G: DeserializeOwned"))]
pub struct UpdateInfo<G> {
    /// Match ID.
    #[serde(rename = "gameID")]
    pub game_id: String,
    /// State filtered for the recipient.
    pub state: State<G>,
    /// Entries produced by the action, redacted for the recipient.
    pub deltalog: Vec<LogEntry>,
}

/// Messages pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "lowercase")]
#[serde(bound(serialize = "G: Serialize", deserialize = "G: DeserializeOwned"))]
pub enum TransportMessage<G> {
    /// Full snapshot.
    Sync(SyncInfo<G>),
    /// Incremental update.
    Update(UpdateInfo<G>),
}

/// A message addressed to one client of a match.
#[derive(Debug, Clone, new)]
pub struct Envelope<G> {
    /// Match ID.
    pub game_id: String,
    /// Recipient (`None` for spectators).
    pub player_id: Option<PlayerId>,
    /// The message.
    pub message: TransportMessage<G>,
}

/// Builds the message for one recipient of a broadcast.
pub type MessageFor<'a, G> = dyn Fn(Option<&str>) -> TransportMessage<G> + Send + Sync + 'a;

/// Connection fan-out.
#[async_trait]
pub trait Transport<G: GameData>: Send + Sync {
    /// Sends a message to the connections of one recipient.
    async fn send(&self, envelope: Envelope<G>) -> Result<(), TransportError>;

    /// Sends a per-recipient message to every connection of a match.
    async fn send_all(
        &self,
        game_id: &str,
        message_for: &MessageFor<'_, G>,
    ) -> Result<(), TransportError>;
}

struct Connection<G> {
    player_id: Option<PlayerId>,
    sender: mpsc::UnboundedSender<TransportMessage<G>>,
}

/// Transport backed by unbounded tokio channels, one per connection.
pub struct ChannelTransport<G> {
    connections: Mutex<HashMap<String, Vec<Connection<G>>>>,
}

impl<G> Default for ChannelTransport<G> {
    fn default() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }
}

impl<G> std::fmt::Debug for ChannelTransport<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let games = self.lock().len();
        f.debug_struct("ChannelTransport").field("games", &games).finish()
    }
}

impl<G> ChannelTransport<G> {
    /// Transport without connections.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Connection<G>>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a connection and returns its receiving end.
    #[instrument(skip(self))]
    pub fn connect(
        &self,
        game_id: &str,
        player_id: Option<&str>,
    ) -> mpsc::UnboundedReceiver<TransportMessage<G>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().entry(game_id.to_string()).or_default().push(Connection {
            player_id: player_id.map(str::to_string),
            sender,
        });
        debug!("Client connected");
        receiver
    }

    /// Number of open connections for a match.
    pub fn connection_count(&self, game_id: &str) -> usize {
        self.lock()
            .get(game_id)
            .map(|connections| connections.iter().filter(|c| !c.sender.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl<G: GameData> Transport<G> for ChannelTransport<G> {
    #[instrument(
        skip(self, envelope),
        fields(game_id = %envelope.game_id, player = ?envelope.player_id)
    )]
    async fn send(&self, envelope: Envelope<G>) -> Result<(), TransportError> {
        let mut connections = self.lock();
        let Some(game) = connections.get_mut(&envelope.game_id) else {
            debug!("No connections for game");
            return Ok(());
        };
        game.retain(|connection| !connection.sender.is_closed());
        for connection in game.iter().filter(|c| c.player_id == envelope.player_id) {
            if connection.sender.send(envelope.message.clone()).is_err() {
                warn!("Connection closed while sending");
            }
        }
        Ok(())
    }

    #[instrument(skip(self, message_for))]
    async fn send_all(
        &self,
        game_id: &str,
        message_for: &MessageFor<'_, G>,
    ) -> Result<(), TransportError> {
        let mut connections = self.lock();
        let Some(game) = connections.get_mut(game_id) else {
            debug!("No connections for game");
            return Ok(());
        };
        game.retain(|connection| !connection.sender.is_closed());
        for connection in game.iter() {
            let message = message_for(connection.player_id.as_deref());
            if connection.sender.send(message).is_err() {
                warn!(player = ?connection.player_id, "Connection closed while broadcasting");
            }
        }
        debug!(recipients = game.len(), "Broadcast sent");
        Ok(())
    }
}
