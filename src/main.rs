//! Strictly Turns - demo binary
//!
//! Plays a scripted match through the master with in-memory storage and the
//! channel transport, logging every message each client receives.

#![warn(missing_docs)]

mod cli;

use anyhow::{Result, bail};
use clap::Parser;
use cli::{Cli, Command, DemoGame};
use serde_json::json;
use std::sync::Arc;
use strictly_turns::games::secret_draw::{self, DECK_TOP, HAND_SIZE};
use strictly_turns::games::tictactoe;
use strictly_turns::{
    Action, AuthMode, ChannelTransport, Game, GameData, GameMetadata, InMemoryStorage, Master,
    MasterConfig, PlayerMetadata, State, Storage, TransportMessage, UpdateOutcome,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

const GAME_ID: &str = "demo";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Demo { game, config, seed } => {
            let mut config = match config {
                Some(path) => MasterConfig::from_file(path)?,
                None => MasterConfig::default(),
            };
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }

            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
                )
                .init();

            match game {
                DemoGame::Tictactoe => run_tictactoe(&config).await,
                DemoGame::SecretDraw => run_secret_draw(&config).await,
            }
        }
    }
}

/// A client connection held by the demo.
struct Client<G> {
    player_id: Option<String>,
    receiver: UnboundedReceiver<TransportMessage<G>>,
}

/// Match wiring shared by both demos.
struct Session<G: GameData> {
    master: Master<G>,
    clients: Vec<Client<G>>,
    credentials: bool,
    state_id: u64,
}

impl<G: GameData> Session<G> {
    #[instrument(skip_all, fields(game = %game.name(), num_players = num_players))]
    async fn open(game: Game<G>, config: &MasterConfig, num_players: usize) -> Result<Self> {
        let game = match config.seed() {
            Some(seed) => game.with_seed(*seed),
            None => game,
        };
        let credentials = *config.auth() == AuthMode::Credentials;

        let storage: Arc<dyn Storage<G>> = Arc::new(InMemoryStorage::<G>::new().into_async());
        let seats = (0..num_players as u32)
            .map(|id| {
                let seat = PlayerMetadata::new(id).with_name(format!("player {}", id));
                if credentials { seat.with_credentials(secret(id)) } else { seat }
            })
            .collect();
        storage
            .set_metadata(GAME_ID, GameMetadata::new(game.name(), seats))
            .await?;

        let transport = Arc::new(ChannelTransport::<G>::new());
        let mut clients: Vec<Client<G>> = (0..num_players)
            .map(|id| {
                let player_id = id.to_string();
                Client {
                    receiver: transport.connect(GAME_ID, Some(&player_id)),
                    player_id: Some(player_id),
                }
            })
            .collect();
        clients.push(Client {
            player_id: None,
            receiver: transport.connect(GAME_ID, None),
        });

        let master = Master::new(game, storage, transport).with_auth(config.authenticator());
        let mut session = Self {
            master,
            clients,
            credentials,
            state_id: 0,
        };
        for id in 0..num_players {
            let sync = session.master.on_sync(GAME_ID, Some(&id.to_string()), num_players).await?;
            session.state_id = sync.state.state_id;
            session.master.on_connection_change(GAME_ID, &id.to_string(), true).await?;
        }
        session.master.on_sync(GAME_ID, None, num_players).await?;
        session.drain()?;
        Ok(session)
    }

    /// Submits a move and returns the deltalog size.
    async fn play(
        &mut self,
        player_id: &str,
        move_type: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<usize> {
        let mut action = Action::make_move(move_type, args, player_id);
        if self.credentials {
            action = action.with_credentials(secret(player_id.parse()?));
        }
        let outcome = self.master.on_update(action, self.state_id, GAME_ID, player_id).await?;
        let entries = match outcome {
            UpdateOutcome::Applied { state_id, deltalog } => {
                self.state_id = state_id;
                deltalog.len()
            }
            UpdateOutcome::Rejected(rejection) => {
                bail!("{} by {} rejected: {}", move_type, player_id, rejection)
            }
        };
        self.drain()?;
        Ok(entries)
    }

    /// Logs every message waiting on each connection.
    fn drain(&mut self) -> Result<()> {
        for client in &mut self.clients {
            while let Ok(message) = client.receiver.try_recv() {
                let kind = match &message {
                    TransportMessage::Sync(_) => "sync",
                    TransportMessage::Update(_) => "update",
                };
                info!(
                    recipient = client.player_id.as_deref().unwrap_or("spectator"),
                    kind,
                    message = %serde_json::to_string(&message)?,
                    "Replicated"
                );
            }
        }
        Ok(())
    }

    /// Current state as seen by `player_id`.
    async fn view(&self, player_id: Option<&str>) -> Result<State<G>> {
        let sync = self.master.on_sync(GAME_ID, player_id, 0).await?;
        Ok(sync.state)
    }
}

fn secret(id: u32) -> String {
    format!("secret-{}", id)
}

#[instrument(skip(config))]
async fn run_tictactoe(config: &MasterConfig) -> Result<()> {
    if *config.num_players() != 2 {
        warn!(num_players = config.num_players(), "Tic-tac-toe is played by two seats");
    }
    let mut session = Session::open(tictactoe::tictactoe(), config, 2).await?;

    for (player_id, pos) in [("0", 0), ("1", 1), ("0", 4), ("1", 2), ("0", 8)] {
        let entries = session.play(player_id, "place", vec![json!(pos)]).await?;
        info!(player_id, pos, entries, "Placed");
    }

    let state = session.view(None).await?;
    session.drain()?;
    println!("{}", state.g.display());
    println!("result: {}", state.ctx.gameover.unwrap_or_default());
    Ok(())
}

#[instrument(skip(config))]
async fn run_secret_draw(config: &MasterConfig) -> Result<()> {
    let num_players = *config.num_players();
    if num_players * HAND_SIZE > DECK_TOP as usize {
        bail!("{} players need more than {} cards", num_players, DECK_TOP);
    }
    let mut session = Session::open(secret_draw::secret_draw(), config, num_players).await?;

    for _ in 0..HAND_SIZE {
        for seat in 0..num_players {
            session.play(&seat.to_string(), "draw", Vec::new()).await?;
        }
    }

    for seat in 0..num_players {
        let player_id = seat.to_string();
        let view = session.view(Some(&player_id)).await?;
        session.drain()?;
        let Some(card) = view
            .g
            .hands
            .get(&player_id)
            .and_then(|hand| hand.iter().max().copied())
        else {
            bail!("seat {} has no cards", player_id);
        };
        session.play(&player_id, "bid", vec![json!(card)]).await?;
        info!(player_id = %player_id, card, "Bid placed");
    }

    let state = session.view(None).await?;
    session.drain()?;
    println!("bids: {:?}", state.g.bids);
    println!("result: {}", state.ctx.gameover.unwrap_or_default());
    Ok(())
}
