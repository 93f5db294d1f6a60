//! Command-line interface for strictly_turns.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Strictly Turns - authoritative turn-based game engine
#[derive(Parser, Debug)]
#[command(name = "strictly_turns")]
#[command(about = "Authoritative turn-based game master", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a scripted match through the master and print every replicated message
    Demo {
        /// Game to play
        #[arg(short, long, value_enum, default_value_t = DemoGame::Tictactoe)]
        game: DemoGame,

        /// Path to a master configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured PRNG seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Games the demo can play.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoGame {
    /// Two-player tic-tac-toe
    Tictactoe,
    /// Draw-and-bid card game with hidden hands
    SecretDraw,
}
