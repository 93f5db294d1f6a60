//! A small hidden-information game.
//!
//! Players draw cards from a shuffled deck in turn order, then everybody
//! bids one card from hand at the same time. The highest bid wins. Bids are
//! redacted in other players' logs and the player view hides the deck,
//! other hands and other bids until the game is over.

use crate::flow::ActivePlayersArg;
use crate::game::{EndTrigger, Game, MoveDef, MoveResult, PhaseConfig, TurnConfig};
use crate::state::{Ctx, PlayerId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the game.
pub const NAME: &str = "secret-draw";

/// Cards each player draws before bidding.
pub const HAND_SIZE: usize = 2;

/// Highest card in the deck; the deck holds `1..=DECK_TOP`.
pub const DECK_TOP: u32 = 10;

/// Game payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Remaining cards, top last.
    pub deck: Vec<u32>,
    /// Cards left in the deck, kept visible when the deck itself is hidden.
    pub deck_size: usize,
    /// Hands by seat.
    pub hands: BTreeMap<PlayerId, Vec<u32>>,
    /// Bids by seat.
    pub bids: BTreeMap<PlayerId, u32>,
}

impl Table {
    fn hands_full(&self) -> bool {
        !self.hands.is_empty() && self.hands.values().all(|hand| hand.len() >= HAND_SIZE)
    }

    /// Seat with the highest bid once everybody bid.
    pub fn winner(&self, num_players: usize) -> Option<PlayerId> {
        if self.bids.len() < num_players {
            return None;
        }
        self.bids
            .iter()
            .max_by_key(|(_, card)| **card)
            .map(|(player, _)| player.clone())
    }
}

fn draw(table: &Table, player_id: &str) -> MoveResult<Table> {
    let mut next = table.clone();
    let Some(hand) = next.hands.get_mut(player_id) else {
        return MoveResult::Invalid;
    };
    if hand.len() >= HAND_SIZE {
        return MoveResult::Invalid;
    }
    let Some(card) = next.deck.pop() else {
        return MoveResult::Invalid;
    };
    hand.push(card);
    next.deck_size = next.deck.len();
    MoveResult::NewState(next)
}

fn bid(table: &Table, player_id: &str, args: &[Value]) -> MoveResult<Table> {
    let Some(card) = args
        .first()
        .and_then(Value::as_u64)
        .and_then(|card| u32::try_from(card).ok())
    else {
        return MoveResult::Invalid;
    };
    if table.bids.contains_key(player_id) {
        return MoveResult::Invalid;
    }
    let mut next = table.clone();
    let Some(hand) = next.hands.get_mut(player_id) else {
        return MoveResult::Invalid;
    };
    let Some(index) = hand.iter().position(|held| *held == card) else {
        return MoveResult::Invalid;
    };
    hand.remove(index);
    next.bids.insert(player_id.to_string(), card);
    MoveResult::NewState(next)
}

fn player_view(table: &Table, ctx: &Ctx, player_id: Option<&str>) -> Table {
    let revealed = ctx.is_game_over();
    let mine = |seat: &str| player_id == Some(seat);
    Table {
        deck: Vec::new(),
        deck_size: table.deck.len(),
        hands: table
            .hands
            .iter()
            .map(|(seat, hand)| {
                let hand = if mine(seat.as_str()) { hand.clone() } else { Vec::new() };
                (seat.clone(), hand)
            })
            .collect(),
        bids: table
            .bids
            .iter()
            .filter(|(seat, _)| revealed || mine(seat.as_str()))
            .map(|(seat, card)| (seat.clone(), *card))
            .collect(),
    }
}

/// Builds the secret-draw definition.
pub fn secret_draw() -> Game<Table> {
    Game::new(NAME, |ctx, random, _data| {
        let deck = random.shuffle((1..=DECK_TOP).collect());
        debug!(cards = deck.len(), "Deck shuffled");
        Table {
            deck_size: deck.len(),
            deck,
            hands: ctx.play_order.iter().map(|seat| (seat.clone(), Vec::new())).collect(),
            bids: BTreeMap::new(),
        }
    })
    .with_phase(
        "draw",
        PhaseConfig::<Table>::new()
            .start()
            .with_next("bid")
            .with_move("draw", MoveDef::new(|mc, _args| draw(mc.g, mc.player_id)).undoable(false))
            .with_turn(TurnConfig::new().with_move_limit(1))
            .end_if(|table: &Table, _ctx| table.hands_full().then(EndTrigger::now)),
    )
    .with_phase(
        "bid",
        PhaseConfig::<Table>::new()
            .with_move("bid", MoveDef::new(|mc, args| bid(mc.g, mc.player_id, args)).redact())
            .with_turn(TurnConfig::new().with_active_players(ActivePlayersArg::all_once())),
    )
    .end_if(|table, ctx| {
        table.winner(ctx.num_players).map(|winner| {
            let bid = table.bids.get(&winner).copied();
            json!({ "winner": winner, "bid": bid })
        })
    })
    .with_player_view(player_view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            deck: vec![1, 2],
            deck_size: 2,
            hands: BTreeMap::from([("0".to_string(), vec![9, 4]), ("1".to_string(), vec![7, 3])]),
            bids: BTreeMap::new(),
        }
    }

    #[test]
    fn test_bid_requires_card_in_hand() {
        assert_eq!(bid(&table(), "0", &[json!(7)]), MoveResult::Invalid);
        let MoveResult::NewState(next) = bid(&table(), "0", &[json!(9)]) else {
            panic!("bid refused");
        };
        assert_eq!(next.hands["0"], vec![4]);
        assert_eq!(next.bids["0"], 9);
        assert_eq!(bid(&next, "0", &[json!(4)]), MoveResult::Invalid);
    }

    #[test]
    fn test_draw_stops_at_hand_size() {
        assert_eq!(draw(&table(), "0"), MoveResult::Invalid);
        let mut short = table();
        short.hands.insert("0".into(), vec![]);
        let MoveResult::NewState(next) = draw(&short, "0") else {
            panic!("draw refused");
        };
        assert_eq!(next.hands["0"], vec![2]);
        assert_eq!(next.deck_size, 1);
    }

    #[test]
    fn test_winner_waits_for_every_bid() {
        let mut t = table();
        t.bids.insert("0".into(), 4);
        assert_eq!(t.winner(2), None);
        t.bids.insert("1".into(), 7);
        assert_eq!(t.winner(2), Some("1".to_string()));
    }
}
