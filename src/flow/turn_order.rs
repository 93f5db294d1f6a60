//! Turn order strategies.
//!
//! A strategy picks the first player of a phase and the next player after
//! each turn, both as indices into `ctx.play_order`. Returning `None` from
//! `next` ends the phase.

use crate::state::{Ctx, PlayerId};
use std::fmt;
use std::sync::Arc;

type FirstFn<G> = Arc<dyn Fn(&G, &Ctx) -> usize + Send + Sync>;
type NextFn<G> = Arc<dyn Fn(&G, &Ctx) -> Option<usize> + Send + Sync>;
type PlayOrderFn<G> = Arc<dyn Fn(&G, &Ctx) -> Vec<PlayerId> + Send + Sync>;

/// Picks who plays first and who plays next.
pub struct TurnOrder<G> {
    first: FirstFn<G>,
    next: NextFn<G>,
    play_order: Option<PlayOrderFn<G>>,
}

impl<G> Clone for TurnOrder<G> {
    fn clone(&self) -> Self {
        Self {
            first: Arc::clone(&self.first),
            next: Arc::clone(&self.next),
            play_order: self.play_order.clone(),
        }
    }
}

impl<G> fmt::Debug for TurnOrder<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnOrder")
            .field("custom_play_order", &self.play_order.is_some())
            .finish_non_exhaustive()
    }
}

fn wrap(pos: usize, len: usize) -> usize {
    pos % len.max(1)
}

impl<G> Default for TurnOrder<G> {
    fn default() -> Self {
        Self::round_robin()
    }
}

impl<G> TurnOrder<G> {
    /// Custom strategy.
    pub fn new<F, N>(first: F, next: N) -> Self
    where
        F: Fn(&G, &Ctx) -> usize + Send + Sync + 'static,
        N: Fn(&G, &Ctx) -> Option<usize> + Send + Sync + 'static,
    {
        Self {
            first: Arc::new(first),
            next: Arc::new(next),
            play_order: None,
        }
    }

    /// Replaces `ctx.play_order` whenever a phase begins.
    pub fn with_play_order<F>(mut self, play_order: F) -> Self
    where
        F: Fn(&G, &Ctx) -> Vec<PlayerId> + Send + Sync + 'static,
    {
        self.play_order = Some(Arc::new(play_order));
        self
    }

    /// Round robin that carries on from the previous phase's player.
    pub fn round_robin() -> Self {
        Self::new(
            |_g, ctx| {
                if ctx.turn == 0 {
                    ctx.play_order_pos
                } else {
                    wrap(ctx.play_order_pos + 1, ctx.play_order.len())
                }
            },
            |_g, ctx| Some(wrap(ctx.play_order_pos + 1, ctx.play_order.len())),
        )
    }

    /// Round robin that restarts from the first seat every phase.
    pub fn reset() -> Self {
        Self::new(
            |_g, _ctx| 0,
            |_g, ctx| Some(wrap(ctx.play_order_pos + 1, ctx.play_order.len())),
        )
    }

    /// Round robin where the player who ended the phase starts the next one.
    pub fn continue_order() -> Self {
        Self::new(
            |_g, ctx| ctx.play_order_pos,
            |_g, ctx| Some(wrap(ctx.play_order_pos + 1, ctx.play_order.len())),
        )
    }

    /// Every player gets a single turn, then the phase ends.
    pub fn once() -> Self {
        Self::new(
            |_g, _ctx| 0,
            |_g, ctx| {
                let next = ctx.play_order_pos + 1;
                (next < ctx.play_order.len()).then_some(next)
            },
        )
    }

    /// Round robin over a fixed seating order.
    pub fn custom(order: Vec<PlayerId>) -> Self {
        Self::reset().with_play_order(move |_g, _ctx| order.clone())
    }

    /// Round robin over a seating order read from `G`.
    pub fn custom_from<F>(order: F) -> Self
    where
        F: Fn(&G) -> Vec<PlayerId> + Send + Sync + 'static,
    {
        Self::reset().with_play_order(move |g, _ctx| order(g))
    }

    /// Index of the first player.
    pub fn first(&self, g: &G, ctx: &Ctx) -> usize {
        (self.first)(g, ctx)
    }

    /// Index of the next player, `None` to end the phase.
    pub fn next(&self, g: &G, ctx: &Ctx) -> Option<usize> {
        (self.next)(g, ctx)
    }

    /// Seating order override, if any.
    pub fn play_order(&self, g: &G, ctx: &Ctx) -> Option<Vec<PlayerId>> {
        self.play_order.as_ref().map(|order| order(g, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(turn: u32, pos: usize) -> Ctx {
        serde_json::from_value(json!({
            "numPlayers": 3, "playOrder": ["0", "1", "2"], "playOrderPos": pos,
            "currentPlayer": pos.to_string(), "turn": turn, "activePlayers": null
        }))
        .unwrap()
    }

    #[test]
    fn test_round_robin_wraps() {
        let order = TurnOrder::<()>::round_robin();
        assert_eq!(order.first(&(), &ctx(0, 0)), 0);
        assert_eq!(order.first(&(), &ctx(4, 1)), 2);
        assert_eq!(order.next(&(), &ctx(4, 2)), Some(0));
    }

    #[test]
    fn test_once_ends_after_last_seat() {
        let order = TurnOrder::<()>::once();
        assert_eq!(order.next(&(), &ctx(1, 1)), Some(2));
        assert_eq!(order.next(&(), &ctx(2, 2)), None);
    }

    #[test]
    fn test_custom_overrides_play_order() {
        let order = TurnOrder::<()>::custom(vec!["2".into(), "0".into()]);
        assert_eq!(order.play_order(&(), &ctx(0, 0)), Some(vec!["2".to_string(), "0".to_string()]));
        assert_eq!(order.first(&(), &ctx(0, 0)), 0);
        assert_eq!(TurnOrder::<()>::continue_order().first(&(), &ctx(3, 1)), 1);
    }
}
