//! Active-player configurations and their transitions.

use crate::state::{ActivePlayers, ActivePlayersSnapshot, Ctx, PlayerId, StageName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Puts a player into a stage.
///
/// `stage: None` makes the player active without a stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageArg {
    /// Stage to enter.
    pub stage: Option<StageName>,
    /// Moves the player may make before leaving the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_limit: Option<u32>,
}

impl StageArg {
    /// Active without a stage.
    pub fn none() -> Self {
        Self::default()
    }

    /// Active in the named stage.
    pub fn named(stage: impl Into<StageName>) -> Self {
        Self {
            stage: Some(stage.into()),
            move_limit: None,
        }
    }

    /// Limits the number of moves in the stage.
    pub fn with_move_limit(mut self, limit: u32) -> Self {
        self.move_limit = Some(limit);
        self
    }
}

impl From<&str> for StageArg {
    fn from(stage: &str) -> Self {
        Self::named(stage)
    }
}

impl From<String> for StageArg {
    fn from(stage: String) -> Self {
        Self::named(stage)
    }
}

/// Requested active-player configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePlayersArg {
    /// Stage for the current player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player: Option<StageArg>,
    /// Stage for everyone except the current player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub others: Option<StageArg>,
    /// Stage for every player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<StageArg>,
    /// Explicit per-player stages, applied last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<BTreeMap<PlayerId, StageArg>>,
    /// Move limit for players whose stage argument carries none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_limit: Option<u32>,
    /// Restore the previous configuration once this one empties.
    #[serde(default)]
    pub revert: bool,
    /// Configuration applied once this one empties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<ActivePlayersArg>>,
}

impl ActivePlayersArg {
    /// Exactly the listed players, none in a stage.
    pub fn players<I, P>(players: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PlayerId>,
    {
        Self {
            value: Some(players.into_iter().map(|p| (p.into(), StageArg::none())).collect()),
            ..Self::default()
        }
    }

    /// Every player may act.
    pub fn all_players() -> Self {
        Self {
            all: Some(StageArg::none()),
            ..Self::default()
        }
    }

    /// Every player may act once, then the previous configuration returns.
    pub fn all_once() -> Self {
        Self {
            all: Some(StageArg::none()),
            move_limit: Some(1),
            revert: true,
            ..Self::default()
        }
    }

    /// Everyone but the current player may act.
    pub fn others() -> Self {
        Self {
            others: Some(StageArg::none()),
            ..Self::default()
        }
    }

    /// Everyone but the current player may act once, then the previous configuration returns.
    pub fn others_once() -> Self {
        Self {
            others: Some(StageArg::none()),
            move_limit: Some(1),
            revert: true,
            ..Self::default()
        }
    }

    /// Sets the current player's stage.
    pub fn with_current_player(mut self, stage: impl Into<StageArg>) -> Self {
        self.current_player = Some(stage.into());
        self
    }

    /// Sets the stage for everyone but the current player.
    pub fn with_others(mut self, stage: impl Into<StageArg>) -> Self {
        self.others = Some(stage.into());
        self
    }

    /// Sets the stage for all players.
    pub fn with_all(mut self, stage: impl Into<StageArg>) -> Self {
        self.all = Some(stage.into());
        self
    }

    /// Sets one player's stage explicitly.
    pub fn with_player(
        mut self,
        player_id: impl Into<PlayerId>,
        stage: impl Into<StageArg>,
    ) -> Self {
        self.value.get_or_insert_with(BTreeMap::new).insert(player_id.into(), stage.into());
        self
    }

    /// Sets the default move limit.
    pub fn with_move_limit(mut self, limit: u32) -> Self {
        self.move_limit = Some(limit);
        self
    }

    /// Restores the previous configuration once this one empties.
    pub fn with_revert(mut self) -> Self {
        self.revert = true;
        self
    }

    /// Chains a configuration applied once this one empties.
    pub fn then(mut self, next: ActivePlayersArg) -> Self {
        self.next = Some(Box::new(next));
        self
    }
}

struct Assignment<'a> {
    active: &'a mut ActivePlayers,
    limits: &'a mut BTreeMap<PlayerId, u32>,
    default_limit: Option<u32>,
}

impl Assignment<'_> {
    fn apply(&mut self, player_id: &str, arg: &StageArg) {
        self.active.insert(player_id.to_string(), arg.stage.clone());
        if let Some(limit) = arg.move_limit.or(self.default_limit) {
            self.limits.insert(player_id.to_string(), limit);
        }
    }
}

/// Applies an active-players configuration to `ctx`.
#[instrument(skip(ctx), fields(turn = ctx.turn))]
pub fn set_active_players(mut ctx: Ctx, arg: &ActivePlayersArg) -> Ctx {
    let mut active = ActivePlayers::new();
    let mut limits = BTreeMap::new();

    if arg.revert {
        ctx.prev_active_players.push(ActivePlayersSnapshot {
            active_players: ctx.active_players.clone(),
            active_players_move_limit: ctx.active_players_move_limit.clone(),
            active_players_num_moves: ctx.active_players_num_moves.clone(),
        });
    } else {
        ctx.prev_active_players.clear();
    }
    ctx.next_active_players = arg.next.as_deref().cloned();

    {
        let mut assign = Assignment {
            active: &mut active,
            limits: &mut limits,
            default_limit: arg.move_limit,
        };
        if let Some(stage) = &arg.current_player {
            let current = ctx.current_player.clone();
            assign.apply(&current, stage);
        }
        if let Some(stage) = &arg.others {
            for player in ctx.play_order.iter().filter(|p| **p != ctx.current_player) {
                assign.apply(player, stage);
            }
        }
        if let Some(stage) = &arg.all {
            for player in &ctx.play_order {
                assign.apply(player, stage);
            }
        }
        if let Some(value) = &arg.value {
            for (player, stage) in value {
                assign.apply(player, stage);
            }
        }
    }

    ctx.active_players_num_moves = active.keys().map(|player| (player.clone(), 0)).collect();
    ctx.active_players_move_limit = (!limits.is_empty()).then_some(limits);
    ctx.active_players = (!active.is_empty()).then_some(active);
    debug!(active = ?ctx.active_players, "Active players set");
    ctx
}

/// Advances to the chained, reverted or empty configuration once nobody is active.
#[instrument(skip(ctx), fields(turn = ctx.turn))]
pub fn update_active_players_once_empty(mut ctx: Ctx) -> Ctx {
    let emptied = ctx.active_players.as_ref().is_some_and(|active| active.is_empty());
    if !emptied {
        return ctx;
    }

    if let Some(next) = ctx.next_active_players.take() {
        ctx = set_active_players(ctx, &next);
    } else if let Some(previous) = ctx.prev_active_players.pop() {
        ctx.active_players = previous.active_players;
        ctx.active_players_move_limit = previous.active_players_move_limit;
        ctx.active_players_num_moves = previous.active_players_num_moves;
    } else {
        ctx.active_players = None;
        ctx.active_players_move_limit = None;
    }
    ctx
}
