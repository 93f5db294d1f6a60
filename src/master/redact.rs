//! Per-recipient views of state and log.

use crate::action::LogAction;
use crate::game::Game;
use crate::plugin::plugins_player_view;
use crate::state::{LogEntry, State};

/// Log as seen by `player_id`.
///
/// The player who made a redacted move gets the entry unchanged. Everyone
/// else, spectators (`None`) included, gets it with `args` nulled and the
/// redaction marker removed.
pub fn redact_log(log: &[LogEntry], player_id: Option<&str>) -> Vec<LogEntry> {
    log.iter()
        .map(|entry| {
            if !entry.redact {
                return entry.clone();
            }
            let is_owner = matches!(
                (entry.action.player_id(), player_id),
                (Some(owner), Some(viewer)) if same_seat(owner, viewer)
            );
            if is_owner {
                return entry.clone();
            }
            let mut redacted = entry.clone();
            redacted.redact = false;
            if let LogAction::MakeMove(payload) = &mut redacted.action {
                payload.args = None;
            }
            redacted
        })
        .collect()
}

/// Seat IDs compare numerically when both parse as numbers.
fn same_seat(a: &str, b: &str) -> bool {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// State as sent to `player_id`.
///
/// `G` and plugin data go through their player views, the PRNG state is
/// dropped, the log is left out (it travels separately) and the undo/redo
/// stacks are emptied.
pub fn filtered_state<G: Clone>(
    game: &Game<G>,
    state: &State<G>,
    player_id: Option<&str>,
) -> State<G> {
    let mut ctx = state.ctx.clone();
    ctx.random = None;
    State {
        g: game.player_view(&state.g, &state.ctx, player_id),
        plugins: plugins_player_view(
            game.plugins(),
            &state.plugins,
            &state.g,
            &state.ctx,
            player_id,
        ),
        ctx,
        log: Vec::new(),
        deltalog: Vec::new(),
        undo: Vec::new(),
        redo: Vec::new(),
        state_id: state.state_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{EventPayload, FlowEvent, MovePayload};
    use serde_json::json;

    fn draw_entry(player: &str) -> LogEntry {
        LogEntry::new(
            LogAction::MakeMove(MovePayload::new("draw", vec![json!(7)], Some(player.to_string()))),
            4,
            2,
            None,
        )
        .redacted(true)
    }

    fn args_of(entry: &LogEntry) -> Option<Vec<serde_json::Value>> {
        match &entry.action {
            LogAction::MakeMove(payload) => payload.args.clone(),
            _ => None,
        }
    }

    #[test]
    fn test_owner_sees_entry_unchanged() {
        let entry = draw_entry("0");
        let owner = redact_log(std::slice::from_ref(&entry), Some("0"));
        assert_eq!(owner, vec![entry]);
        assert_eq!(args_of(&owner[0]), Some(vec![json!(7)]));
    }

    #[test]
    fn test_others_and_spectators_get_null_args() {
        let entries = [draw_entry("0")];
        let opponent = redact_log(&entries, Some("1"));
        assert_eq!(args_of(&opponent[0]), None);
        let spectator = redact_log(&entries, None);
        assert_eq!(args_of(&spectator[0]), None);
        let value = serde_json::to_value(&opponent[0]).unwrap();
        assert!(value.get("redact").is_none());
        assert!(value["action"]["payload"]["args"].is_null());
    }

    #[test]
    fn test_seats_compare_numerically() {
        let log = redact_log(&[draw_entry("01")], Some("1"));
        assert_eq!(args_of(&log[0]), Some(vec![json!(7)]));
    }

    #[test]
    fn test_unmarked_entries_pass_through() {
        let entry = LogEntry::new(
            LogAction::GameEvent(EventPayload::new(FlowEvent::EndTurn(None), Some("0".into()))),
            1,
            1,
            None,
        );
        assert_eq!(redact_log(std::slice::from_ref(&entry), Some("1")), vec![entry]);
    }
}
