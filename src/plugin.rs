//! Plugin hooks that carry their own slice of state.
//!
//! Every plugin owns one entry of `state.plugins`, keyed by its name. The
//! reducer calls the hooks in registration order: `setup` when a game is
//! created, `action` for every top-level action, `flush` after every change
//! to `G` or `ctx`, and `player_view` whenever a state is filtered for a
//! recipient.

use crate::action::LogAction;
use crate::state::{Ctx, PluginState};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Extension hook that lives next to `G` and `ctx`.
pub trait Plugin<G>: Send + Sync {
    /// Key under which the plugin's data is stored.
    fn name(&self) -> &str;

    /// Initial data for a fresh game.
    fn setup(&self, _g: &G, _ctx: &Ctx) -> Value {
        Value::Null
    }

    /// Updates the data in response to a top-level action.
    fn action(&self, data: Value, _action: &LogAction) -> Value {
        data
    }

    /// Updates the data after the flow engine settled.
    fn flush(&self, data: Value, _g: &G, _ctx: &Ctx) -> Value {
        data
    }

    /// Data as seen by `player_id` (`None` for spectators).
    fn player_view(&self, data: &Value, _g: &G, _ctx: &Ctx, _player_id: Option<&str>) -> Value {
        data.clone()
    }
}

/// Ordered list of registered plugins.
pub type Plugins<G> = Vec<Arc<dyn Plugin<G>>>;

/// Runs every plugin's `setup`.
#[instrument(skip_all, fields(plugins = plugins.len()))]
pub fn setup_plugins<G>(
    plugins: &[Arc<dyn Plugin<G>>],
    g: &G,
    ctx: &Ctx,
) -> BTreeMap<String, PluginState> {
    plugins
        .iter()
        .map(|plugin| {
            debug!(plugin = plugin.name(), "Setting up plugin");
            (
                plugin.name().to_string(),
                PluginState {
                    data: plugin.setup(g, ctx),
                },
            )
        })
        .collect()
}

/// Runs every plugin's `action` hook.
pub fn apply_action<G>(
    plugins: &[Arc<dyn Plugin<G>>],
    mut states: BTreeMap<String, PluginState>,
    action: &LogAction,
) -> BTreeMap<String, PluginState> {
    for plugin in plugins {
        let entry = states.entry(plugin.name().to_string()).or_default();
        entry.data = plugin.action(std::mem::take(&mut entry.data), action);
    }
    states
}

/// Runs every plugin's `flush` hook.
pub fn flush_plugins<G>(
    plugins: &[Arc<dyn Plugin<G>>],
    mut states: BTreeMap<String, PluginState>,
    g: &G,
    ctx: &Ctx,
) -> BTreeMap<String, PluginState> {
    for plugin in plugins {
        let entry = states.entry(plugin.name().to_string()).or_default();
        entry.data = plugin.flush(std::mem::take(&mut entry.data), g, ctx);
    }
    states
}

/// Plugin data as seen by one recipient.
///
/// Entries without a registered plugin pass through unchanged.
pub fn plugins_player_view<G>(
    plugins: &[Arc<dyn Plugin<G>>],
    states: &BTreeMap<String, PluginState>,
    g: &G,
    ctx: &Ctx,
    player_id: Option<&str>,
) -> BTreeMap<String, PluginState> {
    let mut view = states.clone();
    for plugin in plugins {
        if let Some(entry) = states.get(plugin.name()) {
            view.insert(
                plugin.name().to_string(),
                PluginState {
                    data: plugin.player_view(&entry.data, g, ctx, player_id),
                },
            );
        }
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{MovePayload, PlayerPayload};
    use serde_json::json;

    struct ActionCounter;

    impl Plugin<()> for ActionCounter {
        fn name(&self) -> &str {
            "counter"
        }

        fn setup(&self, _g: &(), _ctx: &Ctx) -> Value {
            json!(0)
        }

        fn action(&self, data: Value, _action: &LogAction) -> Value {
            json!(data.as_u64().unwrap_or(0) + 1)
        }

        fn player_view(
            &self,
            _data: &Value,
            _g: &(),
            _ctx: &Ctx,
            player_id: Option<&str>,
        ) -> Value {
            json!(player_id.unwrap_or("spectator"))
        }
    }

    fn sample_ctx() -> Ctx {
        serde_json::from_value(json!({
            "numPlayers": 2,
            "playOrder": ["0", "1"],
            "playOrderPos": 0,
            "currentPlayer": "0",
            "turn": 1,
            "phase": null,
            "activePlayers": null
        }))
        .unwrap()
    }

    #[test]
    fn test_action_hook_runs_per_action() {
        let plugins: Plugins<()> = vec![Arc::new(ActionCounter)];
        let ctx = sample_ctx();
        let mut states = setup_plugins(&plugins, &(), &ctx);
        assert_eq!(states["counter"].data, json!(0));

        states = apply_action(
            &plugins,
            states,
            &LogAction::MakeMove(MovePayload::new("m", vec![], Some("0".into()))),
        );
        states = apply_action(&plugins, states, &LogAction::Undo(PlayerPayload::default()));
        assert_eq!(states["counter"].data, json!(2));
    }

    #[test]
    fn test_player_view_per_recipient() {
        let plugins: Plugins<()> = vec![Arc::new(ActionCounter)];
        let ctx = sample_ctx();
        let states = setup_plugins(&plugins, &(), &ctx);
        let view = plugins_player_view(&plugins, &states, &(), &ctx, Some("1"));
        assert_eq!(view["counter"].data, json!("1"));
        let spectator = plugins_player_view(&plugins, &states, &(), &ctx, None);
        assert_eq!(spectator["counter"].data, json!("spectator"));
    }
}
