//! Action authentication.
//!
//! Authentication is all-or-nothing per match: once any seat in the roster
//! carries credentials, every action must present the acting seat's
//! credentials.

use crate::master::metadata::{GameMetadata, PlayerMetadata};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Decides whether an action may be processed.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Whether actions for this match must be authenticated at all.
    fn requires_auth(&self, metadata: Option<&GameMetadata>) -> bool;

    /// Checks the credentials presented with an action against the seat.
    async fn authenticate(
        &self,
        credentials: Option<&str>,
        player: Option<&PlayerMetadata>,
    ) -> bool;
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    fn requires_auth(&self, _metadata: Option<&GameMetadata>) -> bool {
        false
    }

    async fn authenticate(
        &self,
        _credentials: Option<&str>,
        _player: Option<&PlayerMetadata>,
    ) -> bool {
        true
    }
}

/// Compares presented credentials with the roster's.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialAuth;

#[async_trait]
impl Authenticator for CredentialAuth {
    fn requires_auth(&self, metadata: Option<&GameMetadata>) -> bool {
        does_game_require_authentication(metadata)
    }

    async fn authenticate(
        &self,
        credentials: Option<&str>,
        player: Option<&PlayerMetadata>,
    ) -> bool {
        is_action_from_authentic_player(credentials, player)
    }
}

type Predicate = Arc<dyn Fn(Option<&str>, Option<&PlayerMetadata>) -> bool + Send + Sync>;

/// Runs a caller-supplied predicate for every action.
#[derive(Clone)]
pub struct CustomAuth {
    predicate: Predicate,
}

impl CustomAuth {
    /// Wraps the predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(Option<&str>, Option<&PlayerMetadata>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }
}

impl std::fmt::Debug for CustomAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomAuth").finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for CustomAuth {
    fn requires_auth(&self, _metadata: Option<&GameMetadata>) -> bool {
        true
    }

    async fn authenticate(
        &self,
        credentials: Option<&str>,
        player: Option<&PlayerMetadata>,
    ) -> bool {
        (self.predicate)(credentials, player)
    }
}

/// True when any seat in the roster carries non-empty credentials.
#[instrument(skip_all)]
pub fn does_game_require_authentication(metadata: Option<&GameMetadata>) -> bool {
    let required = metadata.is_some_and(|metadata| {
        metadata
            .players()
            .values()
            .any(|player| {
                player
                    .credentials()
                    .as_deref()
                    .is_some_and(|credentials| !credentials.is_empty())
            })
    });
    debug!(required, "Checked whether game requires authentication");
    required
}

/// True when the presented credentials match the seat's exactly.
///
/// Missing or empty credentials, an unknown seat, or a seat without
/// credentials all fail.
pub fn is_action_from_authentic_player(
    credentials: Option<&str>,
    player: Option<&PlayerMetadata>,
) -> bool {
    match (credentials, player.and_then(|player| player.credentials().as_deref())) {
        (Some(presented), Some(expected)) => !presented.is_empty() && presented == expected,
        _ => false,
    }
}
