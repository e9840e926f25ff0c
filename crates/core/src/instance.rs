// Root context owning a backend and every handle it issues

use crate::backend::Backend;
use crate::config::PlayerConfig;
use crate::error::Result;
use crate::player::Player;
use crate::source::Source;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Owns one backend runtime. Players borrow the instance, so none can
/// outlive it, and each player hands its media and session back to the
/// instance's backend when it is closed or dropped.
pub struct Instance<B: Backend> {
    backend: B,
    config: PlayerConfig,
    live_players: AtomicUsize,
}

impl<B: Backend> Instance<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, PlayerConfig::default())
    }

    pub fn with_config(backend: B, config: PlayerConfig) -> Self {
        log::info!("Creating {} instance", backend.name());
        Self {
            backend,
            config,
            live_players: AtomicUsize::new(0),
        }
    }

    /// Resolve `source` and bind it to a new player
    pub fn open(&self, source: impl Into<Source>) -> Result<Player<'_, B>> {
        Player::new(self, source)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Number of players created from this instance and not yet released
    pub fn live_players(&self) -> usize {
        self.live_players.load(Ordering::SeqCst)
    }

    pub(crate) fn player_opened(&self) {
        self.live_players.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn player_released(&self) {
        self.live_players.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<B: Backend> Drop for Instance<B> {
    fn drop(&mut self) {
        log::info!("Releasing {} instance", self.backend.name());
    }
}
