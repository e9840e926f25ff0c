// Backend player state machine

use crate::error::{AudioError, Result};
use crate::events::{EventSink, PlayerEvent};
use parking_lot::RwLock;
use std::sync::Arc;

/// Player state as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerState {
    /// Media bound, nothing requested yet
    NothingSpecial,
    /// Media is being opened
    Opening,
    /// Waiting for enough data to continue
    Buffering,
    /// Audio is currently playing
    Playing,
    /// Audio is paused
    Paused,
    /// Playback has stopped
    Stopped,
    /// The end of the media was reached
    Ended,
    /// Player encountered an error
    Error,
}

impl PlayerState {
    /// Numeric code as used by libvlc's `libvlc_state_t`
    pub fn code(self) -> i32 {
        match self {
            PlayerState::NothingSpecial => 0,
            PlayerState::Opening => 1,
            PlayerState::Buffering => 2,
            PlayerState::Playing => 3,
            PlayerState::Paused => 4,
            PlayerState::Stopped => 5,
            PlayerState::Ended => 6,
            PlayerState::Error => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PlayerState::NothingSpecial),
            1 => Some(PlayerState::Opening),
            2 => Some(PlayerState::Buffering),
            3 => Some(PlayerState::Playing),
            4 => Some(PlayerState::Paused),
            5 => Some(PlayerState::Stopped),
            6 => Some(PlayerState::Ended),
            7 => Some(PlayerState::Error),
            _ => None,
        }
    }

    pub fn can_transition_to(self, to: PlayerState) -> bool {
        use PlayerState::*;

        match (self, to) {
            (from, to) if from == to => true,

            (NothingSpecial, Opening | Playing | Stopped | Error) => true,
            (Opening, Buffering | Playing | Paused | Stopped | Error) => true,
            (Buffering, Playing | Paused | Stopped | Error) => true,
            (Playing, Paused | Buffering | Stopped | Ended | Error) => true,
            (Paused, Playing | Buffering | Stopped | Error) => true,
            (Stopped, Opening | Playing | Error) => true,
            (Ended, Opening | Playing | Stopped | Error) => true,
            (Error, Opening | Stopped) => true,

            _ => false,
        }
    }
}

/// Snapshot of a session, read live in one call.
/// The facade never keeps one of these around.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlayerState,
    /// Current position in seconds, `None` when the backend does not know it
    pub position: Option<f64>,
    /// Media length in seconds, `None` when unknown
    pub duration: Option<f64>,
    pub volume: i32,
    pub rate: f32,
    pub is_playing: bool,
    pub seekable: bool,
    pub pausable: bool,
}

/// Thread-safe state holder shared between a backend session and its
/// worker threads. Every applied change is announced on the event sink.
#[derive(Clone)]
pub struct PlayerStateContainer {
    state: Arc<RwLock<PlayerState>>,
    events: Arc<RwLock<EventSink>>,
}

impl PlayerStateContainer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PlayerState::NothingSpecial)),
            events: Arc::new(RwLock::new(EventSink::disconnected())),
        }
    }

    pub fn attach_events(&self, sink: EventSink) {
        *self.events.write() = sink;
    }

    /// Emit an event on the attached sink
    pub fn emit(&self, event: PlayerEvent) {
        self.events.read().emit(event);
    }

    pub fn get_state(&self) -> PlayerState {
        *self.state.read()
    }

    /// Apply a transition if the state machine allows it.
    /// Re-entering the current state is accepted silently.
    pub fn set_state(&self, new_state: PlayerState) -> Result<()> {
        let old_state = {
            let mut state = self.state.write();
            let old_state = *state;
            if !old_state.can_transition_to(new_state) {
                log::warn!("Rejected state transition {:?} -> {:?}", old_state, new_state);
                return Err(AudioError::InvalidState(format!(
                    "Invalid state transition from {:?} to {:?}",
                    old_state, new_state
                )));
            }
            *state = new_state;
            old_state
        };

        if old_state != new_state {
            log::debug!("Player state changed: {:?} -> {:?}", old_state, new_state);
            self.emit(PlayerEvent::StateChanged {
                old_state,
                new_state,
            });
        }
        Ok(())
    }

    /// Move to `Error` from wherever the session is and announce the failure
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        log::error!("Player error: {}", message);
        let old_state = std::mem::replace(&mut *self.state.write(), PlayerState::Error);
        if old_state != PlayerState::Error {
            self.emit(PlayerEvent::StateChanged {
                old_state,
                new_state: PlayerState::Error,
            });
        }
        self.emit(PlayerEvent::EncounteredError { message });
    }
}

impl Default for PlayerStateContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..8 {
            let state = PlayerState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(PlayerState::from_code(8), None);
        assert_eq!(PlayerState::from_code(-1), None);
    }

    #[test]
    fn test_valid_transitions() {
        let container = PlayerStateContainer::new();
        assert_eq!(container.get_state(), PlayerState::NothingSpecial);

        container.set_state(PlayerState::Opening).unwrap();
        container.set_state(PlayerState::Playing).unwrap();
        container.set_state(PlayerState::Paused).unwrap();
        container.set_state(PlayerState::Playing).unwrap();
        container.set_state(PlayerState::Ended).unwrap();
        container.set_state(PlayerState::Playing).unwrap();
        container.set_state(PlayerState::Stopped).unwrap();
        assert_eq!(container.get_state(), PlayerState::Stopped);
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let container = PlayerStateContainer::new();
        let err = container.set_state(PlayerState::Paused).unwrap_err();
        assert!(matches!(err, AudioError::InvalidState(_)));
        assert_eq!(container.get_state(), PlayerState::NothingSpecial);

        container.set_state(PlayerState::Stopped).unwrap();
        assert!(container.set_state(PlayerState::Ended).is_err());
    }

    #[test]
    fn test_same_state_is_accepted() {
        let container = PlayerStateContainer::new();
        container.set_state(PlayerState::NothingSpecial).unwrap();
        assert_eq!(container.get_state(), PlayerState::NothingSpecial);
    }

    #[test]
    fn test_fail_from_any_state() {
        let container = PlayerStateContainer::new();
        container.set_state(PlayerState::Stopped).unwrap();
        container.fail("decoder gave up");
        assert_eq!(container.get_state(), PlayerState::Error);
        container.set_state(PlayerState::Opening).unwrap();
    }
}
