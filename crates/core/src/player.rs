// Player facade over a backend session
//
// The facade keeps no playback state of its own. Every query is a live
// round-trip to the session; the only logic here is seconds <-> milliseconds
// conversion, capability checks before pause/seek, and turning backend
// sentinel codes into errors.

use crate::backend::{Backend, Session, STATUS_ERROR};
use crate::error::{AudioError, Result};
use crate::events::{EventKind, EventManager, PlayerCallback, SubscriptionToken};
use crate::instance::Instance;
use crate::source::Source;
use crate::state::{PlaybackStatus, PlayerState};
use parking_lot::Mutex;
use std::sync::Arc;

/// One source bound to one backend session for the player's lifetime
pub struct Player<'a, B: Backend> {
    instance: &'a Instance<B>,
    source: Source,
    media: B::Media,
    // Serializes every call into the backend
    session: Mutex<B::Session>,
    events: EventManager,
}

impl<'a, B: Backend> Player<'a, B> {
    /// Resolve `source` and bind it to a fresh session.
    ///
    /// Either the whole sequence succeeds or nothing is left allocated.
    pub fn new(instance: &'a Instance<B>, source: impl Into<Source>) -> Result<Self> {
        let source = source.into();
        let backend = instance.backend();
        log::info!("Opening {} on {} backend", source, backend.name());

        let mut media = backend.create_media(&source).map_err(|err| {
            log::warn!("Could not resolve {}: {}", source, err);
            err
        })?;

        let mut session = match backend.create_session() {
            Ok(session) => session,
            Err(err) => {
                backend.release_media(&mut media);
                return Err(err);
            }
        };

        let events = match EventManager::new(instance.config()) {
            Ok(events) => events,
            Err(err) => {
                backend.release_session(&mut session);
                backend.release_media(&mut media);
                return Err(err);
            }
        };

        session.attach_events(events.sink());
        session.set_media(&media);
        instance.player_opened();

        Ok(Self {
            instance,
            source,
            media,
            session: Mutex::new(session),
            events,
        })
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Start or resume playback
    pub fn play(&self) -> Result<()> {
        if self.session.lock().play() == STATUS_ERROR {
            log::warn!("Backend refused to play {}", self.source);
            return Err(AudioError::PlaybackStartError(self.source.to_string()));
        }
        Ok(())
    }

    /// Pause playback. Does nothing when the media cannot be paused.
    pub fn pause(&self) {
        let mut session = self.session.lock();
        if !session.can_pause() {
            log::debug!("Pause ignored: {} is not pausable", self.source);
            return;
        }
        session.set_pause(true);
    }

    /// Stop playback; the backend resets its position
    pub fn stop(&self) {
        self.session.lock().stop();
    }

    /// Jump to `position` seconds. Does nothing when the media is not
    /// seekable. Negative and non-finite positions mean the start.
    pub fn seek(&self, position: f64) {
        let mut session = self.session.lock();
        if !session.is_seekable() {
            log::debug!("Seek to {:.3}s ignored: {} is not seekable", position, self.source);
            return;
        }
        session.set_time(seconds_to_millis(position));
    }

    pub fn rewind(&self) {
        self.seek(0.0);
    }

    /// Change playback speed; 1.0 is normal speed
    pub fn set_rate(&self, multiplier: f32) {
        self.session.lock().set_rate(multiplier);
    }

    pub fn rate(&self) -> f32 {
        self.session.lock().rate()
    }

    /// Current volume on the backend's integer scale
    pub fn volume(&self) -> i32 {
        self.session.lock().volume()
    }

    /// Fails with `VolumeRangeError` when the backend rejects `volume`;
    /// the previous volume is kept in that case.
    pub fn set_volume(&self, volume: i32) -> Result<()> {
        if self.session.lock().set_volume(volume) == STATUS_ERROR {
            log::warn!("Backend rejected volume {}", volume);
            return Err(AudioError::VolumeRangeError(volume));
        }
        Ok(())
    }

    /// Playback position in seconds, `None` while the backend cannot tell
    pub fn position(&self) -> Option<f64> {
        millis_to_seconds(self.session.lock().time())
    }

    /// Media length in seconds, `None` when unknown (e.g. live streams)
    pub fn duration(&self) -> Option<f64> {
        millis_to_seconds(self.session.lock().length())
    }

    pub fn is_playing(&self) -> bool {
        self.session.lock().is_playing()
    }

    pub fn state(&self) -> PlayerState {
        self.session.lock().state()
    }

    pub fn can_pause(&self) -> bool {
        self.session.lock().can_pause()
    }

    pub fn is_seekable(&self) -> bool {
        self.session.lock().is_seekable()
    }

    /// Read everything at once, under a single lock
    pub fn status(&self) -> PlaybackStatus {
        let session = self.session.lock();
        PlaybackStatus {
            state: session.state(),
            position: millis_to_seconds(session.time()),
            duration: millis_to_seconds(session.length()),
            volume: session.volume(),
            rate: session.rate(),
            is_playing: session.is_playing(),
            seekable: session.is_seekable(),
            pausable: session.can_pause(),
        }
    }

    /// Register the handler for one kind of event.
    ///
    /// Handlers run on the player's dispatch thread. A handler may call
    /// `unsubscribe`, but must not drop the last reference to the player.
    pub fn subscribe<C>(&self, kind: EventKind, callback: C) -> Result<SubscriptionToken>
    where
        C: PlayerCallback + 'static,
    {
        self.events.subscribe(kind, Arc::new(callback))
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.events.unsubscribe(token)
    }

    /// Stop playback and release the backend handles now
    pub fn close(self) {
        log::info!("Closing player for {}", self.source);
    }
}

impl<B: Backend> Drop for Player<'_, B> {
    fn drop(&mut self) {
        let backend = self.instance.backend();
        backend.release_session(self.session.get_mut());
        backend.release_media(&mut self.media);
        self.instance.player_released();
        log::debug!("Released handles for {}", self.source);
    }
}

fn seconds_to_millis(seconds: f64) -> i64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0) as i64
}

fn millis_to_seconds(millis: i64) -> Option<f64> {
    if millis < 0 {
        None
    } else {
        Some(millis as f64 / 1000.0)
    }
}
