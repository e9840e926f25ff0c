// Deterministic in-memory backend
// Plays registered tracks against a virtual clock. Used by the facade tests
// and usable anywhere no audio device is available.

use crate::backend::{Backend, Session, STATUS_ERROR, STATUS_OK, TIME_UNKNOWN};
use crate::error::{AudioError, Result};
use crate::events::{EventSink, PlayerEvent};
use crate::source::Source;
use crate::state::{PlayerState, PlayerStateContainer};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Default upper bound of the volume scale
const DEFAULT_MAX_VOLUME: i32 = 100;

/// Describes how a registered source behaves
#[derive(Debug, Clone, PartialEq)]
pub struct SimTrack {
    pub duration_ms: Option<u64>,
    pub seekable: bool,
    pub pausable: bool,
    /// When false, `play` reports failure
    pub playable: bool,
    /// When false, `time` reports `TIME_UNKNOWN`
    pub reports_time: bool,
}

impl SimTrack {
    /// A regular seekable, pausable track
    pub fn new(duration: Duration) -> Self {
        Self {
            duration_ms: Some(duration.as_millis() as u64),
            seekable: true,
            pausable: true,
            playable: true,
            reports_time: true,
        }
    }

    /// An endless stream that can neither seek nor pause
    pub fn live_stream() -> Self {
        Self {
            duration_ms: None,
            seekable: false,
            pausable: false,
            playable: true,
            reports_time: false,
        }
    }

    pub fn seekable(mut self, seekable: bool) -> Self {
        self.seekable = seekable;
        self
    }

    pub fn pausable(mut self, pausable: bool) -> Self {
        self.pausable = pausable;
        self
    }

    pub fn playable(mut self, playable: bool) -> Self {
        self.playable = playable;
        self
    }
}

/// Resolved simulated media
#[derive(Debug, Clone)]
pub struct SimMedia {
    source: Source,
    track: SimTrack,
}

impl SimMedia {
    pub fn source(&self) -> &Source {
        &self.source
    }
}

/// Backend whose sources are a fixed table of tracks
pub struct SimBackend {
    tracks: HashMap<Source, SimTrack>,
    max_volume: i32,
    sessions: Mutex<Vec<Weak<Mutex<SimCore>>>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            max_volume: DEFAULT_MAX_VOLUME,
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Make `source` resolvable
    pub fn with_track(mut self, source: impl Into<Source>, track: SimTrack) -> Self {
        self.tracks.insert(source.into(), track);
        self
    }

    pub fn with_max_volume(mut self, max_volume: i32) -> Self {
        self.max_volume = max_volume;
        self
    }

    /// Move the virtual clock forward. Playing sessions progress by
    /// `by * rate` and end when they pass the track length.
    pub fn advance(&self, by: Duration) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|session| session.strong_count() > 0);

        for session in sessions.iter().filter_map(Weak::upgrade) {
            session.lock().advance(by);
        }
    }

    /// Sessions created by this backend that are still alive
    pub fn live_sessions(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|session| session.strong_count() > 0)
            .count()
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SimBackend {
    type Media = SimMedia;
    type Session = SimSession;

    fn name(&self) -> &str {
        "simulated"
    }

    fn create_media(&self, source: &Source) -> Result<SimMedia> {
        let track = self.tracks.get(source).cloned().ok_or_else(|| {
            AudioError::SourceResolutionError(format!("{} is not a known track", source))
        })?;

        Ok(SimMedia {
            source: source.clone(),
            track,
        })
    }

    fn create_session(&self) -> Result<SimSession> {
        let core = Arc::new(Mutex::new(SimCore {
            track: None,
            state: PlayerStateContainer::new(),
            time_ms: 0.0,
            volume: self.max_volume,
            rate: 1.0,
            max_volume: self.max_volume,
        }));
        self.sessions.lock().push(Arc::downgrade(&core));
        Ok(SimSession { core })
    }
}

struct SimCore {
    track: Option<SimTrack>,
    state: PlayerStateContainer,
    time_ms: f64,
    volume: i32,
    rate: f32,
    max_volume: i32,
}

impl SimCore {
    fn advance(&mut self, by: Duration) {
        if self.state.get_state() != PlayerState::Playing {
            return;
        }

        self.time_ms += by.as_secs_f64() * 1000.0 * self.rate as f64;

        let length = self.track.as_ref().and_then(|t| t.duration_ms);
        if let Some(length) = length {
            if self.time_ms >= length as f64 {
                self.time_ms = length as f64;
                self.state.emit(PlayerEvent::TimeChanged { time_ms: length as i64 });
                let _ = self.state.set_state(PlayerState::Ended);
                self.state.emit(PlayerEvent::EndReached);
                return;
            }
        }

        self.state.emit(PlayerEvent::TimeChanged {
            time_ms: self.time_ms as i64,
        });
    }
}

/// Simulated player handle
pub struct SimSession {
    core: Arc<Mutex<SimCore>>,
}

impl Session for SimSession {
    type Media = SimMedia;

    fn set_media(&mut self, media: &SimMedia) {
        let mut core = self.core.lock();
        core.track = Some(media.track.clone());
        core.time_ms = 0.0;
        if let Some(length) = media.track.duration_ms {
            core.state.emit(PlayerEvent::LengthChanged {
                length_ms: length as i64,
            });
        }
    }

    fn attach_events(&mut self, sink: EventSink) {
        self.core.lock().state.attach_events(sink);
    }

    fn play(&mut self) -> i32 {
        let mut core = self.core.lock();
        let Some(track) = core.track.clone() else {
            return STATUS_ERROR;
        };

        let state = core.state.get_state();
        if state == PlayerState::Playing {
            return STATUS_OK;
        }

        if !track.playable {
            core.state.fail("simulated track refuses to play");
            return STATUS_ERROR;
        }

        if state != PlayerState::Paused {
            if state == PlayerState::Ended {
                core.time_ms = 0.0;
            }
            let _ = core.state.set_state(PlayerState::Opening);
        }
        match core.state.set_state(PlayerState::Playing) {
            Ok(()) => STATUS_OK,
            Err(_) => STATUS_ERROR,
        }
    }

    fn set_pause(&mut self, pause: bool) {
        let core = self.core.lock();
        let target = match (pause, core.state.get_state()) {
            (true, PlayerState::Playing) => PlayerState::Paused,
            (false, PlayerState::Paused) => PlayerState::Playing,
            _ => return,
        };
        let _ = core.state.set_state(target);
    }

    fn can_pause(&self) -> bool {
        self.core.lock().track.as_ref().is_some_and(|t| t.pausable)
    }

    fn stop(&mut self) {
        let mut core = self.core.lock();
        core.time_ms = 0.0;
        let _ = core.state.set_state(PlayerState::Stopped);
    }

    fn set_time(&mut self, time_ms: i64) {
        let mut core = self.core.lock();
        let length = core.track.as_ref().and_then(|t| t.duration_ms);
        let mut target = time_ms.max(0) as f64;
        if let Some(length) = length {
            target = target.min(length as f64);
        }
        core.time_ms = target;
        // Kept as the start of the next play
        if core.state.get_state() == PlayerState::Ended {
            let _ = core.state.set_state(PlayerState::Stopped);
        }
        core.state.emit(PlayerEvent::TimeChanged {
            time_ms: target as i64,
        });
    }

    fn is_seekable(&self) -> bool {
        self.core.lock().track.as_ref().is_some_and(|t| t.seekable)
    }

    fn set_rate(&mut self, rate: f32) {
        if !rate.is_finite() || rate <= 0.0 {
            log::warn!("Ignoring playback rate {}", rate);
            return;
        }
        let mut core = self.core.lock();
        core.rate = rate;
        core.state.emit(PlayerEvent::RateChanged { rate });
    }

    fn rate(&self) -> f32 {
        self.core.lock().rate
    }

    fn volume(&self) -> i32 {
        self.core.lock().volume
    }

    fn set_volume(&mut self, volume: i32) -> i32 {
        let mut core = self.core.lock();
        if !(0..=core.max_volume).contains(&volume) {
            return STATUS_ERROR;
        }
        core.volume = volume;
        core.state.emit(PlayerEvent::VolumeChanged { volume });
        STATUS_OK
    }

    fn time(&self) -> i64 {
        let core = self.core.lock();
        let reports_time = core.track.as_ref().is_some_and(|t| t.reports_time);
        if !reports_time || core.state.get_state() == PlayerState::Error {
            return TIME_UNKNOWN;
        }
        core.time_ms as i64
    }

    fn length(&self) -> i64 {
        self.core
            .lock()
            .track
            .as_ref()
            .and_then(|t| t.duration_ms)
            .map_or(TIME_UNKNOWN, |ms| ms as i64)
    }

    fn is_playing(&self) -> bool {
        self.core.lock().state.get_state() == PlayerState::Playing
    }

    fn state(&self) -> PlayerState {
        self.core.lock().state.get_state()
    }
}
