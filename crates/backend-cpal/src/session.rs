// Native playback session

use crate::config::EngineConfig;
use crate::engine::{Engine, Shared};
use crate::media::CpalMedia;
use crate::MAX_VOLUME;
use soundroom_core::{
    EventSink, PlayerEvent, PlayerState, PlayerStateContainer, Session, STATUS_ERROR, STATUS_OK,
    TIME_UNKNOWN,
};
use std::sync::Arc;

/// Player handle bound to one `CpalMedia`.
///
/// Creating a session does not touch the audio device; the engine thread
/// and output stream are started by the first `play`.
pub struct CpalSession {
    config: EngineConfig,
    media: Option<CpalMedia>,
    state: PlayerStateContainer,
    shared: Arc<Shared>,
    engine: Option<Engine>,
}

impl CpalSession {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            config,
            media: None,
            state: PlayerStateContainer::new(),
            shared: Arc::new(Shared::new(100)),
            engine: None,
        }
    }

    fn engine_running(&self) -> bool {
        self.engine.as_ref().is_some_and(|engine| !engine.is_finished())
    }

    fn shutdown_engine(&mut self) {
        self.shared.set_playing(false);
        self.engine = None;
        self.shared.cancel_seek();
    }
}

impl Session for CpalSession {
    type Media = CpalMedia;

    fn set_media(&mut self, media: &CpalMedia) {
        self.shutdown_engine();
        self.shared.set_position_ms(0);
        self.media = Some(media.clone());
        if let Some(length) = media.info().duration_ms {
            self.state.emit(PlayerEvent::LengthChanged {
                length_ms: length as i64,
            });
        }
    }

    fn attach_events(&mut self, sink: EventSink) {
        self.state.attach_events(sink);
    }

    fn play(&mut self) -> i32 {
        let Some(media) = self.media.clone() else {
            log::warn!("play called on a session without media");
            return STATUS_ERROR;
        };

        match self.state.get_state() {
            PlayerState::Playing if self.engine_running() => return STATUS_OK,
            PlayerState::Paused if self.engine_running() => {
                self.shared.set_playing(true);
                let _ = self.state.set_state(PlayerState::Playing);
                return STATUS_OK;
            }
            PlayerState::Ended => self.shared.set_position_ms(0),
            _ => {}
        }

        self.shutdown_engine();
        let _ = self.state.set_state(PlayerState::Opening);

        match Engine::start(&media, &self.config, self.state.clone(), self.shared.clone()) {
            Ok(engine) => {
                self.engine = Some(engine);
                self.shared.set_playing(true);
                let _ = self.state.set_state(PlayerState::Playing);
                log::info!("Playing {}", media.source());
                STATUS_OK
            }
            Err(e) => {
                log::error!("Could not start {}: {}", media.source(), e);
                self.state.fail(e.to_string());
                STATUS_ERROR
            }
        }
    }

    fn set_pause(&mut self, pause: bool) {
        match (pause, self.state.get_state()) {
            (true, PlayerState::Playing) => {
                self.shared.set_playing(false);
                let _ = self.state.set_state(PlayerState::Paused);
            }
            (false, PlayerState::Paused) if self.engine_running() => {
                self.shared.set_playing(true);
                let _ = self.state.set_state(PlayerState::Playing);
            }
            _ => {}
        }
    }

    fn can_pause(&self) -> bool {
        self.media.as_ref().is_some_and(|media| !media.info().live)
    }

    fn stop(&mut self) {
        self.shutdown_engine();
        self.shared.set_position_ms(0);
        if self.media.is_some() {
            let _ = self.state.set_state(PlayerState::Stopped);
        }
    }

    fn set_time(&mut self, time_ms: i64) {
        let Some(media) = &self.media else {
            return;
        };
        if !media.info().seekable {
            log::debug!("Ignoring seek on non-seekable {}", media.source());
            return;
        }

        let mut target = time_ms.max(0) as u64;
        if let Some(length) = media.info().duration_ms {
            target = target.min(length);
        }

        if self.engine_running() {
            self.shared.request_seek(target);
        } else {
            // Applied as the start offset of the next run
            self.shared.set_position_ms(target);
            if self.state.get_state() == PlayerState::Ended {
                let _ = self.state.set_state(PlayerState::Stopped);
            }
            self.state.emit(PlayerEvent::TimeChanged {
                time_ms: target as i64,
            });
        }
    }

    fn is_seekable(&self) -> bool {
        self.media.as_ref().is_some_and(|media| media.info().seekable)
    }

    fn set_rate(&mut self, rate: f32) {
        if !rate.is_finite() || rate <= 0.0 {
            log::warn!("Ignoring playback rate {}", rate);
            return;
        }
        self.shared.set_rate(rate);
        self.state.emit(PlayerEvent::RateChanged { rate });
    }

    fn rate(&self) -> f32 {
        self.shared.rate()
    }

    fn volume(&self) -> i32 {
        self.shared.volume()
    }

    fn set_volume(&mut self, volume: i32) -> i32 {
        if !(0..=MAX_VOLUME).contains(&volume) {
            return STATUS_ERROR;
        }
        self.shared.set_volume(volume);
        self.state.emit(PlayerEvent::VolumeChanged { volume });
        STATUS_OK
    }

    fn time(&self) -> i64 {
        if self.media.is_none() || self.state.get_state() == PlayerState::Error {
            return TIME_UNKNOWN;
        }
        self.shared.position_ms() as i64
    }

    fn length(&self) -> i64 {
        self.media
            .as_ref()
            .and_then(|media| media.info().duration_ms)
            .map_or(TIME_UNKNOWN, |ms| ms as i64)
    }

    fn is_playing(&self) -> bool {
        self.state.get_state() == PlayerState::Playing
    }

    fn state(&self) -> PlayerState {
        self.state.get_state()
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        self.shutdown_engine();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::wav_source;
    use soundroom_transport_http::HttpConfig;

    fn bound_session(seconds: f32) -> CpalSession {
        let media = CpalMedia::open(&wav_source(8000, 2, seconds), &HttpConfig::default()).unwrap();
        let mut session = CpalSession::new(EngineConfig::default());
        session.set_media(&media);
        session
    }

    #[test]
    fn test_unbound_session() {
        let mut session = CpalSession::new(EngineConfig::default());
        assert_eq!(session.play(), STATUS_ERROR);
        assert_eq!(session.time(), TIME_UNKNOWN);
        assert_eq!(session.length(), TIME_UNKNOWN);
        assert!(!session.can_pause());
        assert!(!session.is_seekable());
        assert_eq!(session.state(), PlayerState::NothingSpecial);
    }

    #[test]
    fn test_bound_session_reports_media() {
        let session = bound_session(3.0);
        assert_eq!(session.length(), 3000);
        assert_eq!(session.time(), 0);
        assert!(session.can_pause());
        assert!(session.is_seekable());
        assert!(!session.is_playing());
    }

    #[test]
    fn test_seek_before_play_sets_start_offset() {
        let mut session = bound_session(3.0);
        session.set_time(1250);
        assert_eq!(session.time(), 1250);

        session.set_time(99_000);
        assert_eq!(session.time(), 3000);

        session.set_time(-5);
        assert_eq!(session.time(), 0);
    }

    #[test]
    fn test_volume_range() {
        let mut session = bound_session(1.0);
        assert_eq!(session.volume(), 100);
        assert_eq!(session.set_volume(150), STATUS_OK);
        assert_eq!(session.set_volume(MAX_VOLUME), STATUS_OK);
        assert_eq!(session.set_volume(MAX_VOLUME + 1), STATUS_ERROR);
        assert_eq!(session.set_volume(-1), STATUS_ERROR);
        assert_eq!(session.volume(), MAX_VOLUME);
    }

    #[test]
    fn test_rate() {
        let mut session = bound_session(1.0);
        session.set_rate(1.5);
        assert_eq!(session.rate(), 1.5);
        session.set_rate(0.0);
        session.set_rate(f32::INFINITY);
        assert_eq!(session.rate(), 1.5);
    }

    #[test]
    fn test_stop_resets_position() {
        let mut session = bound_session(2.0);
        session.set_time(500);
        session.stop();
        assert_eq!(session.time(), 0);
        assert_eq!(session.state(), PlayerState::Stopped);
    }

    #[test]
    fn test_pause_without_playback_is_ignored() {
        let mut session = bound_session(1.0);
        session.set_pause(true);
        assert_eq!(session.state(), PlayerState::NothingSpecial);
        session.set_pause(false);
        assert_eq!(session.state(), PlayerState::NothingSpecial);
    }
}
