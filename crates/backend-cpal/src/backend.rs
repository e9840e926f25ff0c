// Backend entry point

use crate::config::EngineConfig;
use crate::init_logging;
use crate::media::CpalMedia;
use crate::session::CpalSession;
use soundroom_core::{Backend, Result, Source};

/// Plays files, in-memory media and http(s) streams on the default output
/// device
pub struct CpalBackend {
    config: EngineConfig,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_logging();
        log::debug!("Native backend created with {:?}", config);
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpalBackend {
    type Media = CpalMedia;
    type Session = CpalSession;

    fn name(&self) -> &str {
        "cpal"
    }

    fn create_media(&self, source: &Source) -> Result<CpalMedia> {
        CpalMedia::open(source, &self.config.http)
    }

    fn create_session(&self) -> Result<CpalSession> {
        Ok(CpalSession::new(self.config.clone()))
    }

    fn release_media(&self, media: &mut CpalMedia) {
        media.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::wav_source;
    use soundroom_core::{AudioError, Instance};

    #[test]
    fn test_missing_file_is_rejected() {
        let instance = Instance::new(CpalBackend::new());
        let err = instance.open("/no/such/dir/track.mp3").err();
        assert!(matches!(err, Some(AudioError::SourceResolutionError(_))));
        assert_eq!(instance.live_players(), 0);
    }

    #[test]
    fn test_facade_controls_without_starting_output() {
        let instance = Instance::new(CpalBackend::new());
        let player = instance.open(wav_source(8000, 2, 4.0)).unwrap();

        assert_eq!(player.duration(), Some(4.0));
        assert!(!player.is_playing());
        assert!(player.is_seekable());

        player.seek(2.5);
        let position = player.position().unwrap();
        assert!((position - 2.5).abs() < 0.001);

        player.rewind();
        assert_eq!(player.position(), Some(0.0));

        player.set_volume(150).unwrap();
        assert_eq!(
            player.set_volume(201),
            Err(AudioError::VolumeRangeError(201))
        );
        assert_eq!(player.volume(), 150);

        player.stop();
        assert!(!player.is_playing());
        assert_eq!(instance.live_players(), 1);

        player.close();
        assert_eq!(instance.live_players(), 0);
    }
}
