// Resolved media for the native backend

use parking_lot::Mutex;
use soundroom_core::{AudioError, Result, Source};
use soundroom_decode_symphonia::{open_media_source, TrackDecoder, TrackInfo};
use soundroom_transport_http::HttpConfig;
use std::sync::Arc;

/// A probed source. Cheap to clone; clones share the primed decoder.
#[derive(Clone)]
pub struct CpalMedia {
    inner: Arc<MediaInner>,
}

struct MediaInner {
    source: Source,
    info: TrackInfo,
    http: HttpConfig,
    /// Decoder left over from probing, handed to the first engine run
    primed: Mutex<Option<TrackDecoder>>,
}

impl CpalMedia {
    /// Open and probe `source`. Any failure is a `SourceResolutionError`.
    pub(crate) fn open(source: &Source, http: &HttpConfig) -> Result<Self> {
        let opened = open_media_source(source, http)?;
        let decoder = TrackDecoder::open(opened).map_err(|e| match e {
            AudioError::SourceResolutionError(_) => e,
            other => AudioError::SourceResolutionError(format!("{}: {}", source, other)),
        })?;

        log::info!("Resolved {}", source);
        Ok(Self {
            inner: Arc::new(MediaInner {
                source: source.clone(),
                info: decoder.info().clone(),
                http: http.clone(),
                primed: Mutex::new(Some(decoder)),
            }),
        })
    }

    pub fn source(&self) -> &Source {
        &self.inner.source
    }

    /// Track details found while probing
    pub fn info(&self) -> &TrackInfo {
        &self.inner.info
    }

    /// A decoder positioned at the start: the primed one if still unused,
    /// otherwise a fresh one
    pub(crate) fn decoder(&self) -> Result<TrackDecoder> {
        if let Some(decoder) = self.inner.primed.lock().take() {
            return Ok(decoder);
        }
        log::debug!("Reopening {}", self.inner.source);
        TrackDecoder::open(open_media_source(&self.inner.source, &self.inner.http)?)
    }

    /// Free the primed decoder and whatever connection it holds
    pub(crate) fn release(&self) {
        if self.inner.primed.lock().take().is_some() {
            log::debug!("Released unused decoder for {}", self.inner.source);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_primed(&self) -> bool {
        self.inner.primed.lock().is_some()
    }
}

impl std::fmt::Debug for CpalMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalMedia")
            .field("source", &self.inner.source)
            .field("info", &self.inner.info)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use soundroom_decode_symphonia::testing::wav_bytes;

    /// PCM16 WAV of silence, held in memory
    pub(crate) fn wav_source(sample_rate: u32, channels: u16, seconds: f32) -> Source {
        Source::bytes(wav_bytes(sample_rate, channels, seconds, 0), Some("wav"))
    }

    #[test]
    fn test_open_probes_track() {
        let media = CpalMedia::open(&wav_source(22050, 2, 2.0), &HttpConfig::default()).unwrap();
        assert_eq!(media.info().sample_rate, 22050);
        assert_eq!(media.info().channels, 2);
        assert_eq!(media.info().duration_ms, Some(2000));
        assert!(media.info().seekable);
    }

    #[test]
    fn test_undecodable_bytes_fail_resolution() {
        let source = Source::bytes(vec![0u8; 256], Some("mp3"));
        let err = CpalMedia::open(&source, &HttpConfig::default()).unwrap_err();
        assert!(matches!(err, AudioError::SourceResolutionError(_)));
    }

    #[test]
    fn test_primed_decoder_used_once() {
        let media = CpalMedia::open(&wav_source(8000, 1, 0.5), &HttpConfig::default()).unwrap();
        assert!(media.is_primed());

        let first = media.decoder().unwrap();
        assert!(!media.is_primed());
        drop(first);

        // Reopened from the source
        let second = media.decoder().unwrap();
        assert_eq!(second.info().duration_ms, Some(500));
    }

    #[test]
    fn test_release_drops_primed_decoder() {
        let media = CpalMedia::open(&wav_source(8000, 1, 0.5), &HttpConfig::default()).unwrap();
        media.clone().release();
        assert!(!media.is_primed());
    }
}
