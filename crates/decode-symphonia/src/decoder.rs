// Demux and decode one audio track to interleaved f32

use crate::source::OpenedSource;
use soundroom_core::{AudioError, Result};
use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::sample::Sample;
use symphonia::core::units::{Time, TimeBase};

/// What the probe learned about the selected track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// None for live streams and containers that do not record a length
    pub duration_ms: Option<u64>,
    /// Random access is possible and the length is known
    pub seekable: bool,
    pub live: bool,
}

/// Decoder for the first audio track of a container
pub struct TrackDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    codec_params: CodecParameters,
    track_id: u32,
    info: TrackInfo,
    /// Frames still to drop after a seek landed on an earlier packet
    skip_frames: usize,
}

impl TrackDecoder {
    /// Probe the container and prepare a decoder for its audio track
    pub fn open(opened: OpenedSource) -> Result<Self> {
        let OpenedSource { media, hint, live } = opened;
        let byte_seekable = media.is_seekable();
        let mss = MediaSourceStream::new(media, Default::default());

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::UnsupportedFormat(format!("Failed to probe media: {}", e)))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::UnsupportedFormat("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params.sample_rate.ok_or_else(|| {
            AudioError::UnsupportedFormat("Sample rate not specified".to_string())
        })?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);
        let duration_ms = if live {
            None
        } else {
            frames_to_ms(codec_params.n_frames, codec_params.time_base, sample_rate)
        };

        let decoder = make_decoder(&codec_params)?;

        let info = TrackInfo {
            sample_rate,
            channels,
            duration_ms,
            seekable: byte_seekable && !live && duration_ms.is_some(),
            live,
        };
        log::info!(
            "Track {}: {} Hz, {} channels, duration {:?} ms, seekable {}",
            track_id,
            info.sample_rate,
            info.channels,
            info.duration_ms,
            info.seekable
        );

        Ok(Self {
            format,
            decoder,
            codec_params,
            track_id,
            info,
            skip_frames: 0,
        })
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    /// Next block of interleaved samples, or None at end of stream.
    /// Corrupt packets are skipped.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    log::debug!("Stream parameters changed, rebuilding decoder");
                    self.decoder = make_decoder(&self.codec_params)?;
                    continue;
                }
                Err(e) => {
                    return Err(AudioError::DecodingError(format!(
                        "Failed to read packet: {}",
                        e
                    )))
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let channels = spec.channels.count() as u16;
                    if channels != self.info.channels || spec.rate != self.info.sample_rate {
                        log::debug!(
                            "Decoded format {} Hz / {} ch differs from container, following the decoder",
                            spec.rate,
                            channels
                        );
                        self.info.channels = channels;
                        self.info.sample_rate = spec.rate;
                    }
                    let mut samples = audio_buf_to_f32(&decoded);
                    if self.skip_frames > 0 {
                        let channels = channels.max(1) as usize;
                        let skip = (self.skip_frames * channels).min(samples.len());
                        samples.drain(..skip);
                        self.skip_frames -= skip / channels;
                        if samples.is_empty() {
                            continue;
                        }
                    }
                    return Ok(Some(samples));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Decode error (skipping packet): {}", e);
                    continue;
                }
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(AudioError::DecodingError(format!("Decode failed: {}", e))),
            }
        }
    }

    /// Jump to `time_ms` and return the position reached. The container
    /// lands on a packet boundary at or before the target; the frames in
    /// between are dropped from the next decoded blocks.
    pub fn seek(&mut self, time_ms: u64) -> Result<u64> {
        if !self.info.seekable {
            return Err(AudioError::InvalidState("Track is not seekable".to_string()));
        }

        let time = Time::new(time_ms / 1000, (time_ms % 1000) as f64 / 1000.0);
        let seeked_to = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| AudioError::DecodingError(format!("Seek failed: {}", e)))?;

        self.decoder.reset();

        let lead_in = seeked_to.required_ts.saturating_sub(seeked_to.actual_ts);
        self.skip_frames = self.ts_to_frames(lead_in);
        if self.skip_frames > 0 {
            log::debug!("Seek landed {} frames early, trimming", self.skip_frames);
        }

        Ok(frames_to_ms(
            Some(seeked_to.required_ts),
            self.codec_params.time_base,
            self.info.sample_rate,
        )
        .unwrap_or(time_ms))
    }

    /// Timestamp span in the track's time base to frames at its sample rate
    fn ts_to_frames(&self, ts: u64) -> usize {
        match self.codec_params.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                ((time.seconds as f64 + time.frac) * self.info.sample_rate as f64).round() as usize
            }
            None => ts as usize,
        }
    }
}

fn make_decoder(params: &CodecParameters) -> Result<Box<dyn Decoder>> {
    symphonia::default::get_codecs()
        .make(params, &DecoderOptions::default())
        .map_err(|e| AudioError::UnsupportedFormat(format!("Failed to create decoder: {}", e)))
}

fn frames_to_ms(frames: Option<u64>, time_base: Option<TimeBase>, sample_rate: u32) -> Option<u64> {
    let frames = frames?;
    match time_base {
        Some(tb) => {
            let time = tb.calc_time(frames);
            Some(time.seconds * 1000 + (time.frac * 1000.0).round() as u64)
        }
        None if sample_rate > 0 => Some(frames * 1000 / sample_rate as u64),
        None => None,
    }
}

/// Convert any decoded buffer to interleaved f32 in [-1.0, 1.0]
fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
    match buf {
        AudioBufferRef::F32(b) => interleave(b.planes(), b.frames(), |s: f32| s),
        AudioBufferRef::F64(b) => interleave(b.planes(), b.frames(), |s: f64| s as f32),
        AudioBufferRef::S8(b) => interleave(b.planes(), b.frames(), |s: i8| s as f32 / 128.0),
        AudioBufferRef::S16(b) => interleave(b.planes(), b.frames(), |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(b) => {
            interleave(b.planes(), b.frames(), |s| s.inner() as f32 / 8388608.0)
        }
        AudioBufferRef::S32(b) => {
            interleave(b.planes(), b.frames(), |s: i32| s as f32 / 2147483648.0)
        }
        AudioBufferRef::U8(b) => {
            interleave(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
        }
        AudioBufferRef::U16(b) => {
            interleave(b.planes(), b.frames(), |s: u16| (s as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(b) => interleave(b.planes(), b.frames(), |s| {
            (s.inner() as f32 - 8388608.0) / 8388608.0
        }),
        AudioBufferRef::U32(b) => interleave(b.planes(), b.frames(), |s: u32| {
            ((s as f64 - 2147483648.0) / 2147483648.0) as f32
        }),
    }
}

fn interleave<T: Sample + Copy, F: Fn(T) -> f32>(
    planes: AudioPlanes<T>,
    frames: usize,
    convert: F,
) -> Vec<f32> {
    let planes = planes.planes();
    if planes.is_empty() || frames == 0 {
        return Vec::new();
    }

    let mut interleaved = Vec::with_capacity(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            interleaved.push(convert(plane[frame]));
        }
    }
    interleaved
}
