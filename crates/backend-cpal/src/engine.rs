// Decode thread feeding the output stream
//
// The cpal stream is not Send, so the thread that opens the device also owns
// the stream for its whole life. Sessions talk to it through `Shared`.

use crate::config::EngineConfig;
use crate::media::CpalMedia;
use crate::output;
use crate::resample::{map_channels, LinearResampler};
use crate::ring::SharedRing;
use parking_lot::Mutex;
use soundroom_core::{AudioError, PlayerEvent, PlayerState, PlayerStateContainer, Result};
use soundroom_decode_symphonia::TrackDecoder;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Settings and clock shared by a session, its engine thread and the
/// output callback. Outlives individual engine runs.
pub(crate) struct Shared {
    playing: AtomicBool,
    /// Decoder is exhausted, remaining audio is in the ring
    draining: AtomicBool,
    /// Set until the engine has applied the pending seek
    seeking: AtomicBool,
    seek_target: Mutex<Option<u64>>,
    volume: AtomicI32,
    rate_bits: AtomicU32,
    position_us: AtomicU64,
    /// Id of the engine run allowed to write here
    run: AtomicU64,
}

impl Shared {
    pub(crate) fn new(volume: i32) -> Self {
        Self {
            playing: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            seeking: AtomicBool::new(false),
            seek_target: Mutex::new(None),
            volume: AtomicI32::new(volume),
            rate_bits: AtomicU32::new(1.0f32.to_bits()),
            position_us: AtomicU64::new(0),
            run: AtomicU64::new(0),
        }
    }

    /// Hand this state to a new engine run. Earlier runs must leave it alone.
    pub(crate) fn next_run(&self) -> u64 {
        self.run.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_current(&self, run: u64) -> bool {
        self.run.load(Ordering::Acquire) == run
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub(crate) fn is_seeking(&self) -> bool {
        self.seeking.load(Ordering::Acquire)
    }

    pub(crate) fn volume(&self) -> i32 {
        self.volume.load(Ordering::Relaxed)
    }

    pub(crate) fn set_volume(&self, volume: i32) {
        self.volume.store(volume, Ordering::Relaxed);
    }

    /// Linear gain, 100 is unity
    pub(crate) fn gain(&self) -> f32 {
        self.volume().max(0) as f32 / 100.0
    }

    pub(crate) fn rate(&self) -> f32 {
        f32::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_rate(&self, rate: f32) {
        self.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn position_ms(&self) -> u64 {
        self.position_us.load(Ordering::Acquire) / 1000
    }

    pub(crate) fn set_position_ms(&self, ms: u64) {
        self.position_us.store(ms * 1000, Ordering::Release);
    }

    /// Media time covered by `frames` device frames at the current rate
    pub(crate) fn advance_clock(&self, frames: usize, sample_rate: u32) {
        if frames == 0 || sample_rate == 0 {
            return;
        }
        let us = frames as f64 * self.rate() as f64 * 1_000_000.0 / sample_rate as f64;
        self.position_us.fetch_add(us as u64, Ordering::AcqRel);
    }

    /// Ask a running engine to jump. The clock shows the target at once and
    /// the output stays silent until the engine has repositioned.
    pub(crate) fn request_seek(&self, ms: u64) {
        *self.seek_target.lock() = Some(ms);
        self.seeking.store(true, Ordering::Release);
        self.set_position_ms(ms);
    }

    fn take_seek(&self) -> Option<u64> {
        self.seek_target.lock().take()
    }

    /// Drop any seek the engine did not get to
    pub(crate) fn cancel_seek(&self) {
        self.seek_target.lock().take();
        self.seeking.store(false, Ordering::Release);
    }
}

/// Decoder plus conversion into the device's rate and channel layout
pub(crate) struct Pipeline {
    decoder: TrackDecoder,
    resampler: LinearResampler,
    out_rate: u32,
    out_channels: u16,
    in_rate: u32,
    speed: f32,
}

impl Pipeline {
    pub(crate) fn new(decoder: TrackDecoder, out_rate: u32, out_channels: u16) -> Self {
        let in_rate = decoder.info().sample_rate;
        Self {
            resampler: LinearResampler::new(out_channels, in_rate, out_rate),
            decoder,
            out_rate,
            out_channels,
            in_rate,
            speed: 1.0,
        }
    }

    pub(crate) fn set_speed(&mut self, speed: f32) {
        if speed != self.speed {
            self.speed = speed;
            self.resampler.set_rates(self.in_rate, self.out_rate, speed);
        }
    }

    /// Next block in device format, None at end of stream
    pub(crate) fn next_block(&mut self) -> Result<Option<Vec<f32>>> {
        let Some(samples) = self.decoder.decode_next()? else {
            return Ok(None);
        };

        let info = self.decoder.info();
        let in_channels = info.channels;
        if info.sample_rate != self.in_rate {
            self.in_rate = info.sample_rate;
            self.resampler.set_rates(self.in_rate, self.out_rate, self.speed);
        }

        let mapped = map_channels(&samples, in_channels, self.out_channels);
        let mut block = Vec::new();
        self.resampler.process(&mapped, &mut block);
        Ok(Some(block))
    }

    pub(crate) fn seek(&mut self, ms: u64) -> Result<u64> {
        let reached = self.decoder.seek(ms)?;
        self.resampler.reset();
        Ok(reached)
    }
}

/// Handle to a running engine thread. Dropping it stops the thread.
pub(crate) struct Engine {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

struct EngineJob {
    media: CpalMedia,
    config: EngineConfig,
    state: PlayerStateContainer,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    run: u64,
}

impl Engine {
    /// Spawn the engine and wait until the device is running with audio
    /// buffered, or until the start timeout passes
    pub(crate) fn start(
        media: &CpalMedia,
        config: &EngineConfig,
        state: PlayerStateContainer,
        shared: Arc<Shared>,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let job = EngineJob {
            media: media.clone(),
            config: config.clone(),
            state,
            shared: shared.clone(),
            stop: stop.clone(),
            run: shared.next_run(),
        };

        let handle = thread::Builder::new()
            .name("soundroom-engine".to_string())
            .spawn(move || run(job, ready_tx))
            .map_err(|e| {
                AudioError::InitializationError(format!("Failed to spawn engine thread: {}", e))
            })?;

        match ready_rx.recv_timeout(config.start_timeout) {
            Ok(Ok(())) => Ok(Self {
                stop,
                thread: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // Left to exit on its own once the device call returns,
                // without access to the session's state
                stop.store(true, Ordering::SeqCst);
                shared.next_run();
                log::warn!("Engine did not start within {:?}", config.start_timeout);
                Err(AudioError::DeviceError(format!(
                    "Output did not start within {:?}",
                    config.start_timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(AudioError::InitializationError(
                    "Engine thread exited during start".to_string(),
                ))
            }
        }
    }

    /// The thread ran to completion (end of stream or failure)
    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            log::debug!("Waiting for engine thread to finish");
            let _ = handle.join();
        }
    }
}

fn run(job: EngineJob, ready: SyncSender<Result<()>>) {
    let EngineJob {
        media,
        config,
        state,
        shared,
        stop,
        run,
    } = job;

    let prepared = match prepare(&media, &config, &shared, &stop, run) {
        Ok(prepared) => prepared,
        Err(e) => {
            log::error!("Engine start failed: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };
    if !shared.is_current(run) {
        log::warn!("Engine for {} started too late, discarding it", media.source());
        return;
    }

    shared.cancel_seek();
    shared.draining.store(false, Ordering::Release);
    shared.set_position_ms(prepared.position_ms);
    if ready.send(Ok(())).is_err() {
        return;
    }

    let Prepared {
        pipeline,
        ring,
        stream,
        mut pending,
        finished,
        ..
    } = prepared;
    let mut feeder = Feeder {
        pipeline,
        ring,
        config: &config,
        state: &state,
        shared: &shared,
        stop: &stop,
        media: &media,
        run,
    };
    feeder.run(&mut pending, finished);

    drop(stream);
    log::info!("Engine for {} finished", media.source());
}

/// A positioned, prebuffered pipeline and a running stream
struct Prepared {
    pipeline: Pipeline,
    ring: SharedRing,
    stream: cpal::Stream,
    pending: Vec<f32>,
    finished: bool,
    /// Where the decoder was positioned
    position_ms: u64,
}

/// Open the device, position the decoder and prebuffer. Reads the session's
/// settings but leaves writing them to the caller.
fn prepare(
    media: &CpalMedia,
    config: &EngineConfig,
    shared: &Arc<Shared>,
    stop: &AtomicBool,
    run: u64,
) -> Result<Prepared> {
    let (device, supported) = output::open_device()?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();

    let mut pipeline = Pipeline::new(media.decoder()?, sample_rate, channels);
    pipeline.set_speed(shared.rate());

    let mut position_ms = shared.position_ms();
    if position_ms > 0 && media.info().seekable {
        position_ms = pipeline.seek(position_ms)?;
    }

    let min_ring = channels as usize * 1024;
    let ring = SharedRing::new(
        EngineConfig::samples_for(config.ring_buffer_ms, sample_rate, channels).max(min_ring),
    );
    let prebuffer = EngineConfig::samples_for(config.prebuffer_ms, sample_rate, channels)
        .min(ring.capacity() / 2);

    let mut pending = Vec::new();
    let mut finished = false;
    while ring.len() < prebuffer && !finished {
        if stop.load(Ordering::SeqCst) {
            return Err(AudioError::InvalidState("Stopped during start".to_string()));
        }
        match pipeline.next_block()? {
            Some(block) => {
                let written = ring.write(&block);
                pending.extend_from_slice(&block[written..]);
            }
            None => finished = true,
        }
    }

    let stream = output::start_stream(&device, &supported, ring.clone(), shared.clone(), run)?;
    Ok(Prepared {
        pipeline,
        ring,
        stream,
        pending,
        finished,
        position_ms,
    })
}

struct Feeder<'a> {
    pipeline: Pipeline,
    ring: SharedRing,
    config: &'a EngineConfig,
    state: &'a PlayerStateContainer,
    shared: &'a Arc<Shared>,
    stop: &'a AtomicBool,
    media: &'a CpalMedia,
    run: u64,
}

impl Feeder<'_> {
    /// Keep the ring filled until stopped, superseded, at the end or on a
    /// decode failure
    fn run(&mut self, pending: &mut Vec<f32>, finished: bool) {
        if !self.shared.is_current(self.run) {
            return;
        }
        self.feed(pending, finished);
        if self.shared.is_current(self.run) {
            self.shared.set_playing(false);
        }
    }

    fn feed(&mut self, pending: &mut Vec<f32>, mut finished: bool) {
        let mut last_tick = Instant::now();
        if finished {
            self.shared.draining.store(true, Ordering::Release);
        }

        while !self.stop.load(Ordering::SeqCst) && self.shared.is_current(self.run) {
            if let Some(target) = self.shared.take_seek() {
                self.ring.clear();
                pending.clear();
                finished = false;
                self.shared.draining.store(false, Ordering::Release);
                match self.pipeline.seek(target) {
                    Ok(reached) => self.shared.set_position_ms(reached),
                    Err(e) => log::warn!("Seek to {} ms failed: {}", target, e),
                }
                self.shared.seeking.store(false, Ordering::Release);
                log::debug!("Decoder repositioned to {} ms", self.shared.position_ms());
                self.emit_time();
            }

            self.pipeline.set_speed(self.shared.rate());

            if self.shared.is_playing() && last_tick.elapsed() >= self.config.position_interval {
                last_tick = Instant::now();
                self.emit_time();
            }

            if !pending.is_empty() {
                let written = self.ring.write(pending);
                pending.drain(..written);
                if !pending.is_empty() {
                    thread::sleep(self.config.idle_sleep);
                    continue;
                }
            }

            if finished {
                if self.ring.is_empty() && self.shared.is_playing() {
                    self.end_of_stream();
                    return;
                }
                thread::sleep(self.config.idle_sleep);
                continue;
            }

            // Keep the ring between three quarters and full
            if self.ring.free() < self.ring.capacity() / 4 {
                thread::sleep(self.config.idle_sleep);
                continue;
            }

            match self.pipeline.next_block() {
                Ok(Some(block)) => {
                    let written = self.ring.write(&block);
                    pending.extend_from_slice(&block[written..]);
                }
                Ok(None) => {
                    log::info!("End of stream, draining output");
                    finished = true;
                    self.shared.draining.store(true, Ordering::Release);
                }
                Err(e) => {
                    log::error!("Decoding failed: {}", e);
                    self.shared.set_playing(false);
                    self.state.fail(e.to_string());
                    return;
                }
            }
        }
    }

    fn emit_time(&self) {
        self.state.emit(PlayerEvent::TimeChanged {
            time_ms: self.shared.position_ms() as i64,
        });
    }

    fn end_of_stream(&self) {
        self.shared.set_playing(false);
        if let Some(duration) = self.media.info().duration_ms {
            self.shared.set_position_ms(duration);
        }
        self.emit_time();
        if self.state.set_state(PlayerState::Ended).is_ok() {
            self.state.emit(PlayerEvent::EndReached);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::wav_source;
    use soundroom_core::{EventKind, EventManager, PlayerConfig};
    use soundroom_decode_symphonia::testing::{failing_after, wav_bytes};
    use soundroom_transport_http::HttpConfig;
    use std::time::Duration;

    fn media(sample_rate: u32, channels: u16, seconds: f32) -> CpalMedia {
        CpalMedia::open(&wav_source(sample_rate, channels, seconds), &HttpConfig::default())
            .unwrap()
    }

    fn pipeline(media: &CpalMedia, out_rate: u32, out_channels: u16) -> Pipeline {
        Pipeline::new(media.decoder().unwrap(), out_rate, out_channels)
    }

    fn drain(pipeline: &mut Pipeline) -> Vec<f32> {
        let mut all = Vec::new();
        while let Some(block) = pipeline.next_block().unwrap() {
            all.extend(block);
        }
        all
    }

    /// State container wired to a dispatcher that records what it delivers
    fn watched_state() -> (PlayerStateContainer, EventManager, Arc<Mutex<Vec<PlayerEvent>>>) {
        let manager = EventManager::new(&PlayerConfig::default()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::EndReached, EventKind::EncounteredError] {
            let seen = seen.clone();
            manager
                .subscribe(
                    kind,
                    Arc::new(move |event: &PlayerEvent| seen.lock().push(event.clone())),
                )
                .unwrap();
        }
        let state = PlayerStateContainer::new();
        state.attach_events(manager.sink());
        (state, manager, seen)
    }

    fn wait_for_event(seen: &Mutex<Vec<PlayerEvent>>, kind: EventKind) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if seen.lock().iter().any(|event| event.kind() == kind) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            idle_sleep: Duration::from_millis(1),
            ..EngineConfig::default()
        }
    }

    /// Run `feeder` on its own thread while this one plays the device,
    /// reading the ring until the feeder returns. Gives back the samples read.
    fn run_with_drain(mut feeder: Feeder<'_>, ring: &SharedRing) -> Vec<f32> {
        thread::scope(|scope| {
            let handle = scope.spawn(move || feeder.run(&mut Vec::new(), false));
            let deadline = Instant::now() + Duration::from_secs(5);
            let mut played = Vec::new();
            let mut buf = [0.0f32; 256];
            while !handle.is_finished() && Instant::now() < deadline {
                let read = ring.read(&mut buf);
                played.extend_from_slice(&buf[..read]);
                thread::sleep(Duration::from_millis(1));
            }
            assert!(handle.is_finished(), "feeder did not return");
            played
        })
    }

    #[test]
    fn test_pipeline_converts_to_device_format() {
        let media = media(8000, 1, 1.0);
        let out = drain(&mut pipeline(&media, 16000, 2));
        assert_eq!(out.len() % 2, 0);
        let frames = out.len() / 2;
        assert!((15990..=16000).contains(&frames), "frames {}", frames);
    }

    #[test]
    fn test_pipeline_speed_shortens_output() {
        let media = media(8000, 2, 1.0);
        let mut pipeline = pipeline(&media, 8000, 2);
        pipeline.set_speed(2.0);
        let frames = drain(&mut pipeline).len() / 2;
        assert!((3990..=4000).contains(&frames), "frames {}", frames);
    }

    #[test]
    fn test_pipeline_seek() {
        let media = media(8000, 1, 2.0);
        let mut pipeline = pipeline(&media, 8000, 1);
        assert_eq!(pipeline.seek(1000).unwrap(), 1000);
        let frames = drain(&mut pipeline).len();
        assert!((7990..=8000).contains(&frames), "frames {}", frames);
    }

    #[test]
    fn test_feeder_reports_end_of_stream() {
        let media = media(8000, 1, 0.25);
        let ring = SharedRing::new(1024);
        let config = fast_config();
        let (state, _manager, seen) = watched_state();
        state.set_state(PlayerState::Playing).unwrap();
        let shared = Arc::new(Shared::new(100));
        let run = shared.next_run();
        shared.set_playing(true);
        let stop = AtomicBool::new(false);

        let feeder = Feeder {
            pipeline: pipeline(&media, 8000, 1),
            ring: ring.clone(),
            config: &config,
            state: &state,
            shared: &shared,
            stop: &stop,
            media: &media,
            run,
        };
        let played = run_with_drain(feeder, &ring);

        assert!((1990..=2000).contains(&played.len()), "played {}", played.len());
        assert_eq!(state.get_state(), PlayerState::Ended);
        assert_eq!(shared.position_ms(), 250);
        assert!(!shared.is_playing());
        assert!(wait_for_event(&seen, EventKind::EndReached));
    }

    #[test]
    fn test_feeder_applies_seek_request() {
        let media = media(8000, 1, 2.0);
        let ring = SharedRing::new(4096);
        // Audio from before the seek
        ring.write(&[9.0; 512]);
        let config = fast_config();
        let state = PlayerStateContainer::new();
        let shared = Arc::new(Shared::new(100));
        let run = shared.next_run();
        let stop = AtomicBool::new(false);
        shared.request_seek(1500);

        let mut feeder = Feeder {
            pipeline: pipeline(&media, 8000, 1),
            ring: ring.clone(),
            config: &config,
            state: &state,
            shared: &shared,
            stop: &stop,
            media: &media,
            run,
        };
        thread::scope(|scope| {
            let handle = scope.spawn(move || feeder.run(&mut Vec::new(), false));
            let deadline = Instant::now() + Duration::from_secs(1);
            while (shared.is_seeking() || ring.is_empty()) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            stop.store(true, Ordering::SeqCst);
            handle.join().unwrap();
        });

        assert!(!shared.is_seeking());
        assert_eq!(shared.position_ms(), 1500);
        let mut buffered = vec![0.0f32; ring.len()];
        ring.read(&mut buffered);
        assert!(!buffered.is_empty());
        assert!(buffered.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_decode_failure_moves_to_error() {
        let media = media(8000, 1, 4.0);
        let source = failing_after(wav_bytes(8000, 1, 4.0, 0), 8000);
        let decoder = TrackDecoder::open(source).unwrap();
        let ring = SharedRing::new(1024);
        let config = fast_config();
        let (state, _manager, seen) = watched_state();
        state.set_state(PlayerState::Playing).unwrap();
        let shared = Arc::new(Shared::new(100));
        let run = shared.next_run();
        shared.set_playing(true);
        let stop = AtomicBool::new(false);

        let feeder = Feeder {
            pipeline: Pipeline::new(decoder, 8000, 1),
            ring: ring.clone(),
            config: &config,
            state: &state,
            shared: &shared,
            stop: &stop,
            media: &media,
            run,
        };
        run_with_drain(feeder, &ring);

        assert_eq!(state.get_state(), PlayerState::Error);
        assert!(!shared.is_playing());
        assert!(wait_for_event(&seen, EventKind::EncounteredError));
    }

    #[test]
    fn test_superseded_run_leaves_session_alone() {
        let media = media(8000, 1, 1.0);
        let ring = SharedRing::new(1024);
        let config = fast_config();
        let state = PlayerStateContainer::new();
        state.set_state(PlayerState::Playing).unwrap();
        let shared = Arc::new(Shared::new(100));
        let stale = shared.next_run();
        let current = shared.next_run();
        assert!(!shared.is_current(stale));
        assert!(shared.is_current(current));

        shared.set_playing(true);
        shared.request_seek(700);
        let stop = AtomicBool::new(false);
        let mut feeder = Feeder {
            pipeline: pipeline(&media, 8000, 1),
            ring: ring.clone(),
            config: &config,
            state: &state,
            shared: &shared,
            stop: &stop,
            media: &media,
            run: stale,
        };
        feeder.run(&mut Vec::new(), true);

        // The newer run's settings survive untouched
        assert!(shared.is_playing());
        assert!(shared.is_seeking());
        assert_eq!(shared.take_seek(), Some(700));
        assert!(ring.is_empty());
        assert_eq!(state.get_state(), PlayerState::Playing);
    }

    #[test]
    fn test_clock_follows_rate() {
        let shared = Shared::new(100);
        shared.advance_clock(48000, 48000);
        assert_eq!(shared.position_ms(), 1000);

        shared.set_rate(0.5);
        shared.advance_clock(48000, 48000);
        assert_eq!(shared.position_ms(), 1500);
    }

    #[test]
    fn test_seek_request_moves_clock_immediately() {
        let shared = Shared::new(100);
        shared.request_seek(42_000);
        assert_eq!(shared.position_ms(), 42_000);
        assert!(shared.is_seeking());
        assert_eq!(shared.take_seek(), Some(42_000));
        assert_eq!(shared.take_seek(), None);

        shared.request_seek(1);
        shared.cancel_seek();
        assert!(!shared.is_seeking());
        assert_eq!(shared.take_seek(), None);
    }

    #[test]
    fn test_gain_scale() {
        let shared = Shared::new(50);
        assert_eq!(shared.gain(), 0.5);
        shared.set_volume(200);
        assert_eq!(shared.gain(), 2.0);
    }
}
