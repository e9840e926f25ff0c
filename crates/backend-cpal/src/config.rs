// Engine tuning

use soundroom_transport_http::HttpConfig;
use std::time::Duration;

/// Native backend configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the buffer between decoder and device, in milliseconds
    pub ring_buffer_ms: u32,

    /// Audio decoded before the stream starts pulling
    pub prebuffer_ms: u32,

    /// How long `play` waits for the device and the first audio
    pub start_timeout: Duration,

    /// Spacing of `TimeChanged` events while playing
    pub position_interval: Duration,

    /// Decoder thread nap when the ring is full or playback is paused
    pub idle_sleep: Duration,

    pub http: HttpConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_buffer_ms: 500,
            prebuffer_ms: 150,
            start_timeout: Duration::from_secs(5),
            position_interval: Duration::from_millis(250),
            idle_sleep: Duration::from_millis(5),
            http: HttpConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Interleaved samples that fit in `ms` of device audio
    pub(crate) fn samples_for(ms: u32, sample_rate: u32, channels: u16) -> usize {
        (sample_rate as u64 * channels as u64 * ms as u64 / 1000) as usize
    }
}
