// Native playback backend: Symphonia decoding into a cpal output stream

mod backend;
pub mod config;
mod engine;
mod media;
mod output;
pub mod resample;
pub mod ring;
mod session;

pub use backend::CpalBackend;
pub use config::EngineConfig;
pub use media::CpalMedia;
pub use session::CpalSession;

use std::sync::Once;

/// Highest volume a session accepts; 100 is unity gain
pub const MAX_VOLUME: i32 = 200;

static INIT_LOGGER: Once = Once::new();

/// Install `env_logger` once. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .try_init();
    });
}
