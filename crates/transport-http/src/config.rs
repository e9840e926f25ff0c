// HTTP transport settings

use std::time::Duration;

/// Chunk size for Range requests (256KB)
const CHUNK_SIZE: usize = 256 * 1024;

/// Maximum cache size (10MB)
const MAX_CACHE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub user_agent: String,
    pub redirects: u32,
    /// Extra attempts after the first failed request
    pub retries: u32,
    /// Delay before the first retry; doubled for each further attempt
    pub retry_delay: Duration,
    /// Bytes fetched per Range request
    pub chunk_size: usize,
    /// Upper bound on cached chunk bytes per source
    pub max_cache_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(30),
            user_agent: format!("soundroom/{}", env!("CARGO_PKG_VERSION")),
            redirects: 10,
            retries: 3,
            retry_delay: Duration::from_millis(500),
            chunk_size: CHUNK_SIZE,
            max_cache_bytes: MAX_CACHE_BYTES,
        }
    }
}
