// HTTP client configuration and utilities

use crate::config::HttpConfig;
use soundroom_core::{AudioError, Result};
use std::time::Duration;

/// Longest pause between two attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// What a server tells us about a remote resource before we read it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteInfo {
    pub content_length: Option<u64>,
    pub accepts_ranges: bool,
    pub content_type: Option<String>,
}

impl RemoteInfo {
    /// Random access is possible only with byte ranges and a known length
    pub fn is_seekable(&self) -> bool {
        self.accepts_ranges && self.content_length.is_some()
    }
}

/// Create a configured HTTP agent
pub fn create_agent(config: &HttpConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(config.connect_timeout)
        .timeout_read(config.read_timeout)
        .timeout_write(config.write_timeout)
        .user_agent(&config.user_agent)
        .redirects(config.redirects)
        .build()
}

/// GET with exponential backoff between attempts
pub fn get_with_retry(
    agent: &ureq::Agent,
    url: &str,
    range: Option<(u64, u64)>,
    config: &HttpConfig,
) -> Result<ureq::Response> {
    let mut last_error = None;

    for attempt in 0..=config.retries {
        let mut request = agent.get(url);
        if let Some((start, end)) = range {
            request = request.set("Range", &format!("bytes={}-{}", start, end));
        }

        match request.call() {
            Ok(response) => return Ok(response),
            // Client errors will not improve by asking again
            Err(ureq::Error::Status(code, _)) if (400..500).contains(&code) => {
                return Err(AudioError::NetworkError(format!(
                    "GET {} returned status {}",
                    url, code
                )));
            }
            Err(e) => {
                last_error = Some(e.to_string());
                if attempt < config.retries {
                    let delay = backoff_delay(config.retry_delay, attempt);
                    log::warn!(
                        "GET {} failed (attempt {}), retrying after {:?}",
                        url,
                        attempt + 1,
                        delay
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }

    Err(AudioError::NetworkError(format!(
        "GET {} failed after {} attempts: {}",
        url,
        config.retries + 1,
        last_error.unwrap_or_default()
    )))
}

/// `base * 2^attempt`, capped at `MAX_RETRY_DELAY`
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

/// Ask the server about `url` without downloading the body.
/// Falls back to a one-byte Range GET when HEAD is refused.
pub fn probe(agent: &ureq::Agent, url: &str) -> Result<RemoteInfo> {
    match agent.head(url).call() {
        Ok(response) => Ok(RemoteInfo {
            content_length: response
                .header("Content-Length")
                .and_then(|s| s.trim().parse::<u64>().ok()),
            accepts_ranges: response
                .header("Accept-Ranges")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes")),
            content_type: response.header("Content-Type").map(str::to_string),
        }),
        Err(head_error) => {
            log::debug!("HEAD {} failed ({}), trying a Range probe", url, head_error);
            let response = agent
                .get(url)
                .set("Range", "bytes=0-0")
                .call()
                .map_err(|e| AudioError::NetworkError(format!("Probe of {} failed: {}", url, e)))?;

            let partial = response.status() == 206;
            let content_length = if partial {
                response
                    .header("Content-Range")
                    .and_then(parse_total_from_content_range)
            } else {
                response
                    .header("Content-Length")
                    .and_then(|s| s.trim().parse::<u64>().ok())
            };

            Ok(RemoteInfo {
                content_length,
                accepts_ranges: partial,
                content_type: response.header("Content-Type").map(str::to_string),
            })
        }
    }
}

/// `bytes 0-0/12345` -> 12345; `bytes 0-0/*` -> None
pub fn parse_total_from_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse::<u64>().ok()
}

/// Start offset of a `Content-Range` value
pub fn parse_start_from_content_range(header: &str) -> Option<u64> {
    let range = header.trim().strip_prefix("bytes")?.trim_start();
    range.split('-').next()?.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 10), MAX_RETRY_DELAY);
        assert_eq!(backoff_delay(base, 40), MAX_RETRY_DELAY);
        assert_eq!(backoff_delay(Duration::MAX, 1), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(parse_total_from_content_range("bytes 0-0/12345"), Some(12345));
        assert_eq!(parse_total_from_content_range("bytes 100-199/ 400"), Some(400));
        assert_eq!(parse_total_from_content_range("bytes 0-0/*"), None);
        assert_eq!(parse_total_from_content_range(""), None);
    }

    #[test]
    fn test_content_range_start() {
        assert_eq!(parse_start_from_content_range("bytes 262144-524287/900000"), Some(262144));
        assert_eq!(parse_start_from_content_range("bytes */900000"), None);
        assert_eq!(parse_start_from_content_range("items 0-1/2"), None);
    }

    #[test]
    fn test_seekable_needs_ranges_and_length() {
        let mut info = RemoteInfo {
            content_length: Some(10),
            accepts_ranges: true,
            content_type: None,
        };
        assert!(info.is_seekable());
        info.content_length = None;
        assert!(!info.is_seekable());
        info.content_length = Some(10);
        info.accepts_ranges = false;
        assert!(!info.is_seekable());
    }
}
