// Byte source over HTTP for the demuxer
// Servers that honor byte ranges get a seekable, chunk-cached reader.
// Anything else (live radio, chunked responses) is read forward only.

use crate::client::{self, create_agent, get_with_retry, RemoteInfo};
use crate::config::HttpConfig;
use parking_lot::Mutex;
use soundroom_core::{AudioError, Result};
use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};

/// Most recently fetched chunks, oldest evicted first once the byte budget
/// is exceeded
struct ChunkCache {
    chunks: VecDeque<(u64, Vec<u8>)>,
    bytes: usize,
    max_bytes: usize,
}

impl ChunkCache {
    fn new(max_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            bytes: 0,
            max_bytes,
        }
    }

    fn get(&self, index: u64) -> Option<&[u8]> {
        self.chunks
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, data)| data.as_slice())
    }

    fn insert(&mut self, index: u64, data: Vec<u8>) {
        self.bytes += data.len();
        self.chunks.push_back((index, data));

        // Always keep the chunk just fetched
        while self.bytes > self.max_bytes && self.chunks.len() > 1 {
            if let Some((_, evicted)) = self.chunks.pop_front() {
                self.bytes -= evicted.len();
            }
        }
    }
}

struct RangedState {
    url: String,
    agent: ureq::Agent,
    config: HttpConfig,
    total_size: u64,
    position: u64,
    cache: ChunkCache,
}

impl RangedState {
    fn chunk(&mut self, index: u64) -> Result<&[u8]> {
        if self.cache.get(index).is_none() {
            let data = self.fetch_chunk(index)?;
            self.cache.insert(index, data);
        }
        self.cache
            .get(index)
            .ok_or_else(|| AudioError::NetworkError("Chunk evicted while reading".to_string()))
    }

    fn fetch_chunk(&self, index: u64) -> Result<Vec<u8>> {
        let chunk_size = self.config.chunk_size as u64;
        let start = index * chunk_size;
        let end = (start + chunk_size).min(self.total_size) - 1;
        log::debug!("Fetching range: bytes={}-{}", start, end);

        let response = get_with_retry(&self.agent, &self.url, Some((start, end)), &self.config)?;

        // A 200 here would hand us the whole body from byte 0
        if response.status() != 206 {
            return Err(AudioError::NetworkError(format!(
                "Expected 206 Partial Content for bytes={}-{}, got {}",
                start,
                end,
                response.status()
            )));
        }
        if let Some(range) = response.header("Content-Range") {
            if client::parse_start_from_content_range(range) != Some(start) {
                return Err(AudioError::NetworkError(format!(
                    "Content-Range '{}' does not start at {}",
                    range, start
                )));
            }
        }

        let mut data = Vec::with_capacity((end - start + 1) as usize);
        response
            .into_reader()
            .take(end - start + 1)
            .read_to_end(&mut data)
            .map_err(|e| AudioError::NetworkError(format!("Failed to read response: {}", e)))?;
        Ok(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.position >= self.total_size || buf.is_empty() {
            return Ok(0);
        }

        let chunk_size = self.config.chunk_size as u64;
        let index = self.position / chunk_size;
        let offset = (self.position % chunk_size) as usize;

        let chunk = self.chunk(index)?;
        if offset >= chunk.len() {
            // Server sent a short chunk
            return Ok(0);
        }
        let n = buf.len().min(chunk.len() - offset);
        buf[..n].copy_from_slice(&chunk[offset..offset + n]);
        self.position += n as u64;
        Ok(n)
    }
}

struct StreamingState {
    reader: Box<dyn Read + Send + Sync>,
    position: u64,
}

enum Inner {
    Ranged(Mutex<RangedState>),
    Streaming(Mutex<StreamingState>),
}

/// Remote media readable by symphonia
pub struct HttpSource {
    inner: Inner,
    info: RemoteInfo,
}

impl HttpSource {
    /// Probe `url` and open it in the best mode the server supports
    pub fn open(url: &str, config: &HttpConfig) -> Result<Self> {
        let agent = create_agent(config);
        let info = client::probe(&agent, url)?;
        log::info!(
            "HTTP source {}: length={:?} ranges={} type={:?}",
            url,
            info.content_length,
            info.accepts_ranges,
            info.content_type
        );

        let inner = match info.content_length {
            Some(total_size) if info.accepts_ranges && total_size > 0 => {
                Inner::Ranged(Mutex::new(RangedState {
                    url: url.to_string(),
                    agent,
                    config: config.clone(),
                    total_size,
                    position: 0,
                    cache: ChunkCache::new(config.max_cache_bytes),
                }))
            }
            _ => {
                let response = get_with_retry(&agent, url, None, config)?;
                log::info!("Server does not support ranges, streaming {} forward only", url);
                Inner::Streaming(Mutex::new(StreamingState {
                    reader: response.into_reader(),
                    position: 0,
                }))
            }
        };

        Ok(Self { inner, info })
    }

    pub fn info(&self) -> &RemoteInfo {
        &self.info
    }
}

impl Read for HttpSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.inner {
            Inner::Ranged(state) => state
                .lock()
                .read(buf)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string())),
            Inner::Streaming(state) => {
                let mut state = state.lock();
                let n = state.reader.read(buf)?;
                state.position += n as u64;
                Ok(n)
            }
        }
    }
}

impl Seek for HttpSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &self.inner {
            Inner::Ranged(state) => {
                let mut state = state.lock();
                let target = match pos {
                    SeekFrom::Start(offset) => Some(offset),
                    SeekFrom::Current(delta) => state.position.checked_add_signed(delta),
                    SeekFrom::End(delta) => state.total_size.checked_add_signed(delta),
                };
                let target = target.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "Seek before start of stream")
                })?;
                state.position = target;
                Ok(target)
            }
            Inner::Streaming(state) => {
                let position = state.lock().position;
                match pos {
                    SeekFrom::Current(0) => Ok(position),
                    SeekFrom::Start(offset) if offset == position => Ok(position),
                    _ => Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "Stream does not support seeking",
                    )),
                }
            }
        }
    }
}

impl symphonia::core::io::MediaSource for HttpSource {
    fn is_seekable(&self) -> bool {
        matches!(self.inner, Inner::Ranged(_))
    }

    fn byte_len(&self) -> Option<u64> {
        match &self.inner {
            Inner::Ranged(state) => Some(state.lock().total_size),
            Inner::Streaming(_) => None,
        }
    }
}
