// In-memory fixtures for tests here and in the backend crates

use crate::source::OpenedSource;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;

/// PCM16 WAV holding `seconds` of a constant `value` on every channel
pub fn wav_bytes(sample_rate: u32, channels: u16, seconds: f32, value: i16) -> Vec<u8> {
    let frames = (sample_rate as f32 * seconds) as u32;
    let block_align = channels as u32 * 2;
    let data_len = frames * block_align;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    out.extend_from_slice(&(block_align as u16).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames * channels as u32 {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// `bytes` as a WAV source whose reads fail once `limit` bytes are consumed,
/// like a connection dropping mid-track
pub fn failing_after(bytes: Vec<u8>, limit: u64) -> OpenedSource {
    let mut hint = Hint::new();
    hint.with_extension("wav");
    OpenedSource {
        media: Box::new(FailingReader {
            inner: Cursor::new(bytes),
            limit,
        }),
        hint,
        live: false,
    }
}

struct FailingReader {
    inner: Cursor<Vec<u8>>,
    limit: u64,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.limit.saturating_sub(self.inner.position());
        if remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset",
            ));
        }
        let len = buf.len().min(remaining as usize);
        self.inner.read(&mut buf[..len])
    }
}

impl Seek for FailingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl MediaSource for FailingReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.inner.get_ref().len() as u64)
    }
}
