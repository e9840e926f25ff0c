// Error handling for the playback facade and its backends

use crate::events::EventKind;
use std::fmt;

/// Playback error types
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// The backend could not resolve or open the source
    SourceResolutionError(String),

    /// The backend refused to start playback
    PlaybackStartError(String),

    /// The backend rejected a volume value
    VolumeRangeError(i32),

    /// A handler is already registered for this event kind
    AlreadySubscribed(EventKind),

    /// Failed to initialize a backend object
    InitializationError(String),

    /// Invalid state transition
    InvalidState(String),

    /// Audio format not supported
    UnsupportedFormat(String),

    /// Device error (hardware issues)
    DeviceError(String),

    /// IO error
    IoError(String),

    /// Decoding error
    DecodingError(String),

    /// Network error (download/streaming)
    NetworkError(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudioError::SourceResolutionError(msg) => {
                write!(f, "Could not resolve source: {}", msg)
            }
            AudioError::PlaybackStartError(msg) => write!(f, "Could not play source: {}", msg),
            AudioError::VolumeRangeError(volume) => write!(f, "Volume out of range: {}", volume),
            AudioError::AlreadySubscribed(kind) => {
                write!(f, "A handler is already subscribed to {:?}", kind)
            }
            AudioError::InitializationError(msg) => write!(f, "Initialization error: {}", msg),
            AudioError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AudioError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            AudioError::DeviceError(msg) => write!(f, "Device error: {}", msg),
            AudioError::IoError(msg) => write!(f, "IO error: {}", msg),
            AudioError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            AudioError::NetworkError(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, AudioError>;

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            AudioError::VolumeRangeError(150).to_string(),
            "Volume out of range: 150"
        );
        assert_eq!(
            AudioError::PlaybackStartError("no device".into()).to_string(),
            "Could not play source: no device"
        );
        assert_eq!(
            AudioError::AlreadySubscribed(EventKind::EndReached).to_string(),
            "A handler is already subscribed to EndReached"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.mp3");
        let err: AudioError = io.into();
        assert!(matches!(err, AudioError::IoError(ref msg) if msg.contains("missing.mp3")));
    }
}
