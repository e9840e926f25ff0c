// Opening and decoding media with Symphonia

pub mod decoder;
pub mod source;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use decoder::{TrackDecoder, TrackInfo};
pub use source::{open_media_source, OpenedSource};
