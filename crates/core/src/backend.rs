// Backend contract the player facade drives
//
// The shape follows native media libraries such as libvlc: an instance
// creates media and player objects, and player calls report failure through
// integer sentinels instead of a separate error channel. The facade owns the
// translation of those sentinels into typed errors.

use crate::error::Result;
use crate::events::EventSink;
use crate::source::Source;
use crate::state::PlayerState;

/// Returned by `Session::play` and `Session::set_volume` on success
pub const STATUS_OK: i32 = 0;

/// Returned by `Session::play` and `Session::set_volume` on failure
pub const STATUS_ERROR: i32 = -1;

/// Returned by `Session::time` and `Session::length` when the value is unknown
pub const TIME_UNKNOWN: i64 = -1;

/// A media-playback runtime. One value is owned by an `Instance`, which
/// hands every media and session it creates back here for release.
pub trait Backend: Send + Sync {
    /// Resolved source
    type Media: Send + Sync;

    /// Playback session bound to one media
    type Session: Session<Media = Self::Media>;

    /// Short name used in logs
    fn name(&self) -> &str;

    /// Resolve a source into a media object.
    /// Fails with `SourceResolutionError` when the source cannot be opened.
    fn create_media(&self, source: &Source) -> Result<Self::Media>;

    /// Create an unbound playback session
    fn create_session(&self) -> Result<Self::Session>;

    /// Release a media object created by this backend
    fn release_media(&self, _media: &mut Self::Media) {}

    /// Release a session created by this backend
    fn release_session(&self, session: &mut Self::Session) {
        session.stop();
    }
}

/// A media player handle
pub trait Session: Send {
    type Media;

    /// Bind media; called once, before any control call
    fn set_media(&mut self, media: &Self::Media);

    /// Route this session's events to a player's dispatcher
    fn attach_events(&mut self, _sink: EventSink) {}

    /// Start or resume playback. `STATUS_ERROR` on failure.
    fn play(&mut self) -> i32;

    fn set_pause(&mut self, pause: bool);

    fn can_pause(&self) -> bool;

    /// Stop playback and reset the position
    fn stop(&mut self);

    /// Jump to a time in milliseconds
    fn set_time(&mut self, time_ms: i64);

    fn is_seekable(&self) -> bool;

    fn set_rate(&mut self, rate: f32);

    fn rate(&self) -> f32;

    fn volume(&self) -> i32;

    /// `STATUS_ERROR` when the value is outside the backend's range
    fn set_volume(&mut self, volume: i32) -> i32;

    /// Current time in milliseconds, or `TIME_UNKNOWN`
    fn time(&self) -> i64;

    /// Media length in milliseconds, or `TIME_UNKNOWN`
    fn length(&self) -> i64;

    fn is_playing(&self) -> bool;

    fn state(&self) -> PlayerState;
}
