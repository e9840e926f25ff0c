// Core types and traits for the soundroom playback facade

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod instance;
pub mod player;
pub mod sim;
pub mod source;
pub mod state;

// Re-export commonly used types
pub use backend::{Backend, Session, STATUS_ERROR, STATUS_OK, TIME_UNKNOWN};
pub use config::PlayerConfig;
pub use error::{AudioError, Result};
pub use events::{
    EventKind, EventManager, EventSink, PlayerCallback, PlayerEvent, SubscriptionToken,
};
pub use instance::Instance;
pub use player::Player;
pub use source::Source;
pub use state::{PlaybackStatus, PlayerState, PlayerStateContainer};
