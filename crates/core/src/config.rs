// Facade configuration

use std::time::Duration;

/// Default minimum spacing between two delivered `TimeChanged` events
const TIME_EVENT_INTERVAL_MS: u64 = 100;

/// Tuning knobs shared by every player created from one instance
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Minimum spacing between two delivered `TimeChanged` events.
    /// Other event kinds are never throttled.
    pub time_event_interval: Duration,
    /// Name given to each player's event dispatch thread
    pub dispatch_thread_name: String,
}

impl PlayerConfig {
    pub fn with_time_event_interval(mut self, interval: Duration) -> Self {
        self.time_event_interval = interval;
        self
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            time_event_interval: Duration::from_millis(TIME_EVENT_INTERVAL_MS),
            dispatch_thread_name: "soundroom-events".to_string(),
        }
    }
}
