// Event subscription for player sessions
// Events are queued by the backend and delivered on a dedicated dispatch
// thread, so handlers never run on the caller's thread or the audio thread.

use crate::config::PlayerConfig;
use crate::error::{AudioError, Result};
use crate::state::PlayerState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Kinds of events a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    TimeChanged,
    LengthChanged,
    EndReached,
    EncounteredError,
    VolumeChanged,
    RateChanged,
}

/// Player event types
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Player state changed
    StateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
    },

    /// Playback position updated
    TimeChanged { time_ms: i64 },

    /// Media length became known or changed
    LengthChanged { length_ms: i64 },

    /// Playback reached the end of the media
    EndReached,

    /// Playback error occurred
    EncounteredError { message: String },

    /// Volume changed
    VolumeChanged { volume: i32 },

    /// Playback rate changed
    RateChanged { rate: f32 },
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::StateChanged { .. } => EventKind::StateChanged,
            PlayerEvent::TimeChanged { .. } => EventKind::TimeChanged,
            PlayerEvent::LengthChanged { .. } => EventKind::LengthChanged,
            PlayerEvent::EndReached => EventKind::EndReached,
            PlayerEvent::EncounteredError { .. } => EventKind::EncounteredError,
            PlayerEvent::VolumeChanged { .. } => EventKind::VolumeChanged,
            PlayerEvent::RateChanged { .. } => EventKind::RateChanged,
        }
    }
}

/// Player callback trait
/// Implementations should be lightweight; they run on the dispatch thread
/// and delay every event queued behind them.
pub trait PlayerCallback: Send + Sync {
    fn on_event(&self, event: &PlayerEvent);
}

impl<F> PlayerCallback for F
where
    F: Fn(&PlayerEvent) + Send + Sync,
{
    fn on_event(&self, event: &PlayerEvent) {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to remove the handler again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    id: u64,
    kind: EventKind,
}

impl SubscriptionToken {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

enum Message {
    Event(PlayerEvent),
    Shutdown,
}

/// Sending half handed to backends. Cloneable and cheap; emitting on a
/// sink whose manager is gone is silently ignored.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<Sender<Message>>,
}

impl EventSink {
    /// A sink that drops every event
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: PlayerEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Message::Event(event));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.tx.is_some()
    }
}

type HandlerTable = HashMap<EventKind, (SubscriptionToken, Arc<dyn PlayerCallback>)>;

/// Per-player registration table plus the thread that drains the queue
pub struct EventManager {
    handlers: Arc<Mutex<HandlerTable>>,
    next_id: AtomicU64,
    tx: Sender<Message>,
    worker: Option<JoinHandle<()>>,
    worker_id: Option<ThreadId>,
}

impl EventManager {
    pub fn new(config: &PlayerConfig) -> Result<Self> {
        let handlers: Arc<Mutex<HandlerTable>> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel();

        let table = handlers.clone();
        let interval = config.time_event_interval;
        let worker = thread::Builder::new()
            .name(config.dispatch_thread_name.clone())
            .spawn(move || dispatch_loop(rx, table, interval))
            .map_err(|e| {
                AudioError::InitializationError(format!("Failed to spawn event dispatcher: {}", e))
            })?;
        let worker_id = worker.thread().id();

        Ok(Self {
            handlers,
            next_id: AtomicU64::new(1),
            tx,
            worker: Some(worker),
            worker_id: Some(worker_id),
        })
    }

    pub fn sink(&self) -> EventSink {
        EventSink {
            tx: Some(self.tx.clone()),
        }
    }

    /// Register the single handler for `kind`
    pub fn subscribe(
        &self,
        kind: EventKind,
        callback: Arc<dyn PlayerCallback>,
    ) -> Result<SubscriptionToken> {
        let mut handlers = self.handlers.lock();
        if handlers.contains_key(&kind) {
            return Err(AudioError::AlreadySubscribed(kind));
        }

        let token = SubscriptionToken {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
        };
        handlers.insert(kind, (token, callback));
        log::debug!("Subscribed handler {} to {:?}", token.id, kind);
        Ok(token)
    }

    /// Remove a handler. Returns false if the token is no longer registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut handlers = self.handlers.lock();
        match handlers.get(&token.kind) {
            Some((registered, _)) if *registered == token => {
                handlers.remove(&token.kind);
                log::debug!("Unsubscribed handler {} from {:?}", token.id, token.kind);
                true
            }
            _ => false,
        }
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.handlers.lock().contains_key(&kind)
    }
}

impl Drop for EventManager {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);

        if let Some(handle) = self.worker.take() {
            // Dropped from inside a handler: joining ourselves would hang
            if self.worker_id == Some(thread::current().id()) {
                log::warn!("Event manager dropped on its dispatch thread, detaching");
                return;
            }
            let _ = handle.join();
        }
    }
}

fn dispatch_loop(rx: Receiver<Message>, handlers: Arc<Mutex<HandlerTable>>, interval: Duration) {
    log::debug!("Event dispatcher started");
    let mut last_time_event: Option<Instant> = None;

    while let Ok(message) = rx.recv() {
        let event = match message {
            Message::Event(event) => event,
            Message::Shutdown => break,
        };

        if let PlayerEvent::TimeChanged { .. } = event {
            let now = Instant::now();
            if let Some(last) = last_time_event {
                if now.duration_since(last) < interval {
                    continue;
                }
            }
            last_time_event = Some(now);
        }

        // Clone the handler out so it runs without the table locked
        let handler = handlers
            .lock()
            .get(&event.kind())
            .map(|(_, callback)| callback.clone());

        if let Some(callback) = handler {
            callback.on_event(&event);
        }
    }

    log::debug!("Event dispatcher exited");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every event it receives, with the receiving thread
    pub(crate) struct RecordingCallback {
        events: Mutex<Vec<(PlayerEvent, ThreadId)>>,
    }

    impl RecordingCallback {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn events(&self) -> Vec<PlayerEvent> {
            self.events.lock().iter().map(|(e, _)| e.clone()).collect()
        }

        pub(crate) fn threads(&self) -> Vec<ThreadId> {
            self.events.lock().iter().map(|(_, t)| *t).collect()
        }

        /// Poll until `count` events arrived or a second passed
        pub(crate) fn wait_for(&self, count: usize) -> Vec<PlayerEvent> {
            let deadline = Instant::now() + Duration::from_secs(1);
            while self.events.lock().len() < count && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(2));
            }
            self.events()
        }
    }

    impl PlayerCallback for RecordingCallback {
        fn on_event(&self, event: &PlayerEvent) {
            self.events.lock().push((event.clone(), thread::current().id()));
        }
    }

    fn manager() -> EventManager {
        EventManager::new(&PlayerConfig::default()).unwrap()
    }

    #[test]
    fn test_delivery_on_dispatch_thread() {
        let manager = manager();
        let recorder = RecordingCallback::new();
        manager.subscribe(EventKind::EndReached, recorder.clone()).unwrap();

        manager.sink().emit(PlayerEvent::EndReached);

        let events = recorder.wait_for(1);
        assert_eq!(events, vec![PlayerEvent::EndReached]);
        assert_ne!(recorder.threads()[0], thread::current().id());
    }

    #[test]
    fn test_one_handler_per_kind() {
        let manager = manager();
        let first = manager
            .subscribe(EventKind::StateChanged, RecordingCallback::new())
            .unwrap();

        let err = manager
            .subscribe(EventKind::StateChanged, RecordingCallback::new())
            .unwrap_err();
        assert_eq!(err, AudioError::AlreadySubscribed(EventKind::StateChanged));

        // A different kind is independent
        manager
            .subscribe(EventKind::VolumeChanged, RecordingCallback::new())
            .unwrap();

        assert!(manager.unsubscribe(first));
        assert!(!manager.unsubscribe(first));
        manager
            .subscribe(EventKind::StateChanged, RecordingCallback::new())
            .unwrap();
    }

    #[test]
    fn test_stale_token_does_not_remove_new_handler() {
        let manager = manager();
        let old = manager
            .subscribe(EventKind::EndReached, RecordingCallback::new())
            .unwrap();
        assert!(manager.unsubscribe(old));
        manager
            .subscribe(EventKind::EndReached, RecordingCallback::new())
            .unwrap();

        assert!(!manager.unsubscribe(old));
        assert!(manager.is_subscribed(EventKind::EndReached));
    }

    #[test]
    fn test_only_matching_kind_is_delivered() {
        let manager = manager();
        let recorder = RecordingCallback::new();
        manager.subscribe(EventKind::VolumeChanged, recorder.clone()).unwrap();

        let sink = manager.sink();
        sink.emit(PlayerEvent::EndReached);
        sink.emit(PlayerEvent::VolumeChanged { volume: 40 });

        let events = recorder.wait_for(1);
        assert_eq!(events, vec![PlayerEvent::VolumeChanged { volume: 40 }]);
    }

    #[test]
    fn test_time_events_are_throttled() {
        let config = PlayerConfig::default().with_time_event_interval(Duration::from_millis(100));
        let manager = EventManager::new(&config).unwrap();
        let recorder = RecordingCallback::new();
        manager.subscribe(EventKind::TimeChanged, recorder.clone()).unwrap();
        manager.subscribe(EventKind::RateChanged, recorder.clone()).unwrap();

        let sink = manager.sink();
        for i in 0..10 {
            sink.emit(PlayerEvent::TimeChanged { time_ms: i * 10 });
            sink.emit(PlayerEvent::RateChanged { rate: 1.0 });
        }
        drop(manager);

        let events = recorder.events();
        let time_events = events
            .iter()
            .filter(|e| e.kind() == EventKind::TimeChanged)
            .count();
        let rate_events = events
            .iter()
            .filter(|e| e.kind() == EventKind::RateChanged)
            .count();

        assert!(time_events >= 1 && time_events < 10);
        assert_eq!(rate_events, 10);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let manager = Arc::new(manager());
        let token_slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let handler = {
            let manager = Arc::downgrade(&manager);
            let token_slot = token_slot.clone();
            let calls = calls.clone();
            move |_: &PlayerEvent| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let (Some(manager), Some(token)) = (manager.upgrade(), *token_slot.lock()) {
                    manager.unsubscribe(token);
                }
            }
        };

        let token = manager
            .subscribe(EventKind::EndReached, Arc::new(handler))
            .unwrap();
        *token_slot.lock() = Some(token);

        let sink = manager.sink();
        sink.emit(PlayerEvent::EndReached);

        let deadline = Instant::now() + Duration::from_secs(1);
        while manager.is_subscribed(EventKind::EndReached) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!manager.is_subscribed(EventKind::EndReached));

        sink.emit(PlayerEvent::EndReached);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnected_sink_ignores_events() {
        let sink = EventSink::disconnected();
        assert!(!sink.is_connected());
        sink.emit(PlayerEvent::EndReached);
    }
}
