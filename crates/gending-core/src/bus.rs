//! Typed notification bus between the render side and UI subscribers.
//!
//! The render side holds an [`EventPublisher`] and never blocks: a full
//! queue drops the notification and bumps a counter. The control side owns
//! the [`EventBus`], registers callbacks with [`EventBus::subscribe`] and
//! calls [`EventBus::dispatch`] from its own timer or loop.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Notification emitted by the synthesizer or the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    ControllerChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChanged {
        channel: u8,
        program: u8,
        bank: u16,
    },
    /// `None` means every channel was reset (system reset).
    AllControllersReset {
        channel: Option<u8>,
    },
    StopAll,
    SongChanged {
        index: usize,
        name: Arc<str>,
    },
    TimeChanged {
        current: f64,
        duration: f64,
    },
    /// Text-like meta event, payload passed through uninterpreted.
    TextMetaEvent {
        tick: u64,
        kind: u8,
        data: Arc<[u8]>,
    },
    SongEnded {
        index: usize,
    },
}

/// Discriminant of [`Notification`], used as a subscription filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    NoteOn,
    NoteOff,
    ControllerChange,
    ProgramChanged,
    AllControllersReset,
    StopAll,
    SongChanged,
    TimeChanged,
    TextMetaEvent,
    SongEnded,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::NoteOn { .. } => NotificationKind::NoteOn,
            Self::NoteOff { .. } => NotificationKind::NoteOff,
            Self::ControllerChange { .. } => NotificationKind::ControllerChange,
            Self::ProgramChanged { .. } => NotificationKind::ProgramChanged,
            Self::AllControllersReset { .. } => NotificationKind::AllControllersReset,
            Self::StopAll => NotificationKind::StopAll,
            Self::SongChanged { .. } => NotificationKind::SongChanged,
            Self::TimeChanged { .. } => NotificationKind::TimeChanged,
            Self::TextMetaEvent { .. } => NotificationKind::TextMetaEvent,
            Self::SongEnded { .. } => NotificationKind::SongEnded,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&Notification) + Send>;

struct Subscriber {
    id: SubscriptionId,
    filter: Option<NotificationKind>,
    callback: Callback,
}

/// Sending half of the bus. Cheap to clone, never blocks.
#[derive(Clone)]
pub struct EventPublisher {
    tx: Option<Sender<Notification>>,
    dropped: Arc<AtomicU64>,
}

impl EventPublisher {
    /// Publisher with no bus attached; every notification is discarded.
    pub fn detached() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    pub fn publish(&self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn is_attached(&self) -> bool {
        self.tx.is_some()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::detached()
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("attached", &self.tx.is_some())
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

/// Receiving half of the bus plus the subscriber registry.
pub struct EventBus {
    tx: Sender<Notification>,
    rx: Receiver<Notification>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            tx: Some(self.tx.clone()),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Register `callback` for one kind of notification, or for all of them
    /// when `filter` is `None`.
    ///
    /// Callbacks run inside [`dispatch`](Self::dispatch) and must not
    /// subscribe or unsubscribe from within the callback.
    pub fn subscribe<F>(&self, filter: Option<NotificationKind>, callback: F) -> SubscriptionId
    where
        F: FnMut(&Notification) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber {
            id,
            filter,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver every queued notification to matching subscribers, in
    /// publish order. Returns the number of notifications drained.
    pub fn dispatch(&self) -> usize {
        let mut subs = self.subscribers.lock();
        let mut count = 0;
        while let Ok(notification) = self.rx.try_recv() {
            count += 1;
            let kind = notification.kind();
            for sub in subs.iter_mut() {
                if sub.filter.map_or(true, |k| k == kind) {
                    (sub.callback)(&notification);
                }
            }
        }
        count
    }

    /// Drain queued notifications without invoking subscribers.
    pub fn drain(&self) -> Vec<Notification> {
        self.rx.try_iter().collect()
    }

    /// Notifications lost because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("queued", &self.rx.len())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_subscription() {
        let bus = EventBus::new(16);
        let notes = Arc::new(Mutex::new(Vec::new()));
        let all = Arc::new(AtomicU64::new(0));

        let n = Arc::clone(&notes);
        bus.subscribe(Some(NotificationKind::NoteOn), move |ev| {
            if let Notification::NoteOn { note, .. } = ev {
                n.lock().push(*note);
            }
        });
        let a = Arc::clone(&all);
        bus.subscribe(None, move |_| {
            a.fetch_add(1, Ordering::Relaxed);
        });

        let publisher = bus.publisher();
        publisher.publish(Notification::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        });
        publisher.publish(Notification::NoteOff {
            channel: 0,
            note: 60,
        });
        publisher.publish(Notification::NoteOn {
            channel: 1,
            note: 64,
            velocity: 90,
        });

        assert_eq!(bus.dispatch(), 3);
        assert_eq!(*notes.lock(), vec![60, 64]);
        assert_eq!(all.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new(4);
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let id = bus.subscribe(None, move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.publisher().publish(Notification::StopAll);
        bus.dispatch();
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let bus = EventBus::new(2);
        let publisher = bus.publisher();
        for _ in 0..5 {
            publisher.publish(Notification::StopAll);
        }
        assert_eq!(bus.dropped_count(), 3);
        assert_eq!(bus.drain().len(), 2);
    }

    #[test]
    fn test_detached_publisher_is_noop() {
        let publisher = EventPublisher::detached();
        assert!(!publisher.is_attached());
        publisher.publish(Notification::StopAll);
    }
}
