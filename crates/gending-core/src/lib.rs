//! Shared primitives for the gending synthesizer and sequencer.
//!
//! - [`BinaryReader`]: bounds-checked cursor used by the sound-bank parser
//! - [`EventBus`] / [`EventPublisher`]: typed notifications from the render side to the UI
//! - [`lockfree`]: atomics for status readback without locks

pub mod bus;
pub mod error;
pub mod lockfree;
pub mod reader;

pub use bus::{EventBus, EventPublisher, Notification, NotificationKind, SubscriptionId};
pub use error::{Error, Result};
pub use lockfree::{AtomicDouble, AtomicFlag};
pub use reader::BinaryReader;
