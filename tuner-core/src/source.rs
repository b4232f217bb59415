//! # Audio Source Abstraction
//!
//! The estimator never opens a device itself. It subscribes to something
//! that pushes sample buffers and reports a sample rate; this module defines
//! that seam plus two building blocks for implementing it:
//!
//! - [`Broadcaster`], a listener registry that a source publishes through
//! - [`ManualSource`], an in-memory source fed by explicit `push` calls

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::TunerError;

/// Handle returned by [`AudioSource::subscribe`], used to detach again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Listener invoked with every buffer a source produces.
///
/// An error tells the source the buffer could not be processed; the source
/// decides whether to report it to whoever produced the buffer or log it.
pub type BufferCallback = Arc<dyn Fn(&[f32]) -> Result<(), TunerError> + Send + Sync>;

/// A push-style producer of fixed-size sample buffers.
pub trait AudioSource: Send + Sync {
    /// Samples per second of every buffer this source produces.
    fn sample_rate(&self) -> u32;

    /// Registers a listener for future buffers.
    fn subscribe(&self, callback: BufferCallback) -> SubscriptionId;

    /// Removes a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Registry of buffer listeners.
#[derive(Default)]
pub struct Broadcaster {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, BufferCallback)>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: BufferCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, callback));
        id
    }

    /// Returns `true` if the listener was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers a buffer to every listener in subscription order.
    ///
    /// Listeners run without the registry lock held, so they may subscribe
    /// or unsubscribe. Every listener sees the buffer; the first error is
    /// returned.
    pub fn publish(&self, samples: &[f32]) -> Result<(), TunerError> {
        let snapshot: Vec<BufferCallback> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        let mut first_error = None;
        for callback in snapshot {
            if let Err(err) = callback(samples) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// A source driven by explicit [`ManualSource::push`] calls.
///
/// Useful for feeding recorded or synthesized audio, and for tests.
pub struct ManualSource {
    sample_rate: u32,
    listeners: Broadcaster,
}

impl ManualSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            listeners: Broadcaster::new(),
        }
    }

    /// Publishes one buffer synchronously to every subscriber.
    pub fn push(&self, samples: &[f32]) -> Result<(), TunerError> {
        self.listeners.publish(samples)
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl AudioSource for ManualSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn subscribe(&self, callback: BufferCallback) -> SubscriptionId {
        self.listeners.subscribe(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.unsubscribe(id);
    }
}
