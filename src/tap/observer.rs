//! Observer registry for tap state changes.
//!
//! Listeners are either callbacks registered with [`Observers::subscribe`] or
//! async streams from [`Observers::stream`]. Both see every event in order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::Stream;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// Buffered events per stream before a slow reader starts skipping.
const STREAM_CAPACITY: usize = 64;

/// A state change reported by the tap limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapEvent {
    /// The window count changed (after a tap or a reset)
    CountChanged {
        /// New count
        count: u32,
    },
    /// The count just reached the quota
    LimitReached {
        /// Count at which the limiter became limited
        count: u32,
    },
}

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A subject publishing events of type `E` to any number of listeners.
pub struct Observers<E> {
    callbacks: Mutex<Vec<(SubscriptionId, Callback<E>)>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<E>,
}

impl<E> Observers<E>
where
    E: Clone + Send + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            callbacks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            sender,
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Stream of events published after this call.
    ///
    /// A reader that falls more than 64 events behind skips the oldest ones.
    pub fn stream(&self) -> impl Stream<Item = E> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|event| match event {
            Ok(event) => Some(event),
            Err(lagged) => {
                tracing::debug!("Tap event stream lagging: {}", lagged);
                None
            }
        })
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish an event to every listener.
    pub fn notify(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(event);
        }

        // No receivers is fine.
        let _ = self.sender.send(event.clone());
    }
}

impl<E> Default for Observers<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Observers")
            .field("callbacks", &callbacks)
            .field("streams", &self.sender.receiver_count())
            .finish()
    }
}
