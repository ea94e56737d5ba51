//! # Stream Event Dispatcher
//!
//! Fans every decoded realtime frame out to all registered subscribers.
//!
//! ## Core Design Principles:
//!
//! 1.  **Zero-Copy Fan-out**: each event is wrapped in an `Arc` once; every
//!     subscriber receives a pointer to the same allocation.
//! 2.  **Non-blocking**: subscribers own an unbounded MPSC receiver, so a slow
//!     consumer never stalls the socket read loop.
//! 3.  **Self-cleaning**: a subscriber whose receiver was dropped is removed on
//!     the next broadcast.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::models::stream::StreamEvent;

struct Subscriber {
    id: String,
    sender: mpsc::UnboundedSender<Arc<StreamEvent>>,
}

/// # Core Dispatcher
///
/// Registration, deregistration and broadcast of stream events.
#[derive(Default)]
pub struct Dispatcher {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Subscribe
    ///
    /// Registers a subscriber and returns the receiving half of its channel.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self, id: &str) -> mpsc::UnboundedReceiver<Arc<StreamEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Subscriber { id: id.to_string(), sender: tx });
        log::debug!("Stream subscriber '{}' registered", id);
        rx
    }

    /// Removes a subscriber by id.
    pub fn unsubscribe(&self, id: &str) {
        self.lock().retain(|s| s.id != id);
        log::debug!("Stream subscriber '{}' removed", id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// # Broadcast
    ///
    /// Sends `event` to every subscriber in registration order and prunes the
    /// ones that went away.
    pub fn broadcast(&self, event: StreamEvent) {
        let event = Arc::new(event);
        self.lock().retain(|subscriber| match subscriber.sender.send(Arc::clone(&event)) {
            Ok(()) => true,
            Err(_) => {
                log::debug!("Stream subscriber '{}' went away", subscriber.id);
                false
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
