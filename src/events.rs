//! Multicast event emitters
//!
//! Each component exposes its change streams as `EventEmitter`s: subscribers
//! get an independent crossbeam receiver, and closing the emitter on teardown
//! drops every sender so receivers observe disconnection instead of hanging.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// A multicast event channel with explicit teardown
///
/// Emitting clones the event into every live subscriber channel. Subscribers
/// that dropped their receiver are pruned on the next emit.
pub struct EventEmitter<T> {
    senders: Vec<Sender<T>>,
    closed: bool,
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            senders: Vec::new(),
            closed: false,
        }
    }

    /// Subscribe to this emitter
    ///
    /// After `close()` the returned receiver is already disconnected.
    pub fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        if !self.closed {
            self.senders.push(tx);
        }
        rx
    }

    /// Number of live subscribers
    #[allow(dead_code)]
    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }

    /// Whether the emitter has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the emitter, disconnecting all subscribers
    pub fn close(&mut self) {
        self.senders.clear();
        self.closed = true;
    }
}

impl<T: Clone> EventEmitter<T> {
    /// Send an event to every live subscriber
    pub fn emit(&mut self, event: T) {
        if self.closed {
            return;
        }
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let mut emitter = EventEmitter::new();
        let rx1 = emitter.subscribe();
        let rx2 = emitter.subscribe();

        emitter.emit(7u32);

        assert_eq!(rx1.try_recv(), Ok(7));
        assert_eq!(rx2.try_recv(), Ok(7));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut emitter = EventEmitter::new();
        let rx1 = emitter.subscribe();
        let rx2 = emitter.subscribe();
        drop(rx2);

        emitter.emit(1u32);
        assert_eq!(emitter.subscriber_count(), 1);
        assert_eq!(rx1.try_recv(), Ok(1));
    }

    #[test]
    fn test_close_disconnects_receivers() {
        let mut emitter = EventEmitter::new();
        let rx = emitter.subscribe();

        emitter.close();
        assert!(emitter.is_closed());
        assert!(rx.try_recv().is_err());

        // Subscribing after close yields a dead receiver
        let mut emitter = emitter;
        let rx2 = emitter.subscribe();
        emitter.emit(3u32);
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_emit_after_close_is_noop() {
        let mut emitter = EventEmitter::new();
        let _rx = emitter.subscribe();
        emitter.close();
        emitter.emit(9u32);
        assert_eq!(emitter.subscriber_count(), 0);
    }
}
