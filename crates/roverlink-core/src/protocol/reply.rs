//! Single-write call completion
//!
//! Every engine call gets exactly one terminal outcome, chosen by whichever
//! completion path runs first: direct success, frame delivery, or a watchdog
//! firing. The cell is the guard between them. Losers are not cancelled;
//! completing an already-completed cell is simply a no-op.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// A result cell settable exactly once, shared between the completion paths
/// of one call.
#[derive(Debug)]
pub struct ReplyCell<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for ReplyCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> ReplyCell<T> {
    /// Create a cell and the receiver its terminal outcome arrives on
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver the terminal outcome. Returns `false` if another path already
    /// delivered one; the value is dropped in that case.
    pub fn complete(&self, value: T) -> bool {
        let Ok(mut slot) = self.tx.lock() else {
            return false;
        };
        match slot.take() {
            Some(tx) => {
                // A dropped receiver still counts as completed: the caller
                // abandoned the call, nobody else may reply for it.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Whether a terminal outcome has already been delivered
    pub fn is_complete(&self) -> bool {
        self.tx.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_completion_wins() {
        let (cell, rx) = ReplyCell::new();
        assert!(!cell.is_complete());
        assert!(cell.complete(1));
        assert!(!cell.complete(2));
        assert!(cell.is_complete());
        assert_eq!(rx.await, Ok(1));
    }

    #[tokio::test]
    async fn test_racing_clones_deliver_once() {
        let (cell, rx) = ReplyCell::new();
        let winner = cell.clone();
        let loser = cell.clone();
        assert!(winner.complete("winner"));
        assert!(!loser.complete("loser"));
        assert_eq!(rx.await, Ok("winner"));
    }

    #[test]
    fn test_completion_with_dropped_receiver() {
        let (cell, rx) = ReplyCell::new();
        drop(rx);
        // Still reports completion so racing paths stay quiet.
        assert!(cell.complete(1));
        assert!(!cell.complete(2));
    }
}
