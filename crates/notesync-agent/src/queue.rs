//! Ordered save-attempt queue.
//!
//! The transport must never see two concurrent saves from the same client:
//! only the attempt at the head of the queue may proceed, and the others
//! park until it completes. Waiters are woken through a [`Notify`] rather
//! than polled.

use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// One-at-a-time queue of save-attempt tickets.
#[derive(Debug, Default)]
pub struct SaveQueue {
    tickets: Mutex<VecDeque<Uuid>>,
    head_changed: Notify,
}

impl SaveQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a ticket and wait until it reaches the head.
    pub async fn acquire(&self, ticket: Uuid) {
        {
            let mut tickets = self.tickets.lock().await;
            if !tickets.contains(&ticket) {
                tickets.push_back(ticket);
            }
        }

        loop {
            // Register for the wakeup before checking, so a release that
            // lands between the check and the await is not lost.
            let notified = self.head_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.tickets.lock().await.front() == Some(&ticket) {
                return;
            }
            notified.await;
        }
    }

    /// Remove a ticket (completed or abandoned) and wake the next waiter.
    pub async fn release(&self, ticket: Uuid) {
        let mut tickets = self.tickets.lock().await;
        tickets.retain(|t| *t != ticket);
        drop(tickets);
        self.head_changed.notify_waiters();
    }

    /// Number of queued tickets, including the active head.
    #[allow(dead_code)]
    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }

    /// Whether no ticket is queued.
    #[allow(dead_code)]
    pub async fn is_empty(&self) -> bool {
        self.tickets.lock().await.is_empty()
    }
}
