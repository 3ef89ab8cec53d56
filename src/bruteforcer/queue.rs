use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, Mutex, Notify};

/// A bounded FIFO of path segments for one target.
///
/// The queue is filled once and closed, so `dequeue` only waits on other
/// workers holding the receiver. `outstanding` counts items that were queued
/// but not yet marked done; `join` waits for it to reach zero.
pub struct TargetWorkQueue {
    rx: Mutex<mpsc::Receiver<String>>,
    outstanding: AtomicUsize,
    drained: Notify,
}

impl TargetWorkQueue {
    pub fn preload(segments: &[String]) -> Self {
        let (tx, rx) = mpsc::channel::<String>(segments.len().max(1));
        let mut queued = 0usize;
        for segment in segments {
            // capacity matches the wordlist, so this never hits a full channel
            if tx.try_send(segment.clone()).is_ok() {
                queued += 1;
            }
        }
        drop(tx);

        Self {
            rx: Mutex::new(rx),
            outstanding: AtomicUsize::new(queued),
            drained: Notify::new(),
        }
    }

    /// Next segment, or `None` once the queue is drained.
    pub async fn dequeue(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }

    pub fn mark_done(&self) {
        let previous = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.drained.notify_waiters();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Waits until every queued segment has been marked done.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Closes the queue and marks whatever is still waiting in it as done.
    /// Returns how many segments were dropped without being probed.
    pub async fn abandon(&self) -> usize {
        let mut rx = self.rx.lock().await;
        rx.close();
        let mut dropped = 0usize;
        while rx.try_recv().is_ok() {
            dropped += 1;
            self.mark_done();
        }
        dropped
    }
}
