use hearth_model::Event;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    DroppedOverflow,
    RateLimited,
}

/// Bounded primary work queue plus a same-sized overflow buffer and
/// optional disk spill (§4.2 "Concurrency shape of the pipeline").
/// `submit` is synchronous/non-blocking: a full primary queue is never
/// awaited on.
pub struct WorkQueue {
    sender: mpsc::Sender<Event>,
    overflow: Mutex<VecDeque<Event>>,
    overflow_capacity: usize,
    spill_dir: Option<PathBuf>,
    spill_sequence: AtomicU64,
}

impl WorkQueue {
    pub fn new(capacity: usize, spill_dir: Option<PathBuf>) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Self {
            sender,
            overflow: Mutex::new(VecDeque::new()),
            overflow_capacity: capacity,
            spill_dir,
            spill_sequence: AtomicU64::new(0),
        };
        (queue, receiver)
    }

    /// Never blocks: tries the primary queue, then the overflow buffer,
    /// then (if configured) a disk spill. The public contract's
    /// `dropped_overflow` covers all three — the event may still be
    /// recovered later by the overflow drainer or a startup spill-recovery
    /// pass, but it did not enter the synchronous fast path.
    pub fn try_enqueue(&self, event: Event) -> SubmitOutcome {
        match self.sender.try_send(event) {
            Ok(()) => SubmitOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.stash_overflow(event);
                SubmitOutcome::DroppedOverflow
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SubmitOutcome::DroppedOverflow,
        }
    }

    fn stash_overflow(&self, event: Event) {
        let mut overflow = self.overflow.lock().expect("overflow mutex poisoned");
        if overflow.len() < self.overflow_capacity {
            overflow.push_back(event);
            return;
        }
        drop(overflow);

        if let Some(dir) = &self.spill_dir {
            let sequence = self.spill_sequence.fetch_add(1, Ordering::Relaxed);
            let dir = dir.clone();
            tokio::spawn(async move {
                if let Err(e) = crate::spill::write_spill_file(&dir, sequence, &[event]).await {
                    error!(error = %e, "failed to spill overflow event to disk");
                }
            });
        } else {
            warn!("overflow buffer full and no spill directory configured, dropping event");
        }
    }

    /// Moves as many overflow events as will fit back onto the primary
    /// queue. Intended to run periodically from a background task.
    pub fn drain_overflow(&self) {
        loop {
            let event = {
                let mut overflow = self.overflow.lock().expect("overflow mutex poisoned");
                overflow.pop_front()
            };
            match event {
                Some(event) => {
                    if self.sender.try_send(event).is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow.lock().expect("overflow mutex poisoned").len()
    }

    /// Reads and deletes any spill files left from a previous run,
    /// re-enqueuing their events (§6 "recovery on startup").
    pub async fn recover_spilled(&self) -> std::io::Result<usize> {
        let Some(dir) = self.spill_dir.clone() else {
            return Ok(0);
        };
        let recovered = crate::spill::recover_spill_dir(&dir).await?;
        let count = recovered.len();
        for event in recovered {
            self.stash_overflow(event);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_model::Event;

    fn event(id: &str) -> Event {
        Event::new("light", id.to_string(), "state_changed", 0)
    }

    #[test]
    fn submits_fill_primary_queue_first() {
        let (queue, mut rx) = WorkQueue::new(2, None);
        assert_eq!(queue.try_enqueue(event("a")), SubmitOutcome::Queued);
        assert_eq!(queue.try_enqueue(event("b")), SubmitOutcome::Queued);
        assert_eq!(queue.try_enqueue(event("c")), SubmitOutcome::DroppedOverflow);
        assert_eq!(queue.overflow_len(), 1);

        assert_eq!(rx.try_recv().unwrap().entity_id, "a");
    }

    #[test]
    fn overflow_also_fills_before_dropping_without_spill() {
        let (queue, _rx) = WorkQueue::new(1, None);
        queue.try_enqueue(event("a"));
        queue.try_enqueue(event("b"));
        queue.try_enqueue(event("c"));
        assert_eq!(queue.overflow_len(), 1);
    }

    #[tokio::test]
    async fn drain_overflow_moves_events_back_onto_the_primary_queue() {
        let (queue, mut rx) = WorkQueue::new(1, None);
        queue.try_enqueue(event("a"));
        queue.try_enqueue(event("b"));
        assert_eq!(queue.overflow_len(), 1);

        rx.recv().await.unwrap();
        queue.drain_overflow();
        assert_eq!(queue.overflow_len(), 0);
        assert_eq!(rx.recv().await.unwrap().entity_id, "b");
    }
}
