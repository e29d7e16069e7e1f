use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;

use crate::database::Database;

const QUEUE_CAPACITY: usize = 1024;

struct TouchQueue {
    order: VecDeque<i64>,
    pending: HashSet<i64>,
}

struct Inner {
    db: Database,
    queue: Mutex<TouchQueue>,
    notify: Notify,
    capacity: usize,
}

/// Best-effort recorder of `last_used_at`.
///
/// `touch` only enqueues; a background task performs the write, so the
/// admission path never waits on storage. A key id already queued is
/// coalesced into the single pending write. The queue is bounded and drops
/// the oldest pending touch under overload. Write failures are logged and
/// swallowed; an admitted request stays admitted.
#[derive(Clone)]
pub struct UsageRecorder {
    inner: Arc<Inner>,
}

impl UsageRecorder {
    /// Starts the background writer on the current tokio runtime.
    pub fn spawn(db: Database) -> Self {
        let inner = Arc::new(Inner {
            db,
            queue: Mutex::new(TouchQueue {
                order: VecDeque::new(),
                pending: HashSet::new(),
            }),
            notify: Notify::new(),
            capacity: QUEUE_CAPACITY,
        });
        tokio::spawn(run(inner.clone()));
        Self { inner }
    }

    /// Non-blocking; never fails from the caller's point of view.
    pub fn touch(&self, key_id: i64) {
        {
            let mut queue = match self.inner.queue.lock() {
                Ok(queue) => queue,
                Err(_) => return,
            };
            if queue.pending.insert(key_id) {
                if queue.order.len() >= self.inner.capacity {
                    if let Some(dropped) = queue.order.pop_front() {
                        queue.pending.remove(&dropped);
                        tracing::warn!(key_id = dropped, "usage queue full, dropping oldest touch");
                    }
                }
                queue.order.push_back(key_id);
            }
        }
        self.inner.notify.notify_one();
    }

    /// Pending touches not yet written.
    pub fn backlog(&self) -> usize {
        self.inner
            .queue
            .lock()
            .map(|queue| queue.order.len())
            .unwrap_or(0)
    }
}

async fn run(inner: Arc<Inner>) {
    loop {
        inner.notify.notified().await;
        loop {
            let batch: Vec<i64> = {
                let mut queue = match inner.queue.lock() {
                    Ok(queue) => queue,
                    Err(_) => break,
                };
                let batch: Vec<i64> = queue.order.drain(..).collect();
                queue.pending.clear();
                batch
            };
            if batch.is_empty() {
                break;
            }
            let now = Utc::now();
            for key_id in batch {
                if let Err(err) = inner.db.update_last_used(key_id, now) {
                    tracing::warn!(key_id, error = %err, "failed to update last_used_at");
                }
            }
        }
    }
}
