// Copyright 2026 Saturn Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fair round-robin scheduling over a dynamic set of [`Queue`]s (§4.3).
//!
//! The cursor walks the queue list in insertion order; a non-parked queue
//! ready to yield is emitted and the cursor advances past it. Two queues
//! ready in the same revolution are served in cursor order. When every
//! queue is parked or not ready, `next` suspends until an unpark or a
//! topology change (`add`/`remove`) makes progress possible again.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::select_all;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::queue::{ExecutableMessage, Queue};

struct QueueEntry {
    queue: Arc<dyn Queue>,
    /// Set by `remove`; the queue stays in the list (so `close` can still
    /// await it) but is never polled again.
    removed: AtomicBool,
}

/// Owns the ordered, dynamic queue set and produces the single lazy
/// sequence of [`ExecutableMessage`]s that feeds the executor manager.
pub struct Scheduler {
    entries: Mutex<Vec<Arc<QueueEntry>>>,
    cursor: AtomicUsize,
    /// Notified on `add`/`remove` so a suspended `next()` can re-evaluate
    /// the active set instead of waiting on a now-stale snapshot.
    topology_changed: Notify,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            topology_changed: Notify::new(),
        }
    }

    /// Inserts at the tail (§4.3: "insertion during iteration is observable
    /// no later than the next full revolution").
    pub fn add(&self, queue: Arc<dyn Queue>) {
        self.entries.lock().unwrap().push(Arc::new(QueueEntry {
            queue,
            removed: AtomicBool::new(false),
        }));
        self.topology_changed.notify_waiters();
    }

    /// Marks the named queue for removal. It will not be polled again; its
    /// `close()` is awaited later, during [`Scheduler::close`].
    pub fn remove(&self, name: &str) {
        let entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter().find(|e| e.queue.name() == name) {
            entry.removed.store(true, Ordering::Release);
        }
        drop(entries);
        self.topology_changed.notify_waiters();
    }

    /// Applies a set of drops and adds as one critical section, so a
    /// concurrent `next()` never observes a state where one of this
    /// batch's drops has taken effect but one of its adds hasn't, or vice
    /// versa (§8 "sync atomicity").
    pub fn apply_batch(&self, drop_names: &[String], add_queues: Vec<Arc<dyn Queue>>) {
        let mut entries = self.entries.lock().unwrap();
        for name in drop_names {
            if let Some(entry) = entries.iter().find(|e| e.queue.name() == name) {
                entry.removed.store(true, Ordering::Release);
            }
        }
        for queue in add_queues {
            entries.push(Arc::new(QueueEntry {
                queue,
                removed: AtomicBool::new(false),
            }));
        }
        drop(entries);
        self.topology_changed.notify_waiters();
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.queue.name() == name && !e.removed.load(Ordering::Acquire))
    }

    /// Snapshot of entries eligible for polling right now, ordered starting
    /// at the cursor.
    fn ordered_candidates(&self) -> Vec<(usize, Arc<QueueEntry>)> {
        let entries = self.entries.lock().unwrap();
        let n = entries.len();
        if n == 0 {
            return Vec::new();
        }
        let start = self.cursor.load(Ordering::Acquire) % n;
        (0..n)
            .map(|i| (start + i) % n)
            .filter(|&idx| {
                let e = &entries[idx];
                !e.removed.load(Ordering::Acquire) && !e.queue.is_parked()
            })
            .map(|idx| (idx, entries[idx].clone()))
            .collect()
    }

    fn all_entries(&self) -> Vec<Arc<QueueEntry>> {
        self.entries.lock().unwrap().clone()
    }

    /// Suspends until a change might make progress possible: an unpark on
    /// any known queue, a topology change, or cancellation.
    async fn wait_for_progress(&self, entries: &[Arc<QueueEntry>], cancel: &CancellationToken) {
        let mut wakers: Vec<Pin<Box<dyn Future<Output = ()> + Send + '_>>> = entries
            .iter()
            .map(|e| Box::pin(e.queue.park_notify().notified()) as Pin<Box<dyn Future<Output = ()> + Send>>)
            .collect();
        wakers.push(Box::pin(self.topology_changed.notified()));

        tokio::select! {
            _ = select_all(wakers) => {}
            _ = cancel.cancelled() => {}
        }
    }

    /// Produces the next message in fair round-robin order, or `None` if
    /// cancelled.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<ExecutableMessage> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let candidates = self.ordered_candidates();
            if candidates.is_empty() {
                let entries = self.all_entries();
                if entries.is_empty() {
                    tokio::select! {
                        _ = self.topology_changed.notified() => continue,
                        _ = cancel.cancelled() => return None,
                    }
                }
                self.wait_for_progress(&entries, cancel).await;
                continue;
            }

            let polls: Vec<_> = candidates
                .iter()
                .map(|(_, e)| Box::pin(e.queue.poll()) as Pin<Box<dyn Future<Output = Option<_>> + Send + '_>>)
                .collect();

            tokio::select! {
                (result, won, _rest) = select_all(polls) => {
                    let (idx, entry) = &candidates[won];
                    let n = self.entries.lock().unwrap().len().max(1);
                    self.cursor.store((idx + 1) % n, Ordering::Release);
                    match result {
                        Some(message) => {
                            return Some(ExecutableMessage::new(message, entry.queue.clone()));
                        }
                        None => continue,
                    }
                }
                _ = self.topology_changed.notified() => continue,
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Cancels all outstanding polls (by virtue of dropping this future's
    /// internals) and closes every queue ever added, including ones
    /// already marked for removal.
    pub async fn close(&self) {
        let entries = self.all_entries();
        for entry in entries {
            entry.queue.close().await;
        }
    }
}
