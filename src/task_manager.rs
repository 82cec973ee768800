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

//! Supervision of named, long-lived background tasks (§4.6): periodic
//! jobs and inventory refreshers assigned by the control plane through
//! [`crate::work_manager::WorkManager`]'s `tasks` diff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A named long-lived background job. `run` must return once `cancel` is
/// triggered; there is no automatic restart on crash (§4.6) — a dropped
/// assignment is re-added by the next successful sync if the control
/// plane still lists it.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, cancel: CancellationToken);
}

struct Managed {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Holds the set of currently-assigned tasks and join-bounds their
/// shutdown.
pub struct TaskManager {
    tasks: Mutex<HashMap<String, Managed>>,
    join_timeout: Duration,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl TaskManager {
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            join_timeout,
        }
    }

    /// Starts `task`, replacing (and cancelling) any prior task under the
    /// same name.
    pub async fn add(&self, task: Arc<dyn Task>) {
        let name = task.name().to_string();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            task.run(task_cancel).await;
            info!(task = %task_name, "task exited");
        });

        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.insert(name, Managed { cancel, handle }) {
            previous.cancel.cancel();
            previous.handle.abort();
        }
    }

    /// Cancels the named task and awaits its completion.
    pub async fn remove(&self, name: &str) {
        let managed = self.tasks.lock().await.remove(name);
        if let Some(managed) = managed {
            managed.cancel.cancel();
            if tokio::time::timeout(self.join_timeout, managed.handle)
                .await
                .is_err()
            {
                warn!(task = name, "task did not shut down within timeout");
            }
        }
    }

    pub async fn is_active(&self, name: &str) -> bool {
        self.tasks.lock().await.contains_key(name)
    }

    /// Suspends until `cancel` fires. Tasks themselves start running as
    /// soon as they're `add`ed rather than waiting on this loop; it exists
    /// so the broker can hold the task manager alongside the queue and
    /// sync loops in the same `select!` (§4.1).
    pub async fn run(&self, cancel: CancellationToken) {
        cancel.cancelled().await;
    }

    /// Cancels every task and joins them all, each bounded by
    /// `join_timeout`.
    pub async fn close(&self) {
        let mut tasks = self.tasks.lock().await;
        for managed in tasks.values() {
            managed.cancel.cancel();
        }
        for (name, managed) in tasks.drain() {
            if tokio::time::timeout(self.join_timeout, managed.handle)
                .await
                .is_err()
            {
                warn!(task = %name, "task did not shut down within timeout during close");
            }
        }
    }
}
