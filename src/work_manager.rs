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

//! Periodic reconciliation against the control plane (§4.2). Each tick
//! diffs the returned assignment against the locally tracked set (keyed by
//! name) and applies the three-way add/drop split: drops before adds for
//! queues and tasks (to free up name collisions), adds before drops for
//! resources (so in-flight work can rebind before an instance disappears).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::control_plane::{ControlPlaneClient, QueueItemSpec, TaskSpec};
use crate::error::SafeDisplay;
use crate::registry::{QueueRegistry, TaskRegistry};
use crate::resources::ResourcesManager;
use crate::scheduler::Scheduler;
use crate::task_manager::TaskManager;

fn spec_kind(value: &serde_json::Value) -> &str {
    value.get("kind").and_then(|v| v.as_str()).unwrap_or("default")
}

struct Known {
    queues: HashSet<String>,
    tasks: HashSet<String>,
    resources: HashSet<String>,
}

/// Owns the previously-applied working set and drives one sync per tick.
pub struct WorkManager {
    worker_id: String,
    control_plane: Arc<dyn ControlPlaneClient>,
    scheduler: Arc<Scheduler>,
    resources: ResourcesManager,
    task_manager: Arc<TaskManager>,
    queue_registry: Arc<QueueRegistry>,
    task_registry: Arc<TaskRegistry>,
    sync_interval: Duration,
    known: tokio::sync::Mutex<Known>,
}

impl WorkManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: String,
        control_plane: Arc<dyn ControlPlaneClient>,
        scheduler: Arc<Scheduler>,
        resources: ResourcesManager,
        task_manager: Arc<TaskManager>,
        queue_registry: Arc<QueueRegistry>,
        task_registry: Arc<TaskRegistry>,
        sync_interval: Duration,
    ) -> Self {
        Self {
            worker_id,
            control_plane,
            scheduler,
            resources,
            task_manager,
            queue_registry,
            task_registry,
            sync_interval,
            known: tokio::sync::Mutex::new(Known {
                queues: HashSet::new(),
                tasks: HashSet::new(),
                resources: HashSet::new(),
            }),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn build_queue(&self, spec: &QueueItemSpec) -> anyhow::Result<Arc<dyn crate::queue::Queue>> {
        let kind = spec_kind(&spec.input);
        let factory = self
            .queue_registry
            .get(kind)
            .ok_or_else(|| anyhow::anyhow!("no queue factory registered for kind '{kind}'"))?;
        factory(spec)
    }

    fn build_task(&self, spec: &TaskSpec) -> anyhow::Result<Arc<dyn crate::task_manager::Task>> {
        let factory = self
            .task_registry
            .get(&spec.kind)
            .ok_or_else(|| anyhow::anyhow!("no task factory registered for kind '{}'", spec.kind))?;
        factory(spec)
    }

    /// Performs one sync cycle. Failures are the caller's to log and
    /// retry; the previously-applied working set is left untouched.
    pub async fn sync_once(&self) -> Result<(), crate::error::SyncError> {
        let assignment = self.control_plane.lock(&self.worker_id).await?;

        let mut known = self.known.lock().await;

        // --- Queues: drop before add. ---
        let desired_queue_names: HashSet<String> =
            assignment.items.iter().map(|item| item.name.clone()).collect();
        let queues_to_drop: Vec<String> = known
            .queues
            .iter()
            .filter(|name| !desired_queue_names.contains(*name))
            .cloned()
            .collect();
        let mut queues_to_add = Vec::new();
        for item in &assignment.items {
            if known.queues.contains(&item.name) {
                continue;
            }
            match self.build_queue(item) {
                Ok(queue) => queues_to_add.push(queue),
                Err(err) => warn!(queue = %item.name, error = %err, "failed to build queue; skipping"),
            }
        }
        let added_queue_names: Vec<String> = queues_to_add.iter().map(|q| q.name().to_string()).collect();
        self.scheduler.apply_batch(&queues_to_drop, queues_to_add);
        for name in &queues_to_drop {
            known.queues.remove(name);
        }
        known.queues.extend(added_queue_names);

        // --- Tasks: drop before add. ---
        let desired_task_names: HashSet<String> =
            assignment.tasks.iter().map(|t| t.name.clone()).collect();
        let tasks_to_drop: Vec<String> = known
            .tasks
            .iter()
            .filter(|name| !desired_task_names.contains(*name))
            .cloned()
            .collect();
        for name in &tasks_to_drop {
            self.task_manager.remove(name).await;
            known.tasks.remove(name);
        }
        for spec in &assignment.tasks {
            if known.tasks.contains(&spec.name) {
                continue;
            }
            match self.build_task(spec) {
                Ok(task) => {
                    self.task_manager.add(task).await;
                    known.tasks.insert(spec.name.clone());
                }
                Err(err) => warn!(task = %spec.name, error = %err, "failed to build task; skipping"),
            }
        }

        // --- Resources: add before drop. ---
        let desired_resource_names: HashSet<String> =
            assignment.resources.iter().map(|r| r.name.clone()).collect();
        for spec in assignment.resources {
            if known.resources.contains(&spec.name) {
                continue;
            }
            let name = spec.name.clone();
            self.resources.add(spec.into_resource());
            known.resources.insert(name);
        }
        let resources_to_drop: Vec<String> = known
            .resources
            .iter()
            .filter(|name| !desired_resource_names.contains(*name))
            .cloned()
            .collect();
        for name in &resources_to_drop {
            self.resources.remove(name);
            known.resources.remove(name);
        }

        info!(
            queues = known.queues.len(),
            tasks = known.tasks.len(),
            resources = known.resources.len(),
            "sync applied"
        );

        Ok(())
    }

    /// Runs the periodic sync loop until `cancel` fires. Sync failures are
    /// logged and retried on the next tick; the previous working set
    /// remains active (§4.2).
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.sync_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.sync_once().await {
                        warn!(error = %err.to_safe_string(), "worker sync failed; will retry next tick");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}
