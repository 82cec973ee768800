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

//! The broker's top-level lifecycle (§4.1): owns the other five
//! components, runs the queue loop, the sync loop, and the task manager
//! concurrently, and tears everything down in reverse dependency order.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::BrokerConfig;
use crate::control_plane::ControlPlaneClient;
use crate::error::BrokerError;
use crate::executor::Executor;
use crate::executor_manager::ExecutorManager;
use crate::registry::{QueueRegistry, TaskRegistry};
use crate::resources::ResourcesManager;
use crate::scheduler::Scheduler;
use crate::services::{HookEvent, ServicesManager};
use crate::task_manager::TaskManager;
use crate::work_manager::WorkManager;

/// Owns and wires together every subsystem. Components are constructed in
/// the order later ones depend on earlier ones: services, work manager,
/// resources manager, task manager, scheduler, executor manager.
pub struct Broker {
    services: Arc<ServicesManager>,
    work_manager: Arc<WorkManager>,
    task_manager: Arc<TaskManager>,
    scheduler: Arc<Scheduler>,
    executor_manager: Arc<ExecutorManager>,
    cancel: CancellationToken,
}

impl Broker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &BrokerConfig,
        control_plane: Arc<dyn ControlPlaneClient>,
        executor: Arc<dyn Executor>,
        queue_registry: Arc<QueueRegistry>,
        task_registry: Arc<TaskRegistry>,
        services: ServicesManager,
    ) -> Self {
        let services = Arc::new(services);
        let resources = ResourcesManager::new();
        let task_manager = Arc::new(TaskManager::default());
        let scheduler = Arc::new(Scheduler::new());
        let work_manager = Arc::new(WorkManager::new(
            config.worker_id.clone(),
            control_plane,
            scheduler.clone(),
            resources.clone(),
            task_manager.clone(),
            queue_registry,
            task_registry,
            config.sync_interval,
        ));
        let executor_manager = Arc::new(ExecutorManager::new(
            resources,
            executor,
            config.executor_concurrency,
            config.max_output_tasks,
        ));

        Self {
            services,
            work_manager,
            task_manager,
            scheduler,
            executor_manager,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancels the aggregate task group. Idempotent, safe from any task.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Starts the executor pool, then concurrently drives the queue loop,
    /// the sync loop, and the task manager until `stop()` is called or one
    /// of them fails unrecoverably. Only an uncaught panic in one of the
    /// three escapes as [`BrokerError::Fatal`] (§7 kind 5); everything else
    /// is recovered at its own component boundary.
    pub async fn run(&self) -> Result<(), BrokerError> {
        info!(worker_id = %self.work_manager_worker_id(), "starting worker");
        self.executor_manager.start().await;

        let queue_handle = {
            let scheduler = self.scheduler.clone();
            let executor_manager = self.executor_manager.clone();
            let services = self.services.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                while let Some(xmsg) = scheduler.next(&cancel).await {
                    services.notify(HookEvent::Submitted {
                        xmsg: xmsg.id().to_string(),
                    });
                    executor_manager.submit(xmsg).await;
                }
            })
        };

        let sync_handle = {
            let work_manager = self.work_manager.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move { work_manager.run(cancel).await })
        };

        let task_handle = {
            let task_manager = self.task_manager.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move { task_manager.run(cancel).await })
        };

        // Mirrors `asyncio.gather`: waits for all three to end, which only
        // happens once `stop()` cancels the aggregate task group (or one
        // of them panics).
        let (queue_res, sync_res, task_res) = tokio::join!(queue_handle, sync_handle, task_handle);

        info!("worker shutting down");
        self.close().await;

        for res in [queue_res, sync_res, task_res] {
            if let Err(join_err) = res {
                return Err(BrokerError::Fatal(join_err.into()));
            }
        }
        Ok(())
    }

    /// Closes components in reverse dependency order: Scheduler,
    /// TaskManager, Services, Executor (§4.1).
    async fn close(&self) {
        self.scheduler.close().await;
        self.task_manager.close().await;
        self.services.close().await;
        self.executor_manager.close().await;
    }

    fn work_manager_worker_id(&self) -> &str {
        self.work_manager.worker_id()
    }
}
