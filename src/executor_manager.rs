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

//! Bounded worker pool, resource gating, and output fan-out (§4.5).
//!
//! `submit` takes a two-path approach: a fast, non-blocking resource check
//! that keeps the common case cheap, and a slow path that parks the
//! source queue and resolves resources in the background. The hand-off
//! channel between the two and the worker pool has capacity one by
//! design — it is the single point where the whole pipeline visibly
//! stalls once the pool is saturated (§4.5).

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::executor::Executor;
use crate::message::PipelineOutput;
use crate::queue::ExecutableMessage;
use crate::resources::ResourcesManager;
use crate::topic::Topic;

/// Bounded pool draining a single capacity-1 hand-off channel (§4.5).
pub struct ExecutorManager {
    resources: ResourcesManager,
    executor: Arc<dyn Executor>,
    handoff_tx: mpsc::Sender<ExecutableMessage>,
    handoff_rx: Arc<AsyncMutex<mpsc::Receiver<ExecutableMessage>>>,
    output_semaphore: Arc<Semaphore>,
    concurrency: usize,
    cancel: CancellationToken,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl ExecutorManager {
    pub fn new(
        resources: ResourcesManager,
        executor: Arc<dyn Executor>,
        concurrency: usize,
        max_output_tasks: usize,
    ) -> Self {
        let (handoff_tx, handoff_rx) = mpsc::channel(1);
        Self {
            resources,
            executor,
            handoff_tx,
            handoff_rx: Arc::new(AsyncMutex::new(handoff_rx)),
            output_semaphore: Arc::new(Semaphore::new(max_output_tasks.max(1))),
            concurrency,
            cancel: CancellationToken::new(),
            workers: AsyncMutex::new(Vec::new()),
        }
    }

    /// Spawns the worker pool. Idempotent only in the sense that calling it
    /// twice doubles the pool; callers (the [`crate::broker::Broker`]) call
    /// it exactly once during startup.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        for _ in 0..self.concurrency {
            let rx = self.handoff_rx.clone();
            let executor = self.executor.clone();
            let output_semaphore = self.output_semaphore.clone();
            let cancel = self.cancel.clone();
            workers.push(tokio::spawn(worker_loop(rx, executor, output_semaphore, cancel)));
        }
    }

    /// Implements the `submit` protocol of §4.5: a fast non-blocking
    /// resource check, falling back to parking the source queue and
    /// resolving resources in the background.
    pub async fn submit(&self, mut xmsg: ExecutableMessage) {
        let types = xmsg.pipeline_message.missing_resources.clone();
        match self.resources.acquire_many(&types, false, &self.cancel).await {
            Ok(scope) => {
                xmsg.resources.merge(scope);
                xmsg.pipeline_message.missing_resources.clear();
                if self.handoff_tx.send(xmsg).await.is_err() {
                    debug!("hand-off channel closed while submitting; pool is shutting down");
                }
            }
            Err(ResourceError::Unavailable(_)) => {
                xmsg.park();
                let resources = self.resources.clone();
                let handoff_tx = self.handoff_tx.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    match resources.acquire_many(&types, true, &cancel).await {
                        Ok(scope) => {
                            xmsg.resources.merge(scope);
                            xmsg.pipeline_message.missing_resources.clear();
                            xmsg.unpark();
                            let _ = handoff_tx.send(xmsg).await;
                        }
                        Err(_) => {
                            // Cancelled while waiting, most likely shutdown.
                            // Dropping xmsg here releases its (still empty)
                            // resource scope and the park.
                            xmsg.unpark();
                        }
                    }
                });
            }
            Err(ResourceError::Cancelled) => {
                xmsg.unpark();
            }
        }
    }

    /// Cancels pending acquisitions and worker tasks, then drains the
    /// hand-off channel, releasing (not executing) whatever is left so
    /// every scope still runs (§4.5).
    pub async fn close(&self) {
        self.cancel.cancel();

        {
            let mut rx = self.handoff_rx.lock().await;
            while let Ok(xmsg) = rx.try_recv() {
                drop(xmsg);
            }
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }

        let mut rx = self.handoff_rx.lock().await;
        while let Ok(xmsg) = rx.try_recv() {
            drop(xmsg);
        }

        self.executor.close().await;
    }
}

async fn worker_loop(
    rx: Arc<AsyncMutex<mpsc::Receiver<ExecutableMessage>>>,
    executor: Arc<dyn Executor>,
    output_semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    loop {
        let xmsg = {
            let mut rx = rx.lock().await;
            tokio::select! {
                item = rx.recv() => item,
                _ = cancel.cancelled() => None,
            }
        };
        let Some(mut xmsg) = xmsg else {
            break;
        };

        let result = executor
            .process_message(xmsg.pipeline_message.clone())
            .await;

        match result {
            Ok(result) => {
                for used in &result.resources_used {
                    xmsg.resources
                        .set_release_at(&used.resource_type, used.release_at);
                }
                let output_semaphore = output_semaphore.clone();
                tokio::spawn(consume_output(xmsg, result.outputs, output_semaphore));
            }
            Err(err) => {
                warn!(xmsg = xmsg.id(), error = %err, "pipeline execution failed; dropping message");
                drop(xmsg);
            }
        }
    }
}

/// Fans an executor's outputs out to their routed topics, honoring each
/// topic's own backpressure (§4.5). Runs as an independent task per xmsg so
/// one slow topic cannot stall the worker pool; bounded by
/// `output_semaphore` so fan-out tasks cannot grow without limit.
async fn consume_output(
    mut xmsg: ExecutableMessage,
    outputs: Vec<PipelineOutput>,
    output_semaphore: Arc<Semaphore>,
) {
    let _permit = match output_semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };

    let mut parked = false;
    for output in outputs {
        let Some(topics) = xmsg.output_routes.get(&output.channel) else {
            continue;
        };
        for topic in topics {
            publish_with_backpressure(topic.as_ref(), &output, &mut xmsg, &mut parked).await;
        }
    }

    if parked {
        xmsg.unpark();
    }
}

async fn publish_with_backpressure(
    topic: &dyn Topic,
    output: &PipelineOutput,
    xmsg: &mut ExecutableMessage,
    parked: &mut bool,
) {
    if topic.publish(output.message.clone(), false).await {
        return;
    }
    if !*parked {
        xmsg.park();
        *parked = true;
    }
    if !topic.publish(output.message.clone(), true).await {
        warn!(topic = topic.name(), "topic declined even after wait=true; dropping output");
    }
}
