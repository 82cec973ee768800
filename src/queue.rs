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

//! The [`Queue`] trait (a pluggable, polymorphic producer of
//! [`ExecutableMessage`]s) and the in-flight message wrapper the
//! [`crate::scheduler::Scheduler`] hands to the executor manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::message::PipelineMessage;
use crate::resources::ResourceScope;
use crate::topic::Topic;

/// Reference-counted park state: N callers parking a queue require N
/// unparks before it becomes pollable again (§3: "Parking is idempotent
/// and reference-counted"). Carries a [`Notify`] so the
/// [`crate::scheduler::Scheduler`] can wake promptly on unpark instead of
/// polling `is_parked` on a timer.
#[derive(Default)]
pub struct ParkCounter {
    depth: AtomicUsize,
    notify: Notify,
}

impl ParkCounter {
    pub fn park(&self) {
        self.depth.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the depth after this unpark. Calling unpark more often than
    /// park is a caller bug; we saturate at zero rather than wrap.
    pub fn unpark(&self) -> usize {
        self.depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
                Some(d.saturating_sub(1))
            })
            .unwrap();
        let depth = self.depth.load(Ordering::Acquire);
        self.notify.notify_waiters();
        depth
    }

    pub fn is_parked(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn notify(&self) -> &Notify {
        &self.notify
    }
}

/// A named, polymorphic producer of pipeline messages. Implementations
/// back onto inventories, AMQP queues, polling HTTP sources, etc.; none of
/// those concrete transports are in scope here (§1), only this interface.
#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// The channel → topic routing table declared by this queue's
    /// `QueueItem.output` (§6).
    fn output_routes(&self) -> &HashMap<String, Vec<Arc<dyn Topic>>>;

    /// Yields the next message, suspending until one is available or the
    /// queue is closed (`None`).
    async fn poll(&self) -> Option<PipelineMessage>;

    fn park(&self);

    /// Returns the park depth after this unpark.
    fn unpark(&self) -> usize;

    fn is_parked(&self) -> bool;

    /// Notified whenever this queue's park depth changes, so the scheduler
    /// can wake promptly instead of busy-polling `is_parked`.
    fn park_notify(&self) -> &Notify;

    async fn close(&self);
}

/// A [`PipelineMessage`] in flight through the broker. Owns a
/// back-reference to its source queue (for park/unpark), the queue's
/// output routing table, and the scoped resource acquisition released on
/// drop (§3).
pub struct ExecutableMessage {
    pub pipeline_message: PipelineMessage,
    pub queue: Arc<dyn Queue>,
    pub output_routes: HashMap<String, Vec<Arc<dyn Topic>>>,
    pub resources: ResourceScope,
}

impl ExecutableMessage {
    pub fn new(pipeline_message: PipelineMessage, queue: Arc<dyn Queue>) -> Self {
        let output_routes = queue.output_routes().clone();
        Self {
            pipeline_message,
            queue,
            output_routes,
            resources: ResourceScope::empty(),
        }
    }

    pub fn id(&self) -> &str {
        &self.pipeline_message.message.id
    }

    pub fn park(&self) {
        self.queue.park();
    }

    pub fn unpark(&self) {
        self.queue.unpark();
    }
}
