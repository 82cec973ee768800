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

//! In-memory reference implementations of the pluggable traits, used by
//! this crate's own tests and exported behind `test-util` so downstream
//! crates can exercise a [`crate::broker::Broker`] without standing up
//! real queue/topic/executor backends (§10.4 of SPEC_FULL.md).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::executor::{Executor, PipelineResult};
use crate::message::{Message, PipelineMessage};
use crate::queue::ParkCounter;
use crate::queue::Queue;
use crate::topic::Topic;

/// A [`Queue`] backed by a plain in-memory deque. `push` can be called at
/// any time, including concurrently with `poll`.
pub struct VecQueue {
    name: String,
    items: Mutex<VecDeque<PipelineMessage>>,
    arrived: Notify,
    park: ParkCounter,
    closed: AtomicBool,
    output_routes: HashMap<String, Vec<Arc<dyn Topic>>>,
}

impl VecQueue {
    pub fn new(name: impl Into<String>, items: Vec<PipelineMessage>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(items.into()),
            arrived: Notify::new(),
            park: ParkCounter::default(),
            closed: AtomicBool::new(false),
            output_routes: HashMap::new(),
        }
    }

    pub fn with_output_routes(mut self, routes: HashMap<String, Vec<Arc<dyn Topic>>>) -> Self {
        self.output_routes = routes;
        self
    }

    pub async fn push(&self, message: PipelineMessage) {
        self.items.lock().await.push_back(message);
        self.arrived.notify_waiters();
    }
}

#[async_trait]
impl Queue for VecQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_routes(&self) -> &HashMap<String, Vec<Arc<dyn Topic>>> {
        &self.output_routes
    }

    async fn poll(&self) -> Option<PipelineMessage> {
        loop {
            if let Some(message) = self.items.lock().await.pop_front() {
                return Some(message);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.arrived.notified().await;
        }
    }

    fn park(&self) {
        self.park.park();
    }

    fn unpark(&self) -> usize {
        self.park.unpark()
    }

    fn is_parked(&self) -> bool {
        self.park.is_parked()
    }

    fn park_notify(&self) -> &Notify {
        self.park.notify()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.arrived.notify_waiters();
    }
}

/// A [`Topic`] that records every publish call and can be configured to
/// decline the first `N` non-waiting publishes before accepting.
pub struct RecordingTopic {
    name: String,
    published: std::sync::Mutex<Vec<(Message, bool)>>,
    declines_remaining: AtomicUsize,
}

impl RecordingTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self::declining(name, 0)
    }

    pub fn declining(name: impl Into<String>, declines: usize) -> Self {
        Self {
            name: name.into(),
            published: std::sync::Mutex::new(Vec::new()),
            declines_remaining: AtomicUsize::new(declines),
        }
    }

    pub fn published(&self) -> Vec<(Message, bool)> {
        self.published.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl Topic for RecordingTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: Message, wait: bool) -> bool {
        self.published.lock().unwrap().push((message, wait));
        if wait {
            return true;
        }
        self.declines_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                if remaining > 0 {
                    Some(remaining - 1)
                } else {
                    None
                }
            })
            .is_err()
    }
}

/// An [`Executor`] that sleeps for a fixed delay before returning an empty
/// result. Useful for saturating the pool deterministically under
/// `tokio::time::pause`.
pub struct SlowExecutor {
    delay: Duration,
}

impl SlowExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Executor for SlowExecutor {
    async fn process_message(&self, _message: PipelineMessage) -> anyhow::Result<PipelineResult> {
        tokio::time::sleep(self.delay).await;
        Ok(PipelineResult::default())
    }

    async fn close(&self) {}
}

/// An [`Executor`] whose `process_message` never resolves. Used to test
/// backpressure: with a pool of size C, at most C+1 messages are ever
/// drawn from the scheduler (§8 "Backpressure").
pub struct NeverReadyExecutor;

#[async_trait]
impl Executor for NeverReadyExecutor {
    async fn process_message(&self, _message: PipelineMessage) -> anyhow::Result<PipelineResult> {
        std::future::pending::<()>().await;
        unreachable!("NeverReadyExecutor never completes")
    }

    async fn close(&self) {}
}

/// Records the id of every message it processes and always succeeds with
/// an empty result.
#[derive(Default)]
pub struct RecordingExecutor {
    processed: std::sync::Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn processed(&self) -> Vec<String> {
        self.processed.lock().unwrap().clone()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.lock().unwrap().len()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn process_message(&self, message: PipelineMessage) -> anyhow::Result<PipelineResult> {
        self.processed.lock().unwrap().push(message.message.id.clone());
        Ok(PipelineResult::default())
    }

    async fn close(&self) {}
}

/// Succeeds every time and always returns the same fixed set of outputs,
/// for testing output fan-out independent of pipeline logic.
pub struct FixedOutputExecutor {
    outputs: Vec<crate::message::PipelineOutput>,
}

impl FixedOutputExecutor {
    pub fn new(outputs: Vec<crate::message::PipelineOutput>) -> Self {
        Self { outputs }
    }
}

#[async_trait]
impl Executor for FixedOutputExecutor {
    async fn process_message(&self, _message: PipelineMessage) -> anyhow::Result<PipelineResult> {
        Ok(PipelineResult {
            outputs: self.outputs.clone(),
            resources_used: Vec::new(),
        })
    }

    async fn close(&self) {}
}

/// Fails for a configured set of message ids and records (and succeeds
/// for) everything else, for testing that one pipeline failure doesn't
/// stop the others from proceeding (§8 scenario 5).
#[derive(Default)]
pub struct FlakyExecutor {
    fail_ids: std::collections::HashSet<String>,
    processed: std::sync::Mutex<Vec<String>>,
}

impl FlakyExecutor {
    pub fn new(fail_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            fail_ids: fail_ids.into_iter().collect(),
            processed: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn processed(&self) -> Vec<String> {
        self.processed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for FlakyExecutor {
    async fn process_message(&self, message: PipelineMessage) -> anyhow::Result<PipelineResult> {
        if self.fail_ids.contains(&message.message.id) {
            return Err(anyhow::anyhow!("injected failure for {}", message.message.id));
        }
        self.processed.lock().unwrap().push(message.message.id.clone());
        Ok(PipelineResult::default())
    }

    async fn close(&self) {}
}
