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

//! String-keyed factory registries (§9 "Dynamic class loading ... becomes
//! a registry keyed by string name populated at startup"). Concrete
//! queue/topic/executor/task implementations are pluggable collaborators
//! (§1); this crate only owns the lookup table from a name the control
//! plane hands back to a constructor for one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::control_plane::{QueueItemSpec, TaskSpec};
use crate::executor::Executor;
use crate::queue::Queue;
use crate::task_manager::Task;
use crate::topic::Topic;

/// Builds a [`Queue`] from its control-plane-supplied spec.
pub type QueueFactory = Arc<dyn Fn(&QueueItemSpec) -> anyhow::Result<Arc<dyn Queue>> + Send + Sync>;
/// Builds a [`Topic`] from its output routing spec (an opaque JSON shape —
/// concrete topic transports are out of scope, §1).
pub type TopicFactory = Arc<dyn Fn(&serde_json::Value) -> anyhow::Result<Arc<dyn Topic>> + Send + Sync>;
/// Builds the single configured [`Executor`] for this worker.
pub type ExecutorFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Executor>> + Send + Sync>;
/// Builds a [`Task`] from its control-plane-supplied spec.
pub type TaskFactory = Arc<dyn Fn(&TaskSpec) -> anyhow::Result<Arc<dyn Task>> + Send + Sync>;

/// A plain string-keyed lookup table of factories, populated once at
/// startup and then read-only for the lifetime of the broker.
pub struct Registry<F> {
    entries: HashMap<String, F>,
}

impl<F> Default for Registry<F> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<F: Clone> Registry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: F) {
        self.entries.insert(kind.into(), factory);
    }

    pub fn get(&self, kind: &str) -> Option<F> {
        self.entries.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }
}

pub type QueueRegistry = Registry<QueueFactory>;
pub type TopicRegistry = Registry<TopicFactory>;
pub type ExecutorRegistry = Registry<ExecutorFactory>;
pub type TaskRegistry = Registry<TaskFactory>;
