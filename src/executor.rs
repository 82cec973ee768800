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

//! The pluggable pipeline-execution seam (§6 "Executor interface"). Concrete
//! pipeline function execution is explicitly out of scope (§1); this crate
//! only defines the trait the [`crate::executor_manager::ExecutorManager`]
//! drives.

use async_trait::async_trait;

use crate::message::{PipelineMessage, PipelineOutput, ResourceUsed};

/// What `process_message` produced: zero or more outputs to fan out to
/// downstream topics, plus updated cooldown info for each resource it used.
#[derive(Clone, Debug, Default)]
pub struct PipelineResult {
    pub outputs: Vec<PipelineOutput>,
    pub resources_used: Vec<ResourceUsed>,
}

/// A pluggable pipeline runner. Implementations may shell out to a process,
/// call into a remote cluster, or run in-process; the broker treats
/// `process_message` as an awaitable black box (§5).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn process_message(&self, message: PipelineMessage) -> anyhow::Result<PipelineResult>;

    async fn close(&self);
}
