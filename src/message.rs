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

//! The data model shared by every component: [`Message`], [`PipelineMessage`],
//! and the executable-in-flight wrapper built on top of them in
//! [`crate::queue::ExecutableMessage`] (see §3 of SPEC_FULL.md).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Opaque payload with an id and two open-ended key/value maps. Immutable
/// once emitted by a queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub tags: HashMap<String, String>,
    pub args: HashMap<String, String>,
}

impl Message {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: HashMap::new(),
            args: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// A [`Message`] bound to a named pipeline and a declared set of required
/// resource *types*. `missing_resources` narrows as leases are attached;
/// it starts out equal to `required_resources` and reaches empty once
/// every type has a bound instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMessage {
    pub message: Message,
    pub pipeline: String,
    pub required_resources: Vec<String>,
    pub missing_resources: Vec<String>,
}

impl PipelineMessage {
    pub fn new(message: Message, pipeline: impl Into<String>, required_resources: Vec<String>) -> Self {
        let missing_resources = required_resources.clone();
        Self {
            message,
            pipeline: pipeline.into(),
            required_resources,
            missing_resources,
        }
    }

    pub fn has_missing_resources(&self) -> bool {
        !self.missing_resources.is_empty()
    }
}

/// One item of a [`crate::executor::PipelineResult`]'s output list: the
/// logical channel it was emitted on plus the message to forward.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub channel: String,
    pub message: Message,
}

/// Records which resource instance a pipeline actually used for a given
/// required type and how long it should cool down (from the moment the
/// lease is released) before becoming available again.
#[derive(Clone, Debug)]
pub struct ResourceUsed {
    pub resource_type: String,
    pub release_at: Option<std::time::Duration>,
}
