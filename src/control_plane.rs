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

//! The control-plane sync RPC (§6): `POST {base_url}/api/lock` with
//! `{worker_id}`, returning the worker's authoritative assignment.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::resources::Resource;

/// A queue assignment as handed back by `/api/lock`. `input` and each
/// topic spec under `output` are deliberately opaque JSON: concrete queue
/// sources and topic transports are external collaborators (§1), resolved
/// locally through [`crate::registry::QueueRegistry`] /
/// [`crate::registry::TopicRegistry`] by a `kind` discriminator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueItemSpec {
    pub name: String,
    pub input: serde_json::Value,
    pub pipeline: PipelineSpec,
    #[serde(default)]
    pub output: HashMap<String, Vec<serde_json::Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default)]
    pub required_resources: Vec<String>,
}

/// A named background job assignment. Not part of the original `/api/lock`
/// wire shape (which only ever returned `items`/`resources`) but carried
/// here as a forward-compatible, optional field — §3's WorkSync names
/// tasks as one of the three diffed sets, so the sync protocol accepts
/// them if a control plane sends them, defaulting to empty otherwise.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A resource instance as handed back by `/api/lock`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Default cooldown in seconds, applied when an executor doesn't
    /// report a more specific `release_at` (§6 "optional `default_delay`").
    #[serde(default, rename = "default_delay")]
    pub default_delay_secs: Option<f64>,
}

impl ResourceSpec {
    pub fn into_resource(self) -> Resource {
        Resource {
            name: self.name,
            resource_type: self.resource_type,
            data: self.data,
            default_delay: self.default_delay_secs.map(Duration::from_secs_f64),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AssignmentResponse {
    pub items: Vec<QueueItemSpec>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
    pub resources: Vec<ResourceSpec>,
}

#[derive(Serialize)]
struct LockRequest<'a> {
    worker_id: &'a str,
}

/// The control-plane sync client (§6). Out of scope: the HTTP API's
/// internals, the persistence store behind it — only the request/response
/// shapes are this crate's concern.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    async fn lock(&self, worker_id: &str) -> Result<AssignmentResponse, SyncError>;
}

/// `reqwest`-backed default implementation.
pub struct HttpControlPlaneClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpControlPlaneClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ControlPlaneClient for HttpControlPlaneClient {
    async fn lock(&self, worker_id: &str) -> Result<AssignmentResponse, SyncError> {
        let url = format!("{}/api/lock", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&LockRequest { worker_id })
            .send()
            .await
            .map_err(|err| SyncError::Transient(err.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|err| SyncError::Transient(err.to_string()))?;

        response
            .json::<AssignmentResponse>()
            .await
            .map_err(|err| SyncError::Transient(err.to_string()))
    }
}
