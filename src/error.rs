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

//! Error kinds per the broker's error-handling design: transient-remote,
//! resource-unavailable, pipeline failure, hook failure, and fatal.
//! Only `BrokerError::Fatal` is allowed to escape the three top-level
//! loops; everything else is recovered and logged at its component
//! boundary.

use std::fmt::Write;

/// Redacted, human-readable rendering used in logs and config dumps, kept
/// distinct from `Display`/`Debug` so secrets never leak through a stray
/// `{:?}`.
pub trait SafeDisplay {
    fn to_safe_string(&self) -> String;

    fn to_safe_string_indented(&self) -> String {
        let mut result = String::new();
        for line in self.to_safe_string().lines() {
            let _ = writeln!(&mut result, "  {line}");
        }
        result
    }
}

/// Raised only from `ResourcesManager::acquire_many(wait=false)`; the
/// fast path treats this as a signal to fall back to the slow path, not
/// as an error to propagate.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource type unavailable: {0}")]
    Unavailable(String),
    #[error("resource acquisition cancelled")]
    Cancelled,
}

/// A downstream topic declined or failed a publish.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("topic declined message (wait=false)")]
    Declined,
    #[error("topic publish failed: {0}")]
    Transient(String),
}

/// Control-plane sync RPC failed; the caller retries on the next tick and
/// keeps the previous working set active.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("control plane request failed: {0}")]
    Transient(String),
}

/// An observer registered with the `ServicesManager` failed; reported via
/// the `hook_failed` channel and never propagated to the hook site caller.
#[derive(Debug, thiserror::Error)]
#[error("hook {hook} failed: {source}")]
pub struct HookError {
    pub hook: &'static str,
    #[source]
    pub source: anyhow::Error,
}

/// Top-level error type. Only [`BrokerError::Fatal`] is returned from
/// [`crate::broker::Broker::run`]; every other broker-internal failure is
/// recovered at its component boundary before it could ever become one of
/// these.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("fatal broker error: {0}")]
    Fatal(#[from] anyhow::Error),
}

impl SafeDisplay for ResourceError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

impl SafeDisplay for SyncError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

impl SafeDisplay for PublishError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}
