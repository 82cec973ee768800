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

//! Observer hooks around the broker's five hook points (§9): polled,
//! scheduled, submitted, executed, published. Hooks are observational —
//! a failing hook is reported on `hook_failed` and never aborts the
//! caller (§7 kind 4).

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::error::HookError;
use crate::message::{Message, PipelineMessage};

/// One of the five points a [`ServicesManager`] invokes hooks at. Kept as
/// a plain enum (not a generic event bus) since the hook set is closed —
/// new hook points are a code change, not a plugin concern.
#[derive(Clone, Debug)]
pub enum HookEvent {
    Polled { queue: String },
    Scheduled { queue: String },
    Submitted { xmsg: String },
    Executed { xmsg: String },
    Published { channel: String, message: Message },
}

/// A single observer. Implementations should be fast and non-blocking;
/// they run synchronously at the hook site.
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, event: &HookEvent) -> Result<(), HookError>;
}

/// Owns the hook list and the `hook_failed` broadcast. `close()` is a
/// no-op hook for symmetry with the other components the [`crate::broker::Broker`]
/// closes in reverse dependency order.
pub struct ServicesManager {
    hooks: Vec<Arc<dyn Hook>>,
    hook_failed: broadcast::Sender<String>,
}

impl Default for ServicesManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServicesManager {
    pub fn new() -> Self {
        let (hook_failed, _) = broadcast::channel(64);
        Self {
            hooks: Vec::new(),
            hook_failed,
        }
    }

    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// A receiver for hook failures; mainly useful in tests that want to
    /// assert a hook failed without it disturbing the call site.
    pub fn subscribe_hook_failed(&self) -> broadcast::Receiver<String> {
        self.hook_failed.subscribe()
    }

    pub fn notify(&self, event: HookEvent) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_event(&event) {
                warn!(hook = hook.name(), error = %err, "hook failed");
                let _ = self.hook_failed.send(format!("{}: {err}", hook.name()));
            }
        }
    }

    pub async fn close(&self) {}
}

/// Convenience constructor used by hook call sites that only have the
/// pieces of a [`PipelineMessage`] on hand.
pub fn submitted_event(pmsg: &PipelineMessage) -> HookEvent {
    HookEvent::Submitted {
        xmsg: pmsg.message.id.clone(),
    }
}
