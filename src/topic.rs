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

//! The pluggable downstream-publish seam (§6 "Topic interface"). Concrete
//! topic transports (AMQP, HTTP, in-memory) are out of scope (§1); only the
//! `publish` contract the [`crate::executor_manager::ExecutorManager`]'s
//! output fan-out drives is defined here.

use async_trait::async_trait;

use crate::message::Message;

/// A downstream publish target. `publish` returns `true` if the message was
/// accepted, `false` if declined — the caller is expected to retry with
/// `wait = true` (or drop the message) on a decline (§4.5).
#[async_trait]
pub trait Topic: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, message: Message, wait: bool) -> bool;
}
