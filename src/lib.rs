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

//! The worker broker: polls assigned queues, dispatches pipeline work to a
//! bounded executor pool, and forwards outputs to downstream topics while
//! periodically reconciling its working set with the control plane.

pub mod broker;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod executor;
pub mod executor_manager;
pub mod message;
pub mod queue;
pub mod registry;
pub mod resources;
pub mod scheduler;
pub mod services;
pub mod task_manager;
pub mod topic;
pub mod tracing_setup;
pub mod work_manager;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use broker::Broker;
pub use error::{BrokerError, SafeDisplay};
