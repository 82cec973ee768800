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

//! Named-resource mutual exclusion with leases and FIFO waiters (§4.4).
//!
//! The index is `type -> Vec<Resource>` plus the set of currently-held
//! resource names — the two invariants called out in §3. Acquisition is
//! all-or-nothing: `acquire_many` either ends up holding one instance of
//! every requested type, or holds none.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::ResourceError;

/// A named instance of a resource type. `data` is opaque, pluggable
/// payload (credentials, connection info) the executor may need.
#[derive(Clone, Debug)]
pub struct Resource {
    pub name: String,
    pub resource_type: String,
    pub data: Option<serde_json::Value>,
    /// Cooldown applied the first time this instance is released, if the
    /// control plane supplied a `default_delay` (§6) and the executor
    /// never reports a more specific one via `resources_used`.
    pub default_delay: Option<Duration>,
}

impl Resource {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            data: None,
            default_delay: None,
        }
    }
}

struct Inner {
    by_type: HashMap<String, Vec<Resource>>,
    held: HashSet<String>,
    withheld_until: HashMap<String, Instant>,
    waiting: HashMap<String, VecDeque<u64>>,
}

impl Inner {
    fn reclaim_expired(&mut self, now: Instant) {
        self.withheld_until.retain(|_, until| *until > now);
    }
}

/// Named-resource manager. Cheap to clone — internally `Arc`-shared.
#[derive(Clone)]
pub struct ResourcesManager {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    next_ticket: Arc<AtomicU64>,
}

impl Default for ResourcesManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourcesManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                by_type: HashMap::new(),
                held: HashSet::new(),
                withheld_until: HashMap::new(),
                waiting: HashMap::new(),
            })),
            notify: Arc::new(Notify::new()),
            next_ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, resource: Resource) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .by_type
            .entry(resource.resource_type.clone())
            .or_default()
            .push(resource);
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Removes a resource from the pool. If it is currently held, the live
    /// lease is not revoked (§4.4); it simply will not be reissued once
    /// released.
    pub fn remove(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        for resources in inner.by_type.values_mut() {
            resources.retain(|r| r.name != name);
        }
    }

    pub fn held_count(&self, name: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        usize::from(inner.held.contains(name))
    }

    /// Acquires one instance of every type in `types`, atomically.
    ///
    /// `wait = false`: returns `Err(ResourceError::Unavailable)` immediately
    /// if any type cannot be satisfied right now; holds nothing on error.
    ///
    /// `wait = true`: suspends until every type can be held simultaneously,
    /// honoring first-come-first-served order per type (§8 "FIFO waiters").
    /// Acquisition sorts the requested types by name before evaluating them,
    /// per §4.4's deadlock-avoidance note.
    pub async fn acquire_many(
        &self,
        types: &[String],
        wait: bool,
        cancel: &CancellationToken,
    ) -> Result<ResourceScope, ResourceError> {
        if types.is_empty() {
            return Ok(ResourceScope::empty_with_manager(self.clone()));
        }

        let mut sorted_types: Vec<String> = types.to_vec();
        sorted_types.sort();

        if !wait {
            let mut inner = self.inner.lock().unwrap();
            inner.reclaim_expired(Instant::now());
            return match Self::try_commit(&mut inner, &sorted_types) {
                Some(picks) => Ok(self.scope_from_picks(picks)),
                None => Err(ResourceError::Unavailable(sorted_types.join(","))),
            };
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        {
            let mut inner = self.inner.lock().unwrap();
            for t in &sorted_types {
                inner.waiting.entry(t.clone()).or_default().push_back(ticket);
            }
        }

        let result = loop {
            {
                let mut inner = self.inner.lock().unwrap();
                inner.reclaim_expired(Instant::now());
                let is_front = sorted_types
                    .iter()
                    .all(|t| inner.waiting.get(t).and_then(|q| q.front()) == Some(&ticket));
                if is_front {
                    if let Some(picks) = Self::try_commit(&mut inner, &sorted_types) {
                        for t in &sorted_types {
                            if let Some(q) = inner.waiting.get_mut(t) {
                                q.pop_front();
                            }
                        }
                        break Ok(self.scope_from_picks(picks));
                    }
                }
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => {
                    let mut inner = self.inner.lock().unwrap();
                    for t in &sorted_types {
                        if let Some(q) = inner.waiting.get_mut(t) {
                            q.retain(|&ticketed| ticketed != ticket);
                        }
                    }
                    break Err(ResourceError::Cancelled);
                }
            }
        };

        result
    }

    /// Tries to satisfy every type in one atomic pass; commits (marks
    /// held) only if all types succeed, otherwise leaves `inner` untouched.
    fn try_commit(inner: &mut Inner, sorted_types: &[String]) -> Option<Vec<Resource>> {
        let mut picks: Vec<Resource> = Vec::with_capacity(sorted_types.len());
        let mut picked_names: HashSet<String> = HashSet::new();
        for t in sorted_types {
            let held = &inner.held;
            let withheld = &inner.withheld_until;
            let pick = inner
                .by_type
                .get(t)?
                .iter()
                .find(|r| {
                    !held.contains(&r.name)
                        && !withheld.contains_key(&r.name)
                        && !picked_names.contains(&r.name)
                })?
                .clone();
            picked_names.insert(pick.name.clone());
            picks.push(pick);
        }
        for pick in &picks {
            inner.held.insert(pick.name.clone());
        }
        Some(picks)
    }

    fn scope_from_picks(&self, picks: Vec<Resource>) -> ResourceScope {
        ResourceScope {
            manager: Some(self.clone()),
            leases: picks
                .into_iter()
                .map(|r| ResourceLease {
                    resource_type: r.resource_type.clone(),
                    name: r.name,
                    release_at: r.default_delay,
                })
                .collect(),
        }
    }

    fn release(&self, name: &str, release_at: Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        inner.held.remove(name);
        match release_at {
            Some(delay) if delay > Duration::ZERO => {
                let until = Instant::now() + delay;
                inner.withheld_until.insert(name.to_string(), until);
                drop(inner);
                let manager = self.clone();
                let name = name.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut inner = manager.inner.lock().unwrap();
                    if inner.withheld_until.get(&name) == Some(&until) {
                        inner.withheld_until.remove(&name);
                    }
                    drop(inner);
                    manager.notify.notify_waiters();
                });
            }
            _ => {
                drop(inner);
                self.notify.notify_waiters();
            }
        }
    }
}

/// A held resource instance, valid for the lifetime of its [`ResourceScope`].
#[derive(Clone, Debug)]
pub struct ResourceLease {
    pub resource_type: String,
    pub name: String,
    release_at: Option<Duration>,
}

/// RAII guard for an `acquire_many` call. Releases every held lease when
/// dropped — on success, failure, or cancellation of whatever owns it —
/// honoring each lease's `release_at` cooldown (§3, §9 "scoped
/// acquisition").
pub struct ResourceScope {
    manager: Option<ResourcesManager>,
    leases: Vec<ResourceLease>,
}

impl ResourceScope {
    pub fn empty() -> Self {
        Self {
            manager: None,
            leases: Vec::new(),
        }
    }

    fn empty_with_manager(manager: ResourcesManager) -> Self {
        Self {
            manager: Some(manager),
            leases: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    pub fn lease_for(&self, resource_type: &str) -> Option<&ResourceLease> {
        self.leases.iter().find(|l| l.resource_type == resource_type)
    }

    /// Overrides the cooldown applied when a held lease is released,
    /// reflecting `PipelineResult.resources_used` (§6).
    pub fn set_release_at(&mut self, resource_type: &str, release_at: Option<Duration>) {
        if let Some(lease) = self.leases.iter_mut().find(|l| l.resource_type == resource_type) {
            lease.release_at = release_at;
        }
    }

    pub fn merge(&mut self, other: ResourceScope) {
        if self.manager.is_none() {
            self.manager = other.manager;
        }
        self.leases.extend(other.leases);
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        if let Some(manager) = &self.manager {
            for lease in &self.leases {
                manager.release(&lease.name, lease.release_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn all_or_nothing_acquire_fails_cleanly() {
        let manager = ResourcesManager::new();
        manager.add(Resource::new("r1", "typeA"));
        // typeB has no instance at all.
        let types = vec!["typeA".to_string(), "typeB".to_string()];
        let result = manager.acquire_many(&types, false, &cancel()).await;
        assert!(result.is_err());
        assert_eq!(manager.held_count("r1"), 0);
    }

    #[tokio::test]
    async fn exclusive_acquire_then_release_then_reacquire() {
        let manager = ResourcesManager::new();
        manager.add(Resource::new("r1", "typeA"));
        let types = vec!["typeA".to_string()];

        let scope = manager
            .acquire_many(&types, false, &cancel())
            .await
            .unwrap();
        assert_eq!(manager.held_count("r1"), 1);
        assert!(manager
            .acquire_many(&types, false, &cancel())
            .await
            .is_err());

        drop(scope);
        // release is synchronous; should be immediately visible.
        assert_eq!(manager.held_count("r1"), 0);
        assert!(manager
            .acquire_many(&types, false, &cancel())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn waiters_served_fifo_for_single_type() {
        let manager = ResourcesManager::new();
        manager.add(Resource::new("r1", "typeA"));
        let types = vec!["typeA".to_string()];

        let first = manager
            .acquire_many(&types, false, &cancel())
            .await
            .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let manager = manager.clone();
            let types = types.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _scope = manager.acquire_many(&types, true, &cancel()).await.unwrap();
                order.lock().unwrap().push(i);
            }));
        }

        // Let all three waiters register themselves before releasing.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        drop(first);

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn release_at_withholds_until_elapsed() {
        tokio::time::pause();
        let manager = ResourcesManager::new();
        manager.add(Resource::new("r1", "typeA"));
        let types = vec!["typeA".to_string()];

        let mut scope = manager
            .acquire_many(&types, false, &cancel())
            .await
            .unwrap();
        scope.set_release_at("typeA", Some(Duration::from_secs(10)));
        drop(scope);

        assert!(manager
            .acquire_many(&types, false, &cancel())
            .await
            .is_err());

        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert!(manager
            .acquire_many(&types, false, &cancel())
            .await
            .is_ok());
    }
}
