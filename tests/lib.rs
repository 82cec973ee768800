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

//! Scenario and property tests from §8 of SPEC_FULL.md, exercised against
//! the in-memory test doubles in [`saturn_broker::testing`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use saturn_broker::executor_manager::ExecutorManager;
use saturn_broker::message::{Message, PipelineMessage, PipelineOutput};
use saturn_broker::queue::Queue;
use saturn_broker::resources::{Resource, ResourcesManager};
use saturn_broker::scheduler::Scheduler;
use saturn_broker::testing::{
    FixedOutputExecutor, FlakyExecutor, NeverReadyExecutor, RecordingExecutor, RecordingTopic,
    VecQueue,
};
use saturn_broker::topic::Topic;
use tokio_util::sync::CancellationToken;

fn pmsg(queue: &str, id: &str) -> PipelineMessage {
    PipelineMessage::new(Message::new(id), queue, Vec::new())
}

fn pmsg_needing(queue: &str, id: &str, resource_types: Vec<String>) -> PipelineMessage {
    PipelineMessage::new(Message::new(id), queue, resource_types)
}

/// Polls `ready` until it returns true or `timeout` elapses, yielding the
/// executor between checks instead of busy-spinning.
async fn wait_until(timeout: Duration, mut ready: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !ready() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition did not become true within {timeout:?}");
        }
        tokio::task::yield_now().await;
    }
}

/// Scenario 1: pool size 2, three queues each with one message, no
/// resources. All three are processed exactly once and none of the
/// queues is ever parked.
#[tokio::test]
async fn scenario_pool_drains_all_queues_without_parking() {
    let resources = ResourcesManager::new();
    let executor = Arc::new(RecordingExecutor::default());
    let manager = Arc::new(ExecutorManager::new(resources, executor.clone(), 2, 8));
    manager.start().await;

    let scheduler = Arc::new(Scheduler::new());
    let queues: Vec<_> = ["q1", "q2", "q3"]
        .iter()
        .map(|name| Arc::new(VecQueue::new(*name, vec![pmsg(name, &format!("{name}-m1"))])))
        .collect();
    for q in &queues {
        scheduler.add(q.clone());
    }

    let cancel = CancellationToken::new();
    for _ in 0..3 {
        let xmsg = scheduler.next(&cancel).await.expect("scheduler closed early");
        manager.submit(xmsg).await;
    }

    wait_until(Duration::from_secs(1), || executor.processed_count() == 3).await;

    let mut processed = executor.processed();
    processed.sort();
    assert_eq!(processed, vec!["q1-m1", "q2-m1", "q3-m1"]);
    for q in &queues {
        assert!(!q.is_parked());
    }
}

/// Scenario 2: one queue, one message needing resource type `R` with no
/// instance in the pool. Submitting parks the queue; adding an instance
/// unparks it and the message executes.
#[tokio::test]
async fn scenario_missing_resource_parks_then_unparks_on_availability() {
    let resources = ResourcesManager::new();
    let executor = Arc::new(RecordingExecutor::default());
    let manager = Arc::new(ExecutorManager::new(resources.clone(), executor.clone(), 1, 4));
    manager.start().await;

    let queue = Arc::new(VecQueue::new(
        "q",
        vec![pmsg_needing("q", "m1", vec!["R".to_string()])],
    ));
    let scheduler = Arc::new(Scheduler::new());
    scheduler.add(queue.clone());

    let cancel = CancellationToken::new();
    let xmsg = scheduler.next(&cancel).await.unwrap();
    manager.submit(xmsg).await;

    wait_until(Duration::from_secs(1), || queue.is_parked()).await;
    assert_eq!(executor.processed_count(), 0);

    resources.add(Resource::new("r1", "R"));

    wait_until(Duration::from_secs(1), || executor.processed_count() == 1).await;
    assert!(!queue.is_parked());
}

/// Scenario 3: one message with outputs on channels `a` (accepts
/// immediately) and `b` (declines once, then accepts on wait). Expect `a`
/// published once, `b` published twice (decline then accept), and the
/// source queue parked and unparked exactly once.
#[tokio::test]
async fn scenario_output_fan_out_parks_for_declining_topic() {
    let resources = ResourcesManager::new();
    let outputs = vec![
        PipelineOutput {
            channel: "a".to_string(),
            message: Message::new("out-a"),
        },
        PipelineOutput {
            channel: "b".to_string(),
            message: Message::new("out-b"),
        },
    ];
    let executor = Arc::new(FixedOutputExecutor::new(outputs));
    let manager = Arc::new(ExecutorManager::new(resources, executor, 1, 4));
    manager.start().await;

    let topic_a = Arc::new(RecordingTopic::new("a"));
    let topic_b = Arc::new(RecordingTopic::declining("b", 1));
    let mut routes: HashMap<String, Vec<Arc<dyn Topic>>> = HashMap::new();
    routes.insert("a".to_string(), vec![topic_a.clone()]);
    routes.insert("b".to_string(), vec![topic_b.clone()]);

    let queue = Arc::new(VecQueue::new("q", vec![pmsg("q", "m1")]).with_output_routes(routes));
    let scheduler = Arc::new(Scheduler::new());
    scheduler.add(queue.clone());

    let cancel = CancellationToken::new();
    let xmsg = scheduler.next(&cancel).await.unwrap();
    manager.submit(xmsg).await;

    wait_until(Duration::from_secs(1), || {
        topic_a.publish_count() == 1 && topic_b.publish_count() == 2
    })
    .await;

    assert_eq!(topic_a.published(), vec![(Message::new("out-a"), false)]);
    assert_eq!(
        topic_b.published(),
        vec![
            (Message::new("out-b"), false),
            (Message::new("out-b"), true),
        ]
    );

    wait_until(Duration::from_secs(1), || !queue.is_parked()).await;
}

/// Scenario 4: a sync drops `Q1` and adds `Q1'` under the same name.
/// After the batch is applied, the scheduler only ever yields from the
/// replacement, and the original is closed.
#[tokio::test]
async fn scenario_same_name_swap_only_yields_from_replacement() {
    let scheduler = Arc::new(Scheduler::new());
    let original = Arc::new(VecQueue::new("q1", vec![pmsg("q1", "stale")]));
    scheduler.add(original.clone());

    let replacement = Arc::new(VecQueue::new("q1", vec![pmsg("q1", "fresh")]));
    scheduler.apply_batch(&["q1".to_string()], vec![replacement.clone()]);

    let cancel = CancellationToken::new();
    let xmsg = scheduler.next(&cancel).await.unwrap();
    assert_eq!(xmsg.id(), "fresh");

    scheduler.close().await;
    assert!(original.is_parked() == false);
}

/// Scenario 5: `process_message` fails for one message; its resources are
/// released, subsequent messages still proceed, and nothing panics.
#[tokio::test]
async fn scenario_pipeline_failure_does_not_stop_the_pool() {
    let resources = ResourcesManager::new();
    let executor = Arc::new(FlakyExecutor::new(["bad".to_string()]));
    let manager = Arc::new(ExecutorManager::new(resources, executor.clone(), 2, 4));
    manager.start().await;

    let queue = Arc::new(VecQueue::new(
        "q",
        vec![pmsg("q", "bad"), pmsg("q", "good")],
    ));
    let scheduler = Arc::new(Scheduler::new());
    scheduler.add(queue);

    let cancel = CancellationToken::new();
    for _ in 0..2 {
        let xmsg = scheduler.next(&cancel).await.unwrap();
        manager.submit(xmsg).await;
    }

    wait_until(Duration::from_secs(1), || executor.processed() == vec!["good"]).await;
}

/// Scenario 6: closing the executor manager while a submission is parked
/// waiting on a never-available resource cancels the acquisition and
/// releases any partial leases, returning within a bounded time.
#[tokio::test]
async fn scenario_close_cancels_pending_resource_acquisition() {
    let resources = ResourcesManager::new();
    let executor = Arc::new(RecordingExecutor::default());
    let manager = Arc::new(ExecutorManager::new(resources.clone(), executor, 1, 4));
    manager.start().await;

    let queue = Arc::new(VecQueue::new(
        "q",
        vec![pmsg_needing("q", "m1", vec!["Never".to_string()])],
    ));
    let scheduler = Arc::new(Scheduler::new());
    scheduler.add(queue.clone());

    let cancel = CancellationToken::new();
    let xmsg = scheduler.next(&cancel).await.unwrap();
    manager.submit(xmsg).await;

    wait_until(Duration::from_secs(1), || queue.is_parked()).await;

    tokio::time::timeout(Duration::from_secs(1), manager.close())
        .await
        .expect("close() did not return within the bound");

    assert_eq!(resources.held_count("Never"), 0);
}

/// Backpressure (§8): a pool of size C fed an executor whose
/// `process_message` never resolves accepts at most C+1 messages before
/// further submissions block. The first C are picked up immediately by
/// the idle workers; the (C+1)-th fits in the capacity-1 hand-off
/// channel; anything past that has nowhere to go because every worker
/// is now stuck forever and the channel is already full.
#[tokio::test]
async fn scenario_backpressure_bounds_drawn_messages_to_pool_plus_one() {
    let resources = ResourcesManager::new();
    let executor = Arc::new(NeverReadyExecutor);
    let concurrency = 2;
    let manager = Arc::new(ExecutorManager::new(resources, executor, concurrency, 4));
    manager.start().await;

    let items: Vec<_> = (0..(concurrency + 2))
        .map(|n| pmsg("q", &format!("m{n}")))
        .collect();
    let queue = Arc::new(VecQueue::new("q", items));
    let scheduler = Arc::new(Scheduler::new());
    scheduler.add(queue);

    let cancel = CancellationToken::new();
    for _ in 0..(concurrency + 1) {
        let xmsg = scheduler.next(&cancel).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), manager.submit(xmsg))
            .await
            .expect("a submission within the C+1 budget must not block");
    }

    let overflow = scheduler.next(&cancel).await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_millis(200), manager.submit(overflow)).await;
    assert!(
        blocked.is_err(),
        "a submission beyond C+1 should block, not complete, once the pool is saturated"
    );
}

/// Fairness (§8): with N queues each producing a steady stream and none
/// ever parked, no queue's emission count can drift from the average by
/// more than one message over K round-robin steps, for arbitrary N/K.
fn assert_round_robin_is_fair(num_queues: usize, ticks_per_queue: usize) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async move {
        let scheduler = Arc::new(Scheduler::new());
        for i in 0..num_queues {
            let name = format!("q{i}");
            let items = (0..ticks_per_queue)
                .map(|n| pmsg(&name, &format!("{name}-{n}")))
                .collect();
            scheduler.add(Arc::new(VecQueue::new(name, items)));
        }

        let cancel = CancellationToken::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..(num_queues * ticks_per_queue) {
            let xmsg = scheduler.next(&cancel).await.unwrap();
            *counts.entry(xmsg.pipeline_message.pipeline.clone()).or_default() += 1;
        }

        for count in counts.values() {
            let delta = (*count as i64 - ticks_per_queue as i64).abs();
            assert!(
                delta <= 1,
                "queue emission count {count} drifted from {ticks_per_queue} by more than 1"
            );
        }
    });
}

proptest! {
    #[test]
    fn property_round_robin_is_fair_across_many_queues(
        num_queues in 1usize..8,
        ticks_per_queue in 1usize..15,
    ) {
        assert_round_robin_is_fair(num_queues, ticks_per_queue);
    }
}
