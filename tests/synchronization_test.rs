mod common;

use common::{CountingStore, Fixture, fixture, fixture_with, review_process, vars};
use serde_json::json;
use std::sync::Arc;
use taskflow::config::EngineConfig;
use taskflow::dsl::builder::ProcessBuilder;
use taskflow::dsl::{CreationMode, SynchronizationMode};
use taskflow::error::{EngineError, MultiTaskError};
use taskflow::executor::{Actor, Executor, ExecutorDirectory};
use taskflow::runtime::process::ExecutionStatus;
use taskflow::runtime::storage::StateStore;
use taskflow::variables::{Usage, VariableDefinition, VariableFormat};
use uuid::Uuid;

async fn start_review(fx: &Fixture, id: &str, mode: SynchronizationMode) -> Uuid {
    fx.engine.deploy_definition(review_process(id, mode)).expect("Deploy failed");
    fx.engine
        .start_process(id, vars(&[("reviewers", json!(["alice", "bob", "carol"]))]))
        .await
        .expect("Failed to start process")
}

async fn complete_as(fx: &Fixture, process_id: Uuid, actor: &Actor) -> bool {
    let task = fx.task_of(process_id, actor).await;
    fx.engine.complete_task(task.id, actor).await.expect("Completion failed")
}

fn status(fx: &Fixture, process_id: Uuid) -> ExecutionStatus {
    fx.engine.process(process_id).expect("process").status
}

async fn pool_members(fx: &Fixture, process_id: Uuid) -> Vec<String> {
    let tasks = fx.open_tasks(process_id).await;
    match tasks.first().map(|t| &t.executor) {
        Some(Executor::TemporaryGroup(pool)) => fx
            .directory
            .group_members(pool.id)
            .await
            .expect("pool members")
            .into_iter()
            .map(|a| a.name)
            .collect(),
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn test_first_is_satisfied_by_any_completion() {
    for first in ["alice", "bob", "carol"] {
        let fx = fixture();
        let process_id = start_review(&fx, "first", SynchronizationMode::First).await;
        assert_eq!(fx.open_tasks(process_id).await.len(), 3);

        let actor = fx.actor(first);
        assert!(complete_as(&fx, process_id, &actor).await);
        assert_eq!(status(&fx, process_id), ExecutionStatus::Ended);

        // Siblings stay open; completing them no longer affects the token.
        let leftovers = fx.open_tasks(process_id).await;
        assert_eq!(leftovers.len(), 2);
        let other = fx.actor(leftovers[0].executor.name());
        assert!(!complete_as(&fx, process_id, &other).await);
        assert_eq!(fx.open_tasks(process_id).await.len(), 1);
    }
}

#[tokio::test]
async fn test_last_waits_for_every_sibling() {
    let orders = [
        ["alice", "bob", "carol"],
        ["alice", "carol", "bob"],
        ["bob", "alice", "carol"],
        ["bob", "carol", "alice"],
        ["carol", "alice", "bob"],
        ["carol", "bob", "alice"],
    ];

    for order in orders {
        let fx = fixture();
        let process_id = start_review(&fx, "last", SynchronizationMode::Last).await;

        let mut signals = Vec::new();
        for name in order {
            signals.push(complete_as(&fx, process_id, &fx.actor(name)).await);
        }

        assert_eq!(signals, vec![false, false, true], "completion order {:?}", order);
        assert_eq!(status(&fx, process_id), ExecutionStatus::Ended);
        assert!(fx.open_tasks(process_id).await.is_empty());
    }
}

#[tokio::test]
async fn test_consecutive_hands_out_one_task_at_a_time() {
    let fx = fixture();
    let process_id = start_review(&fx, "consecutive", SynchronizationMode::Consecutive).await;

    let mut ordinals = Vec::new();
    let mut pool_sizes = Vec::new();
    for name in ["bob", "carol", "alice"] {
        let tasks = fx.open_tasks(process_id).await;
        assert_eq!(tasks.len(), 1);
        assert!(matches!(tasks[0].executor, Executor::TemporaryGroup(_)));
        ordinals.push(tasks[0].index);
        pool_sizes.push(pool_members(&fx, process_id).await.len());

        let satisfied = complete_as(&fx, process_id, &fx.actor(name)).await;
        assert_eq!(satisfied, name == "alice");
    }

    assert_eq!(ordinals, vec![0, 1, 2]);
    assert_eq!(pool_sizes, vec![3, 2, 1]);
    assert_eq!(fx.directory.deletes(), 1);
    assert!(fx.directory.inner.temporary_groups().is_empty());
    assert!(fx.open_tasks(process_id).await.is_empty());
    assert_eq!(status(&fx, process_id), ExecutionStatus::Ended);
}

#[tokio::test]
async fn test_consecutive_pool_tracks_who_has_completed() {
    let fx = fixture();
    let process_id = start_review(&fx, "pool", SynchronizationMode::Consecutive).await;
    assert_eq!(pool_members(&fx, process_id).await, vec!["alice", "bob", "carol"]);

    complete_as(&fx, process_id, &fx.bob).await;
    assert_eq!(pool_members(&fx, process_id).await, vec!["alice", "carol"]);

    // bob has had a turn already.
    assert!(fx.engine.assigned_tasks(process_id, &fx.bob).await.expect("assigned").is_empty());
    assert_eq!(fx.task_of(process_id, &fx.carol).await.index, 1);
}

#[tokio::test]
async fn test_consecutive_group_name_uses_configured_prefix() {
    let config = EngineConfig { temporary_group_prefix: "Pool".to_string() };
    let fx = fixture_with(|services| services.with_config(config));
    let process_id = start_review(&fx, "prefixed", SynchronizationMode::Consecutive).await;

    let groups = fx.directory.inner.temporary_groups();
    assert_eq!(groups.len(), 1);
    let token_id = fx.engine.process(process_id).expect("process").root_token;
    assert_eq!(groups[0].name, format!("Pool_prefixed_{}", token_id));
}

#[tokio::test]
async fn test_consecutive_delete_failure_is_swallowed() {
    let fx = fixture();
    fx.directory.fail_deletes();
    let process_id = start_review(&fx, "flaky", SynchronizationMode::Consecutive).await;

    assert!(!complete_as(&fx, process_id, &fx.alice).await);
    assert!(!complete_as(&fx, process_id, &fx.bob).await);
    assert!(complete_as(&fx, process_id, &fx.carol).await);

    assert_eq!(fx.directory.deletes(), 1);
    assert_eq!(status(&fx, process_id), ExecutionStatus::Ended);
}

#[tokio::test]
async fn test_consecutive_rejects_actor_outside_pool() {
    let fx = fixture();
    let process_id = start_review(&fx, "outsider", SynchronizationMode::Consecutive).await;
    let task = fx.open_tasks(process_id).await.remove(0);

    let err = fx
        .engine
        .complete_task(task.id, &fx.dave)
        .await
        .expect_err("Outsider completion should fail");
    assert!(matches!(
        err.downcast_ref::<MultiTaskError>(),
        Some(MultiTaskError::ExecutorNotInPool { .. })
    ));

    // Nothing changed: same task, same pool.
    let tasks = fx.open_tasks(process_id).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
    assert_eq!(pool_members(&fx, process_id).await.len(), 3);
}

#[tokio::test]
async fn test_consecutive_concurrent_duplicate_completion() {
    let fx = fixture();
    let process_id = start_review(&fx, "race", SynchronizationMode::Consecutive).await;
    let task_id = fx.open_tasks(process_id).await.remove(0).id;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = fx.engine.clone();
        let actor = fx.alice.clone();
        handles.push(tokio::spawn(async move { engine.complete_task(task_id, &actor).await }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(satisfied) => {
                assert!(!satisfied);
                succeeded += 1;
            }
            Err(e) => assert!(matches!(e.downcast_ref::<EngineError>(), Some(EngineError::TaskNotFound(_)))),
        }
    }

    assert_eq!(succeeded, 1);
    let tasks = fx.open_tasks(process_id).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].index, 1);
    assert_eq!(pool_members(&fx, process_id).await, vec!["bob", "carol"]);
}

#[tokio::test]
async fn test_consecutive_with_empty_pool_continues() {
    let fx = fixture();
    fx.engine
        .deploy_definition(review_process("ghosts", SynchronizationMode::Consecutive))
        .expect("Deploy failed");
    let process_id = fx
        .engine
        .start_process("ghosts", vars(&[("reviewers", json!(["ghost"]))]))
        .await
        .expect("Failed to start process");

    assert!(fx.open_tasks(process_id).await.is_empty());
    assert_eq!(fx.directory.deletes(), 1);
    assert!(fx.directory.inner.temporary_groups().is_empty());
    assert_eq!(status(&fx, process_id), ExecutionStatus::Ended);
}

#[tokio::test]
async fn test_consecutive_over_swimlane_group() {
    let fx = fixture();
    let definition = ProcessBuilder::new("board-review")
        .swimlane("board", Some("board"))
        .start("start")
        .multi_task("review", "Review ${index}")
            .swimlane("board")
            .creation_mode(CreationMode::ByDiscriminatorValue)
            .synchronization(SynchronizationMode::Consecutive)
            .discriminator("topics", &[Usage::MultiinstanceLink])
            .build()
        .end("end")
        .connect("start", "review")
        .connect("review", "end")
        .build();
    fx.engine.deploy_definition(definition).expect("Deploy failed");

    let process_id = fx
        .engine
        .start_process("board-review", vars(&[("topics", json!(["budget"]))]))
        .await
        .expect("Failed to start process");

    assert_eq!(pool_members(&fx, process_id).await, vec!["alice", "bob", "carol"]);
    assert_eq!(fx.open_tasks(process_id).await[0].name, "Review 0");

    assert!(!complete_as(&fx, process_id, &fx.carol).await);
    assert_eq!(fx.open_tasks(process_id).await[0].name, "Review 1");
    assert!(!complete_as(&fx, process_id, &fx.alice).await);
    assert!(complete_as(&fx, process_id, &fx.bob).await);
    assert_eq!(status(&fx, process_id), ExecutionStatus::Ended);
}

#[tokio::test]
async fn test_container_grows_once_per_activation() {
    let store = Arc::new(CountingStore::new());
    let fx = fixture_with({
        let store = store.clone();
        move |mut services| {
            services.store = store as Arc<dyn StateStore>;
            services
        }
    });
    let results = VariableFormat::List { component: Box::new(VariableFormat::Scalar) };
    let definition = ProcessBuilder::new("grow")
        .variable(VariableDefinition::new("results", results))
        .start("start")
        .multi_task("review", "Review")
            .creation_mode(CreationMode::ByExecutors)
            .synchronization(SynchronizationMode::Consecutive)
            .discriminator("reviewers", &[Usage::Read])
            .mapping("results", "result", &[Usage::Write])
            .build()
        .end("end")
        .connect("start", "review")
        .connect("review", "end")
        .build();
    fx.engine.deploy_definition(definition).expect("Deploy failed");

    let process_id = fx
        .engine
        .start_process("grow", vars(&[("reviewers", json!(["alice", "bob", "carol"]))]))
        .await
        .expect("Failed to start process");

    for actor in [&fx.alice, &fx.bob, &fx.carol] {
        complete_as(&fx, process_id, actor).await;
    }

    assert_eq!(store.writes("results"), 1);
    let results = fx.engine.get_var(process_id, "results").await.expect("get_var");
    assert_eq!(results, Some(json!([null, null, null])));
}

#[tokio::test]
async fn test_async_node_does_not_hold_the_token() {
    let fx = fixture();
    let definition = ProcessBuilder::new("async")
        .start("start")
        .multi_task("notify", "Notify")
            .creation_mode(CreationMode::ByExecutors)
            .synchronization(SynchronizationMode::Last)
            .discriminator("reviewers", &[Usage::Read])
            .asynchronous()
            .build()
        .end("end")
        .connect("start", "notify")
        .connect("notify", "end")
        .build();
    fx.engine.deploy_definition(definition).expect("Deploy failed");

    let process_id = fx
        .engine
        .start_process("async", vars(&[("reviewers", json!(["alice", "bob"]))]))
        .await
        .expect("Failed to start process");

    assert_eq!(status(&fx, process_id), ExecutionStatus::Ended);
    let tasks = fx.open_tasks(process_id).await;
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.is_async));
}

#[tokio::test]
async fn test_cancel_deletes_consecutive_pool() {
    let fx = fixture();
    let process_id = start_review(&fx, "cancel", SynchronizationMode::Consecutive).await;
    complete_as(&fx, process_id, &fx.alice).await;

    fx.engine.cancel_process(process_id).await.expect("Cancel failed");

    assert_eq!(fx.directory.deletes(), 1);
    assert!(fx.directory.inner.temporary_groups().is_empty());
    assert!(fx.open_tasks(process_id).await.is_empty());
    assert_eq!(status(&fx, process_id), ExecutionStatus::Cancelled);

    let token_id = fx.engine.process(process_id).expect("process").root_token;
    assert_eq!(fx.engine.token_state(token_id).await, None);

    let err = fx.engine.cancel_process(process_id).await.expect_err("Second cancel should fail");
    assert!(matches!(err.downcast_ref::<EngineError>(), Some(EngineError::ProcessNotActive(_))));
}

#[tokio::test]
async fn test_cancel_survives_delete_failure() {
    let fx = fixture();
    let process_id = start_review(&fx, "cancel-flaky", SynchronizationMode::Consecutive).await;
    fx.directory.fail_deletes();

    fx.engine.cancel_process(process_id).await.expect("Cancel failed");

    assert_eq!(fx.directory.deletes(), 1);
    assert_eq!(status(&fx, process_id), ExecutionStatus::Cancelled);
}
