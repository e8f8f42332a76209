//! Task lifecycle through leases: start, complete, block, reopen and renew.

use fivec_core::prelude::*;
use fivec_core::{ConfigError, EventType, StaticActor};
use fivec_test_utils::{actor, seeded_store, task_id, TestEnv};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn short_env(ids: &[&str]) -> TestEnv {
    TestEnv::with_config(ids, LeaseConfig::new().with_lease_duration_secs(60))
}

#[tokio::test]
async fn test_full_lifecycle_to_done() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    let alice = actor("alice");

    env.manager.acquire(&t1, &alice).await.unwrap();
    let task = env.manager.start(&t1, &alice).await.unwrap();
    assert_eq!(task.status, TaskStatus::Active);

    let task = env.manager.complete(&t1, &alice).await.unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(task.assigned_to, Some(alice.clone()));
    assert!(!env.manager.is_locked(&t1).await.unwrap());

    let err = env.manager.acquire(&t1, &actor("bob")).await.unwrap_err();
    assert!(matches!(err, LeaseError::TaskClosed(_)));

    let kinds: Vec<_> = env
        .manager
        .history(&t1)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![EventType::Claimed, EventType::Started, EventType::Completed]
    );
}

#[tokio::test]
async fn test_block_then_reopen() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    let alice = actor("alice");

    env.manager.acquire(&t1, &alice).await.unwrap();
    let task = env.manager.block(&t1, &alice, "waiting on legal").await.unwrap();
    assert_eq!(task.status, TaskStatus::Blocked);
    assert_eq!(task.assigned_to, None);

    let err = env.manager.acquire(&t1, &actor("bob")).await.unwrap_err();
    assert!(matches!(err, LeaseError::InvalidTransition { .. }));

    let task = env.manager.reopen(&t1, &actor("bob")).await.unwrap();
    assert_eq!(task.status, TaskStatus::Open);
    env.manager.acquire(&t1, &actor("bob")).await.unwrap();

    let events = env.manager.history(&t1).await.unwrap();
    let blocked = events
        .iter()
        .find(|e| e.event_type == EventType::Blocked)
        .unwrap();
    assert_eq!(blocked.details["reason"], "waiting on legal");
}

#[tokio::test]
async fn test_expired_holder_cannot_start() {
    let env = short_env(&["t1"]);
    let t1 = task_id("t1");
    let alice = actor("alice");

    env.manager.acquire(&t1, &alice).await.unwrap();
    env.expire_leases();

    assert!(matches!(
        env.manager.start(&t1, &alice).await,
        Err(LeaseError::NotHolder { .. })
    ));
    assert!(matches!(
        env.manager.renew(&t1, &alice).await,
        Err(LeaseError::NotHolder { .. })
    ));
    // Re-acquiring after expiry is a fresh grant
    env.manager.acquire(&t1, &alice).await.unwrap();
    env.manager.start(&t1, &alice).await.unwrap();
}

#[tokio::test]
async fn test_renew_keeps_active_status() {
    let env = short_env(&["t1"]);
    let t1 = task_id("t1");
    let alice = actor("alice");

    let first = env.manager.acquire(&t1, &alice).await.unwrap();
    env.manager.start(&t1, &alice).await.unwrap();
    env.clock.advance(chrono::Duration::seconds(30));

    let renewed = env.manager.renew(&t1, &alice).await.unwrap();
    assert!(renewed.expires_at > first.expires_at);
    assert_eq!(
        env.manager.task(&t1).await.unwrap().status,
        TaskStatus::Active
    );
}

#[tokio::test]
async fn test_session_reflects_lock_for_other_users() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");

    let alice = LeaseSession::new(
        Arc::clone(&env.manager),
        Arc::new(StaticActor::new(actor("alice"))),
    );
    let bob = LeaseSession::new(
        Arc::clone(&env.manager),
        Arc::new(StaticActor::new(actor("bob"))),
    );

    alice.claim(&t1).await.unwrap();
    assert!(alice.can_edit(&t1).await.unwrap());
    assert!(!bob.can_edit(&t1).await.unwrap());

    let err = bob.claim(&t1).await.unwrap_err();
    assert!(err.user_message().contains("claimed by another user"));

    env.expire_leases();
    assert!(bob.can_edit(&t1).await.unwrap());
    bob.claim(&t1).await.unwrap();
}

#[tokio::test]
async fn test_registering_a_claimed_id_changes_nothing() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    env.manager.acquire(&t1, &actor("alice")).await.unwrap();

    let err = env
        .manager
        .register_task(Task::new("t1", "renamed", env.manager.now()))
        .await
        .unwrap_err();
    assert!(matches!(err, LeaseError::TaskExists(_)));

    let task = env.manager.task(&t1).await.unwrap();
    assert!(env.manager.is_locked(&t1).await.unwrap());
    assert_eq!(task.status, TaskStatus::Claimed);
    assert_eq!(task.assigned_to, Some(actor("alice")));
}

#[test]
fn test_out_of_range_config_is_refused() {
    for config in [
        LeaseConfig::new().with_lease_duration_secs(0),
        LeaseConfig::new().with_max_commit_attempts(0),
        LeaseConfig::new().with_watch_interval_ms(0),
    ] {
        let result = TaskLeaseManager::new(seeded_store(&["t1"]), config);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
