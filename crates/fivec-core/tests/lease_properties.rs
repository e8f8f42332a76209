//! Lease Property Tests
//!
//! Mutual exclusion, renewal, expiry reclaim, release and status
//! consistency, checked through the public manager API.
//!
use chrono::Duration;
use fivec_core::prelude::*;
use fivec_core::EventType;
use fivec_test_utils::{actor, epoch, flaky_env, task_id, TestEnv};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

// Scenario 1
#[tokio::test]
async fn test_acquire_unclaimed() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");

    env.manager.acquire(&t1, &actor("alice")).await.unwrap();
    assert!(env.manager.is_locked(&t1).await.unwrap());
    assert_eq!(env.manager.lock_owner(&t1).await.unwrap(), Some(actor("alice")));
}

// Scenario 2
#[tokio::test]
async fn test_competing_acquire_reports_holder() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    env.manager.acquire(&t1, &actor("alice")).await.unwrap();

    let err = env.manager.acquire(&t1, &actor("bob")).await.unwrap_err();
    assert!(matches!(
        err,
        LeaseError::AlreadyLocked { ref holder, .. } if holder == &actor("alice")
    ));
}

// Scenario 3
#[tokio::test]
async fn test_expired_lease_goes_to_next_actor() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    let lease = env.manager.acquire(&t1, &actor("alice")).await.unwrap();

    env.clock.set(lease.acquired_at + Duration::minutes(30) + Duration::seconds(1));
    env.manager.acquire(&t1, &actor("bob")).await.unwrap();
    assert_eq!(env.manager.lock_owner(&t1).await.unwrap(), Some(actor("bob")));

    let task = env.manager.task(&t1).await.unwrap();
    assert_eq!(task.assigned_to, Some(actor("bob")));
}

// Scenario 4
#[tokio::test]
async fn test_release_unlocks() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    env.manager.acquire(&t1, &actor("alice")).await.unwrap();

    env.manager.release(&t1, &actor("alice")).await.unwrap();
    assert!(!env.manager.is_locked(&t1).await.unwrap());
    assert!(env.manager.can_claim(&t1).await.unwrap());
    env.manager.acquire(&t1, &actor("bob")).await.unwrap();
}

// Scenario 5
#[tokio::test]
async fn test_release_by_other_actor_changes_nothing() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    let before = env.manager.acquire(&t1, &actor("alice")).await.unwrap();

    assert!(env.manager.release(&t1, &actor("bob")).await.is_err());
    assert!(env.manager.is_locked(&t1).await.unwrap());
    let after = env.store.read_lease(&t1).await.unwrap().unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_repeated_acquire_extends_expiry() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    let mut last = env.manager.acquire(&t1, &actor("alice")).await.unwrap();

    for _ in 0..5 {
        env.clock.advance(Duration::minutes(5));
        let next = env.manager.acquire(&t1, &actor("alice")).await.unwrap();
        assert!(next.expires_at > last.expires_at);
        last = next;
    }
    assert_eq!(last.expires_at, epoch() + Duration::minutes(55));
}

#[tokio::test]
async fn test_status_follows_lease() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");

    env.manager.acquire(&t1, &actor("alice")).await.unwrap();
    let task = env.manager.task(&t1).await.unwrap();
    assert_eq!(task.status, TaskStatus::Claimed);
    assert_eq!(task.assigned_to, Some(actor("alice")));

    env.manager.release(&t1, &actor("alice")).await.unwrap();
    let task = env.manager.task(&t1).await.unwrap();
    assert_eq!(task.status, TaskStatus::Open);
    assert_eq!(task.assigned_to, None);
}

#[tokio::test]
async fn test_audit_trail() {
    let env = TestEnv::new(&["t1"]);
    let t1 = task_id("t1");
    env.manager.acquire(&t1, &actor("alice")).await.unwrap();
    env.manager.release(&t1, &actor("alice")).await.unwrap();

    let events = env.manager.history(&t1).await.unwrap();
    let kinds: Vec<_> = events.iter().map(|e| (e.event_type, e.actor.as_str())).collect();
    assert_eq!(
        kinds,
        vec![(EventType::Claimed, "alice"), (EventType::Released, "alice")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_has_one_winner() {
    let env = TestEnv::new(&["t1", "t2", "t3"]);

    for id in ["t1", "t2", "t3"] {
        let mut handles = Vec::new();
        for n in 0..16 {
            let manager = Arc::clone(&env.manager);
            let t = task_id(id);
            handles.push(tokio::spawn(async move {
                manager.acquire(&t, &actor(&format!("agent-{n}"))).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1, "task {id}");

        let owner = env.manager.lock_owner(&task_id(id)).await.unwrap().unwrap();
        let task = env.manager.task(&task_id(id)).await.unwrap();
        assert_eq!(task.assigned_to, Some(owner));
    }
}

#[tokio::test]
async fn test_event_failure_is_best_effort() {
    let (manager, flaky, inner) = flaky_env(&["t1"]);
    let t1 = task_id("t1");
    flaky.fail_events(true);

    manager.acquire(&t1, &actor("alice")).await.unwrap();
    assert!(manager.is_locked(&t1).await.unwrap());
    assert_eq!(inner.event_count(), 0);
}

#[tokio::test]
async fn test_store_outage_is_transport_error() {
    let (manager, flaky, inner) = flaky_env(&["t1"]);
    let t1 = task_id("t1");
    manager.acquire(&t1, &actor("alice")).await.unwrap();

    flaky.fail_writes(true);
    let err = manager.release(&t1, &actor("alice")).await.unwrap_err();
    assert!(err.is_transport());
    assert!(!err.is_conflict());

    // Nothing changed behind the failed call
    let snapshot = inner.read_snapshot(&t1).await.unwrap().unwrap();
    assert_eq!(snapshot.task.status, TaskStatus::Claimed);
    assert!(snapshot.lease.is_some());

    flaky.fail_reads(true);
    assert!(manager.is_locked(&t1).await.unwrap_err().is_transport());
}

#[tokio::test]
async fn test_logical_failures_skip_commit() {
    let (manager, flaky, _) = flaky_env(&["t1"]);
    let t1 = task_id("t1");
    manager.acquire(&t1, &actor("alice")).await.unwrap();
    let commits = flaky.commit_count();

    assert!(manager.acquire(&t1, &actor("bob")).await.is_err());
    assert!(manager.release(&t1, &actor("bob")).await.is_err());
    assert!(manager.start(&t1, &actor("bob")).await.is_err());
    assert_eq!(flaky.commit_count(), commits);
}

#[derive(Debug, Clone)]
enum Op {
    Acquire { actor: usize, task: usize },
    Release { actor: usize, task: usize },
    Advance { minutes: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..3usize, 0..2usize).prop_map(|(actor, task)| Op::Acquire { actor, task }),
        3 => (0..3usize, 0..2usize).prop_map(|(actor, task)| Op::Release { actor, task }),
        2 => (1..40i64).prop_map(|minutes| Op::Advance { minutes }),
    ]
}

const ACTORS: [&str; 3] = ["alice", "bob", "carol"];
const TASKS: [&str; 2] = ["t1", "t2"];

async fn check_consistency(env: &TestEnv) {
    for id in TASKS {
        let t = task_id(id);
        let status = env.manager.lock_status(&t).await.unwrap();
        let task = env.manager.task(&t).await.unwrap();
        match &status.owner {
            Some(owner) => {
                assert_eq!(task.status, TaskStatus::Claimed);
                assert_eq!(task.assigned_to.as_ref(), Some(owner));
            }
            None => {
                assert_eq!(task.status, TaskStatus::Open);
                assert_eq!(task.assigned_to, None);
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_random_operations_keep_invariants(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let env = TestEnv::new(&TASKS);

            for op in ops {
                match op {
                    Op::Acquire { actor: a, task } => {
                        let t = task_id(TASKS[task]);
                        let who = actor(ACTORS[a]);
                        let before = env.manager.lock_status(&t).await.unwrap();
                        let result = env.manager.acquire(&t, &who).await;

                        if before.locked && before.owner.as_ref() != Some(&who) {
                            assert!(matches!(result, Err(LeaseError::AlreadyLocked { .. })));
                        } else {
                            let lease = result.unwrap();
                            assert_eq!(lease.holder, who);
                            assert!(env.manager.is_locked(&t).await.unwrap());
                        }
                    }
                    Op::Release { actor: a, task } => {
                        let t = task_id(TASKS[task]);
                        let who = actor(ACTORS[a]);
                        let before = env.manager.lock_status(&t).await.unwrap();
                        let result = env.manager.release(&t, &who).await;

                        if before.owner.as_ref() == Some(&who) {
                            result.unwrap();
                            assert!(!env.manager.is_locked(&t).await.unwrap());
                        } else {
                            assert!(matches!(result, Err(LeaseError::NotHolder { .. })));
                            let after = env.manager.lock_status(&t).await.unwrap();
                            assert_eq!(after, before);
                        }
                    }
                    Op::Advance { minutes } => env.clock.advance(Duration::minutes(minutes)),
                }

                check_consistency(&env).await;
            }
        });
    }
}
