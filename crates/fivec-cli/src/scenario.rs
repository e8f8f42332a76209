//! Reference scenarios
//!
//! Replays the documented lease walkthroughs against an in-memory store on a
//! manual clock and checks every expected outcome.

use chrono::{DateTime, Duration, Utc};
use fivec_core::{
    ActorId, InMemoryStore, LeaseConfig, LeaseError, ManualClock, Task, TaskId, TaskLeaseManager,
};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

struct Fixture {
    manager: TaskLeaseManager,
    clock: Arc<ManualClock>,
    task: TaskId,
}

impl Fixture {
    fn new(config: &LeaseConfig, start: DateTime<Utc>) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::new(start));
        let task = TaskId::from("t1");
        let store = Arc::new(InMemoryStore::with_tasks([Task::new(
            task.clone(),
            "Scenario task",
            start,
        )]));
        let manager = TaskLeaseManager::new(store, config.clone())?.with_clock(clock.clone());
        Ok(Self {
            manager,
            clock,
            task,
        })
    }
}

async fn acquire_unclaimed(fx: Fixture, alice: &ActorId) -> anyhow::Result<String> {
    fx.manager.acquire(&fx.task, alice).await?;
    anyhow::ensure!(fx.manager.is_locked(&fx.task).await?, "task should be locked");
    let owner = fx.manager.lock_owner(&fx.task).await?;
    anyhow::ensure!(owner.as_ref() == Some(alice), "owner is {owner:?}");
    Ok(format!("locked by {alice}"))
}

async fn competing_acquire(fx: Fixture, alice: &ActorId, bob: &ActorId) -> anyhow::Result<String> {
    fx.manager.acquire(&fx.task, alice).await?;
    match fx.manager.acquire(&fx.task, bob).await {
        Err(LeaseError::AlreadyLocked { holder, .. }) if &holder == alice => {
            Ok(format!("rejected, held by {holder}"))
        }
        other => anyhow::bail!("expected AlreadyLocked by {alice}, got {other:?}"),
    }
}

async fn expiry_reclaim(
    fx: Fixture,
    config: &LeaseConfig,
    alice: &ActorId,
    bob: &ActorId,
) -> anyhow::Result<String> {
    let lease = fx.manager.acquire(&fx.task, alice).await?;
    fx.clock
        .set(lease.acquired_at + config.lease_duration() + Duration::seconds(1));
    fx.manager.acquire(&fx.task, bob).await?;
    let owner = fx.manager.lock_owner(&fx.task).await?;
    anyhow::ensure!(owner.as_ref() == Some(bob), "owner is {owner:?}");
    Ok(format!("reclaimed by {bob}"))
}

async fn holder_release(fx: Fixture, alice: &ActorId) -> anyhow::Result<String> {
    fx.manager.acquire(&fx.task, alice).await?;
    fx.manager.release(&fx.task, alice).await?;
    anyhow::ensure!(!fx.manager.is_locked(&fx.task).await?, "task still locked");
    Ok("unlocked".to_string())
}

async fn foreign_release(fx: Fixture, alice: &ActorId, bob: &ActorId) -> anyhow::Result<String> {
    fx.manager.acquire(&fx.task, alice).await?;
    let outcome = fx.manager.release(&fx.task, bob).await;
    anyhow::ensure!(
        matches!(outcome, Err(LeaseError::NotHolder { .. })),
        "expected NotHolder, got {outcome:?}"
    );
    anyhow::ensure!(fx.manager.is_locked(&fx.task).await?, "lock was dropped");
    let owner = fx.manager.lock_owner(&fx.task).await?;
    anyhow::ensure!(owner.as_ref() == Some(alice), "owner is {owner:?}");
    Ok(format!("still held by {alice}"))
}

fn check(name: &'static str, outcome: anyhow::Result<String>) -> ScenarioResult {
    match outcome {
        Ok(detail) => ScenarioResult {
            name,
            passed: true,
            detail,
        },
        Err(e) => ScenarioResult {
            name,
            passed: false,
            detail: e.to_string(),
        },
    }
}

/// Run all scenarios, each on a fresh fixture
pub async fn run_scenarios(config: &LeaseConfig) -> anyhow::Result<Vec<ScenarioResult>> {
    let alice = ActorId::parse("alice")?;
    let bob = ActorId::parse("bob")?;
    let start = Utc::now();
    let fixture = || Fixture::new(config, start);

    Ok(vec![
        check("acquire unclaimed", acquire_unclaimed(fixture()?, &alice).await),
        check("competing acquire", competing_acquire(fixture()?, &alice, &bob).await),
        check("expiry reclaim", expiry_reclaim(fixture()?, config, &alice, &bob).await),
        check("release", holder_release(fixture()?, &alice).await),
        check("non-holder release", foreign_release(fixture()?, &alice, &bob).await),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_scenarios_pass() {
        let results = run_scenarios(&LeaseConfig::new()).await.unwrap();
        assert_eq!(results.len(), 5);
        for r in &results {
            assert!(r.passed, "{}: {}", r.name, r.detail);
        }
    }

    #[tokio::test]
    async fn invalid_config_is_an_error() {
        let config = LeaseConfig::new().with_lease_duration_secs(0);
        assert!(run_scenarios(&config).await.is_err());
    }

    #[tokio::test]
    async fn short_leases_still_pass() {
        let config = LeaseConfig::new().with_lease_duration_secs(5);
        let results = run_scenarios(&config).await.unwrap();
        assert!(results.iter().all(|r| r.passed));
    }
}
