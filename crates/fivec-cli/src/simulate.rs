//! Lease contention simulator
//!
//! Many actors hammer a small set of tasks with acquire/release calls. A
//! shadow table records who was granted what; a grant while another actor
//! is still recorded as holder is a mutual-exclusion violation.

use dashmap::DashMap;
use fivec_core::{ActorId, InMemoryStore, LeaseConfig, LeaseError, Task, TaskId, TaskLeaseManager};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of tasks contended for
    pub tasks: usize,
    /// Number of concurrent actors
    pub actors: usize,
    /// Operations per actor
    pub rounds: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tasks: 4,
            actors: 16,
            rounds: 200,
        }
    }
}

/// A grant that overlapped another live holder
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub task_id: TaskId,
    pub granted_to: ActorId,
    pub still_held_by: ActorId,
}

/// Counters for one run
#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    granted: AtomicU64,
    conflicts: AtomicU64,
    released: AtomicU64,
    errors: AtomicU64,
}

/// Final report
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub attempts: u64,
    pub granted: u64,
    pub conflicts: u64,
    pub released: u64,
    pub errors: u64,
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// No violations and no unexpected errors
    pub fn passed(&self) -> bool {
        self.violations.is_empty() && self.errors == 0
    }

    /// Generate text report
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Lease Contention Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!(
            "Tasks: {}  Actors: {}  Rounds: {}\n",
            self.config.tasks, self.config.actors, self.config.rounds
        ));
        report.push_str(&format!("Attempts: {}\n", self.attempts));
        report.push_str(&format!("Granted: {}\n", self.granted));
        report.push_str(&format!("Conflicts: {}\n", self.conflicts));
        report.push_str(&format!("Released: {}\n", self.released));
        report.push_str(&format!("Errors: {}\n", self.errors));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));
        for v in &self.violations {
            report.push_str(&format!(
                "  {} granted to {} while held by {}\n",
                v.task_id, v.granted_to, v.still_held_by
            ));
        }
        report.push_str(&format!(
            "\nStatus: {}\n",
            if self.passed() { "PASSED" } else { "FAILED" }
        ));
        report
    }
}

/// Run the simulation on an in-memory store
pub async fn run_simulator(config: SimulatorConfig, lease: LeaseConfig) -> anyhow::Result<SimulatorReport> {
    anyhow::ensure!(config.tasks > 0, "at least one task is required");
    anyhow::ensure!(config.actors > 0, "at least one actor is required");

    let task_ids: Vec<TaskId> = (0..config.tasks).map(|i| TaskId::from(format!("task-{i}"))).collect();
    let now = chrono::Utc::now();
    let store = Arc::new(InMemoryStore::with_tasks(
        task_ids.iter().map(|id| Task::new(id.clone(), format!("Simulated {id}"), now)),
    ));
    let manager = Arc::new(TaskLeaseManager::new(store, lease)?);

    let holders: Arc<DashMap<TaskId, ActorId>> = Arc::new(DashMap::new());
    let violations: Arc<Mutex<Vec<Violation>>> = Arc::new(Mutex::new(Vec::new()));
    let counters = Arc::new(Counters::default());
    let task_ids = Arc::new(task_ids);

    let mut handles = Vec::with_capacity(config.actors);
    for n in 0..config.actors {
        let actor = ActorId::parse(format!("actor-{n}"))?;
        let ctx = ActorContext {
            manager: Arc::clone(&manager),
            holders: Arc::clone(&holders),
            violations: Arc::clone(&violations),
            counters: Arc::clone(&counters),
            task_ids: Arc::clone(&task_ids),
        };
        let rng = StdRng::seed_from_u64(config.seed.wrapping_add(n as u64));
        let rounds = config.rounds;
        handles.push(tokio::spawn(async move { ctx.run(actor, rng, rounds).await }));
    }

    for handle in handles {
        handle.await?;
    }

    let mut violations = violations.lock().clone();
    violations.sort_by(|a, b| a.task_id.cmp(&b.task_id));

    Ok(SimulatorReport {
        config,
        attempts: counters.attempts.load(Ordering::SeqCst),
        granted: counters.granted.load(Ordering::SeqCst),
        conflicts: counters.conflicts.load(Ordering::SeqCst),
        released: counters.released.load(Ordering::SeqCst),
        errors: counters.errors.load(Ordering::SeqCst),
        violations,
    })
}

struct ActorContext {
    manager: Arc<TaskLeaseManager>,
    holders: Arc<DashMap<TaskId, ActorId>>,
    violations: Arc<Mutex<Vec<Violation>>>,
    counters: Arc<Counters>,
    task_ids: Arc<Vec<TaskId>>,
}

impl ActorContext {
    async fn run(self, actor: ActorId, mut rng: StdRng, rounds: usize) {
        let mut held: Vec<TaskId> = Vec::new();

        for _ in 0..rounds {
            let task_id = self.task_ids[rng.random_range(0..self.task_ids.len())].clone();
            self.counters.attempts.fetch_add(1, Ordering::SeqCst);

            match self.manager.acquire(&task_id, &actor).await {
                Ok(_) => {
                    self.counters.granted.fetch_add(1, Ordering::SeqCst);
                    self.record_grant(&task_id, &actor);
                    if !held.contains(&task_id) {
                        held.push(task_id.clone());
                    }
                }
                Err(LeaseError::AlreadyLocked { .. } | LeaseError::Contended(_)) => {
                    self.counters.conflicts.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    tracing::error!("{} failed to acquire {}: {}", actor, task_id, e);
                    self.counters.errors.fetch_add(1, Ordering::SeqCst);
                }
            }

            tokio::task::yield_now().await;

            if !held.is_empty() && rng.random_bool(0.6) {
                let task_id = held.swap_remove(rng.random_range(0..held.len()));
                self.release(&task_id, &actor).await;
            }
        }

        for task_id in held {
            self.release(&task_id, &actor).await;
        }
    }

    fn record_grant(&self, task_id: &TaskId, actor: &ActorId) {
        let mut entry = self.holders.entry(task_id.clone()).or_insert_with(|| actor.clone());
        if entry.value() != actor {
            self.violations.lock().push(Violation {
                task_id: task_id.clone(),
                granted_to: actor.clone(),
                still_held_by: entry.value().clone(),
            });
            *entry.value_mut() = actor.clone();
        }
    }

    async fn release(&self, task_id: &TaskId, actor: &ActorId) {
        // Clear the shadow entry before the store row so the next grant never
        // observes a stale holder.
        self.holders.remove_if(task_id, |_, holder| holder == actor);

        match self.manager.release(task_id, actor).await {
            Ok(()) => {
                self.counters.released.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::error!("{} failed to release {}: {}", actor, task_id, e);
                self.counters.errors.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
