// ============================================================================
// Test Collaborators - in-memory backend
// ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::CompletedExercise;
use crate::remote::RemoteStore;
use crate::types::{ActivePlan, PlanDay, PlanExercise, WorkoutLogRef, WorkoutPlanData};

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteLog {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub exercises: Vec<CompletedExercise>,
    pub completed_at: DateTime<Utc>,
}

/// Backend double. Every call yields once so concurrent callers interleave,
/// or waits out the configured latency.
#[derive(Default)]
pub struct MockRemote {
    plan: Mutex<Option<ActivePlan>>,
    logs: Mutex<Vec<RemoteLog>>,
    failing_dates: Mutex<HashSet<NaiveDate>>,
    fail_plan: AtomicBool,
    fail_swaps: AtomicBool,
    swap_count: AtomicU32,
    latency: Mutex<Duration>,
    calls: AtomicUsize,
    finds: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl MockRemote {
    pub fn with_plan(plan: ActivePlan) -> Self {
        let remote = Self::default();
        remote.set_plan(Some(plan));
        remote
    }

    pub fn set_plan(&self, plan: Option<ActivePlan>) {
        *self.plan.lock().unwrap() = plan;
    }

    /// Delay applied to every call from now on
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_swap_count(&self, count: u32) {
        self.swap_count.store(count, Ordering::SeqCst);
    }

    pub fn fail_plan_fetch(&self, fail: bool) {
        self.fail_plan.store(fail, Ordering::SeqCst);
    }

    pub fn fail_swap_fetch(&self, fail: bool) {
        self.fail_swaps.store(fail, Ordering::SeqCst);
    }

    /// Make every log operation for `date` fail
    pub fn fail_date(&self, date: NaiveDate) {
        self.failing_dates.lock().unwrap().insert(date);
    }

    pub fn clear_failures(&self) {
        self.failing_dates.lock().unwrap().clear();
    }

    pub fn logs(&self) -> Vec<RemoteLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    async fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_date(&self, date: NaiveDate) -> Result<()> {
        if self.failing_dates.lock().unwrap().contains(&date) {
            return Err(anyhow!("backend unavailable for {}", date));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn get_active_plan(&self, _user_id: &str) -> Result<Option<ActivePlan>> {
        self.touch().await;
        if self.fail_plan.load(Ordering::SeqCst) {
            return Err(anyhow!("plan fetch failed"));
        }
        Ok(self.plan.lock().unwrap().clone())
    }

    async fn get_swap_count(&self, _user_id: &str, _date: NaiveDate) -> Result<u32> {
        self.touch().await;
        if self.fail_swaps.load(Ordering::SeqCst) {
            return Err(anyhow!("swap fetch failed"));
        }
        Ok(self.swap_count.load(Ordering::SeqCst))
    }

    async fn find_workout_log(&self, user_id: &str, date: NaiveDate) -> Result<Option<WorkoutLogRef>> {
        self.touch().await;
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.check_date(date)?;
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .find(|log| log.user_id == user_id && log.date == date)
            .map(|log| WorkoutLogRef { id: log.id.clone() }))
    }

    async fn insert_workout_log(
        &self,
        user_id: &str,
        date: NaiveDate,
        exercises: &[CompletedExercise],
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.touch().await;
        self.check_date(date)?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let mut logs = self.logs.lock().unwrap();
        let id = format!("log-{}", logs.len() + 1);
        logs.push(RemoteLog {
            id,
            user_id: user_id.to_string(),
            date,
            exercises: exercises.to_vec(),
            completed_at,
        });
        Ok(())
    }

    async fn update_workout_log(
        &self,
        id: &str,
        exercises: &[CompletedExercise],
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.touch().await;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut logs = self.logs.lock().unwrap();
        let log = logs
            .iter_mut()
            .find(|log| log.id == id)
            .ok_or_else(|| anyhow!("no workout log {}", id))?;
        log.exercises = exercises.to_vec();
        log.completed_at = completed_at;
        Ok(())
    }
}

/// Plan with one exercise per scheduled day
pub fn sample_plan(weeks: u32, days: &[u32], generated_at: DateTime<Utc>) -> ActivePlan {
    ActivePlan {
        id: "plan-1".to_string(),
        plan_data: WorkoutPlanData {
            weeks,
            days: days
                .iter()
                .map(|&day| PlanDay {
                    day,
                    name: format!("Day {}", day),
                    exercises: vec![
                        PlanExercise {
                            name: "Back Squat".to_string(),
                            sets: 3,
                            reps: "8-12".to_string(),
                            rest: 120,
                            notes: None,
                        },
                        PlanExercise {
                            name: "Pull Ups".to_string(),
                            sets: 2,
                            reps: "AMRAP".to_string(),
                            rest: 90,
                            notes: Some("Bodyweight".to_string()),
                        },
                    ],
                })
                .collect(),
        },
        generated_at,
    }
}
