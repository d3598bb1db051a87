//! ============================================================================
//! Workout Session - Today's workout for one user
//! ============================================================================
//! Loads the workout cache-first, falls back to the backend plan, records
//! per-set toggles locally and turns a finished session into a completion
//! record for the sync coordinator.
//!
//! States: `Loading` -> `Ready` | `RestDay` | `NoPlan` | `Error(SessionError)`
//! ============================================================================

use chrono::{Local, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{completion_key, CompletedExercise, CompletedSet, WorkoutCache};
use crate::remote::{IdentityProvider, RemoteStore};
use crate::schedule::{build_today_workout, leading_reps, resolve_today, DayResolution};
use crate::sync::SyncCoordinator;
use crate::types::TodayWorkout;

/// Conditions the session surfaces to the user
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Please sign in to view your workout")]
    SignInRequired,

    #[error("Could not find workout day {0} in the active plan")]
    DayNotFound(u32),

    #[error("Failed to load workout: {0}")]
    LoadFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Ready,
    RestDay,
    NoPlan,
    Error(SessionError),
}

pub struct WorkoutSession {
    cache: WorkoutCache,
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    coordinator: SyncCoordinator,
    date: NaiveDate,
    state: SessionState,
    workout: Option<TodayWorkout>,
    completions: HashMap<String, bool>,
    swap_count: u32,
}

impl WorkoutSession {
    /// Session for the device's current local date
    pub fn new(
        cache: WorkoutCache,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        coordinator: SyncCoordinator,
    ) -> Self {
        Self {
            cache,
            remote,
            identity,
            coordinator,
            date: Local::now().date_naive(),
            state: SessionState::Loading,
            workout: None,
            completions: HashMap::new(),
            swap_count: 0,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn workout(&self) -> Option<&TodayWorkout> {
        self.workout.as_ref()
    }

    /// `"{exercise_id}-{set_index}" -> completed` for the session date
    pub fn completions(&self) -> &HashMap<String, bool> {
        &self.completions
    }

    pub fn is_set_completed(&self, exercise_id: &str, set_index: u32) -> bool {
        self.completions
            .get(&completion_key(exercise_id, set_index))
            .copied()
            .unwrap_or(false)
    }

    /// Exercise swaps already used today
    pub fn swap_count(&self) -> u32 {
        self.swap_count
    }

    pub fn is_offline(&self) -> bool {
        !self.coordinator.is_online()
    }

    /// Load today's workout. The cached copy is shown first; when offline
    /// it is the final answer.
    pub async fn activate(&mut self) {
        self.state = SessionState::Loading;

        if let Some(cached) = self.cache.get_workout(self.date) {
            debug!("Using cached workout for {}", self.date);
            self.workout = Some(cached);
            self.completions = self.cache.get_set_completions(self.date);
            self.state = SessionState::Ready;

            if self.is_offline() {
                info!("Offline, showing cached workout for {}", self.date);
                return;
            }
        }

        self.state = match self.load_remote().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to load workout for {}: {}", self.date, e);
                SessionState::Error(e)
            }
        };
    }

    /// Reload from the backend, refreshing the cached copy
    pub async fn refetch(&mut self) {
        self.activate().await;
    }

    async fn load_remote(&mut self) -> Result<SessionState, SessionError> {
        let user = match self.identity.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(SessionError::SignInRequired),
            Err(e) => return Err(SessionError::LoadFailed(e.to_string())),
        };

        let plan = self
            .remote
            .get_active_plan(&user.id)
            .await
            .map_err(|e| SessionError::LoadFailed(e.to_string()))?;
        let Some(plan) = plan else {
            info!("No active plan for user {}", user.id);
            self.workout = None;
            return Ok(SessionState::NoPlan);
        };

        let day_number = match resolve_today(&plan.plan_data, plan.generated_at, self.date) {
            DayResolution::Workout(day) => day,
            DayResolution::RestDay => {
                info!("{} is a rest day", self.date);
                self.workout = None;
                return Ok(SessionState::RestDay);
            }
        };

        let day = plan
            .plan_data
            .day(day_number)
            .ok_or(SessionError::DayNotFound(day_number))?;
        let workout = build_today_workout(day, &plan.id, plan.generated_at);

        self.cache.put_workout(self.date, &workout);
        info!(
            "Loaded day {} ({}) with {} exercises for {}",
            workout.day_number,
            workout.name,
            workout.exercises.len(),
            self.date
        );
        self.workout = Some(workout);
        self.completions = self.cache.get_set_completions(self.date);

        self.swap_count = match self.remote.get_swap_count(&user.id, self.date).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to fetch swap count: {}", e);
                0
            }
        };

        Ok(SessionState::Ready)
    }

    /// Flip one set. Memory first, then the local store; never the network.
    /// Returns the new value.
    pub fn toggle_set_completion(&mut self, exercise_id: &str, set_index: u32) -> bool {
        let completed = !self.is_set_completed(exercise_id, set_index);
        self.completions
            .insert(completion_key(exercise_id, set_index), completed);
        self.cache
            .put_set_completion(self.date, exercise_id, set_index, completed);
        completed
    }

    /// Record the session as a finished workout and try to sync it.
    /// Returns false when there is no workout or the record could not be
    /// saved locally; a failed upload is retried by the coordinator.
    pub async fn finish_workout(&mut self) -> bool {
        let Some(workout) = &self.workout else {
            warn!("No workout to finish for {}", self.date);
            return false;
        };

        let exercises: Vec<CompletedExercise> = workout
            .exercises
            .iter()
            .map(|exercise| CompletedExercise {
                name: exercise.name.clone(),
                sets: (0..exercise.sets)
                    .map(|set_index| CompletedSet {
                        reps: leading_reps(&exercise.reps),
                        weight: 0.0,
                        completed: self.is_set_completed(&exercise.id, set_index),
                    })
                    .collect(),
            })
            .collect();

        let Some(id) = self
            .cache
            .put_workout_completion(self.date, exercises, Utc::now())
        else {
            return false;
        };
        info!("Saved workout completion {}", id);

        if self.coordinator.is_online() {
            let outcome = self.coordinator.force_sync().await;
            debug!("Sync after finish: {:?}", outcome);
        }

        self.cache.clear_set_completions(self.date);
        self.completions.clear();
        true
    }
}
