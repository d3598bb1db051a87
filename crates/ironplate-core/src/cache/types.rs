//! ============================================================================
//! Cache Types - Serializable records for redb storage
//! ============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{date_key, TodayWorkout};

/// Today's workout snapshot, one per calendar date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedWorkout {
    pub date: NaiveDate,
    pub workout: TodayWorkout,
    pub cached_at: DateTime<Utc>,
}

/// Per-set completion flag. Transient working state for one date,
/// superseded by a `WorkoutCompletionRecord` when the workout is finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetCompletionRecord {
    pub id: String,
    pub date: NaiveDate,
    pub exercise_id: String,
    pub set_index: u32,
    pub completed: bool,
    /// Only present while `completed` is true
    pub completed_at: Option<DateTime<Utc>>,
}

impl SetCompletionRecord {
    pub fn new(date: NaiveDate, exercise_id: &str, set_index: u32, completed: bool) -> Self {
        Self {
            id: set_completion_id(date, exercise_id, set_index),
            date,
            exercise_id: exercise_id.to_string(),
            set_index,
            completed,
            completed_at: completed.then(Utc::now),
        }
    }

    /// Lookup key used by `get_set_completions`
    pub fn lookup_key(&self) -> String {
        completion_key(&self.exercise_id, self.set_index)
    }
}

/// Storage key for a set completion row: `date-exerciseId-setIndex`.
/// The fixed-width date prefix doubles as the per-date index.
pub fn set_completion_id(date: NaiveDate, exercise_id: &str, set_index: u32) -> String {
    format!("{}-{}-{}", date_key(date), exercise_id, set_index)
}

/// Key into the completion map handed to the session: `exerciseId-setIndex`
pub fn completion_key(exercise_id: &str, set_index: u32) -> String {
    format!("{}-{}", exercise_id, set_index)
}

/// A finished workout waiting to be (or already) pushed to the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutCompletionRecord {
    pub id: String,
    pub date: NaiveDate,
    pub exercises: Vec<CompletedExercise>,
    pub completed_at: DateTime<Utc>,
    /// Flips false -> true once the backend has confirmed the write
    pub synced: bool,
}

impl WorkoutCompletionRecord {
    /// Build a fresh, unsynced record with its composite id
    pub fn new(date: NaiveDate, exercises: Vec<CompletedExercise>, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: workout_completion_id(date, completed_at),
            date,
            exercises,
            completed_at,
            synced: false,
        }
    }

    pub fn completed_sets(&self) -> usize {
        self.exercises
            .iter()
            .flat_map(|e| e.sets.iter())
            .filter(|s| s.completed)
            .count()
    }
}

/// `workout-{date}-{completedAt millis}`
pub fn workout_completion_id(date: NaiveDate, completed_at: DateTime<Utc>) -> String {
    format!("workout-{}-{}", date_key(date), completed_at.timestamp_millis())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedExercise {
    pub name: String,
    pub sets: Vec<CompletedSet>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CompletedSet {
    pub reps: u32,
    pub weight: f64,
    pub completed: bool,
}

/// Row counts per table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub cached_workouts: usize,
    pub set_completions: usize,
    pub workout_completions: usize,
    pub unsynced_completions: usize,
}
