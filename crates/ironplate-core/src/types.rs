//! ============================================================================
//! Core Types for the Ironplate Workout Core
//! ============================================================================
//! Plan data as it arrives from the backend, the resolved "today" workout,
//! and the identity handed out by the auth collaborator.
//! ============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Calendar date format used for cache keys and remote rows
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Render a calendar date as `YYYY-MM-DD`
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ============================================================================
// Plan Types (backend `workout_plans.plan_data`)
// ============================================================================

/// A generated multi-week plan. `days` describe one week and repeat for
/// `weeks` weeks; `day` values run 1..=7 and missing values are rest days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlanData {
    pub weeks: u32,
    pub days: Vec<PlanDay>,
}

impl WorkoutPlanData {
    /// Find the scheduled day with the given `day` value
    pub fn day(&self, day: u32) -> Option<&PlanDay> {
        self.days.iter().find(|d| d.day == day)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanDay {
    pub day: u32,
    pub name: String,
    pub exercises: Vec<PlanExercise>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanExercise {
    pub name: String,
    pub sets: u32,
    /// Free-form rep scheme, e.g. "8-12" or "AMRAP"
    pub reps: String,
    /// Rest between sets in seconds
    pub rest: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The user's single active plan row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivePlan {
    pub id: String,
    pub plan_data: WorkoutPlanData,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Today's Workout
// ============================================================================

/// The workout scheduled for one calendar date, as shown to the user.
/// Immutable for that date unless explicitly refetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TodayWorkout {
    pub day_number: u32,
    pub name: String,
    pub exercises: Vec<ExerciseSpec>,
    pub plan_id: String,
    pub plan_generated_at: DateTime<Utc>,
}

impl TodayWorkout {
    pub fn exercise(&self, exercise_id: &str) -> Option<&ExerciseSpec> {
        self.exercises.iter().find(|e| e.id == exercise_id)
    }

    /// Total number of sets across all exercises
    pub fn total_sets(&self) -> u32 {
        self.exercises.iter().map(|e| e.sets).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSpec {
    /// Stable across re-fetches, see `schedule::exercise_id`
    pub id: String,
    pub name: String,
    pub sets: u32,
    pub reps: String,
    pub rest: u32,
    pub notes: Option<String>,
}

// ============================================================================
// Identity & Remote Rows
// ============================================================================

/// Authenticated user as reported by the identity collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Reference to an existing remote `workout_logs` row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutLogRef {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_key_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(date_key(date), "2024-01-05");
    }

    #[test]
    fn test_plan_data_parses_backend_json() {
        let json = serde_json::json!({
            "weeks": 4,
            "days": [
                {
                    "day": 1,
                    "name": "Push",
                    "exercises": [
                        { "name": "Bench Press", "sets": 4, "reps": "8-12", "rest": 90 },
                        { "name": "Dips", "sets": 3, "reps": "AMRAP", "rest": 60, "notes": "Bodyweight" }
                    ]
                }
            ]
        });

        let plan: WorkoutPlanData = serde_json::from_value(json).unwrap();
        assert_eq!(plan.weeks, 4);
        let push = plan.day(1).unwrap();
        assert_eq!(push.exercises.len(), 2);
        assert_eq!(push.exercises[0].notes, None);
        assert_eq!(push.exercises[1].notes.as_deref(), Some("Bodyweight"));
        assert!(plan.day(2).is_none());
    }
}
