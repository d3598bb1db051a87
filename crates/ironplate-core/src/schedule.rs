//! ============================================================================
//! Schedule - Which plan day is today
//! ============================================================================
//! A plan describes one week of training days (`day` 1..=7) repeated for
//! `weeks` weeks, starting on the local calendar date the plan was generated.
//! Days without an entry are rest days.
//! ============================================================================

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExerciseSpec, PlanDay, TodayWorkout, WorkoutPlanData};

/// Outcome of resolving a calendar date against a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayResolution {
    /// Plan day number scheduled for the date
    Workout(u32),
    RestDay,
}

/// Resolve `today` against a plan generated at `generated_at`.
///
/// Both endpoints are reduced to calendar dates in the device's local zone
/// before subtracting, so the day count is a whole number of calendar days.
/// A generation time after `today` (clock skew) counts as day zero.
pub fn resolve_today(
    plan: &WorkoutPlanData,
    generated_at: DateTime<Utc>,
    today: NaiveDate,
) -> DayResolution {
    let generated_on = generated_at.with_timezone(&Local).date_naive();
    resolve_day(plan, generated_on, today)
}

/// `resolve_today` for the current local date
pub fn resolve_today_local(plan: &WorkoutPlanData, generated_at: DateTime<Utc>) -> DayResolution {
    resolve_today(plan, generated_at, Local::now().date_naive())
}

/// Calendar-date core of the resolver
pub fn resolve_day(plan: &WorkoutPlanData, generated_on: NaiveDate, today: NaiveDate) -> DayResolution {
    let total_days = i64::from(plan.weeks) * 7;
    if total_days == 0 {
        return DayResolution::RestDay;
    }

    let days_since_generated = (today - generated_on).num_days().max(0);
    let current_day_in_cycle = (days_since_generated % total_days) + 1;
    let day_of_week = ((current_day_in_cycle - 1) % 7) + 1;

    match plan.days.iter().find(|d| i64::from(d.day) == day_of_week) {
        Some(day) => DayResolution::Workout(day.day),
        None => DayResolution::RestDay,
    }
}

/// Stable exercise id: `day{N}-ex{I}-{name}` with the name lowercased and
/// every whitespace run replaced by a single `-`
pub fn exercise_id(day_number: u32, exercise_index: usize, exercise_name: &str) -> String {
    let mut slug = String::with_capacity(exercise_name.len());
    let mut in_whitespace = false;
    for c in exercise_name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
        } else {
            slug.extend(c.to_lowercase());
            in_whitespace = false;
        }
    }
    format!("day{}-ex{}-{}", day_number, exercise_index, slug)
}

/// Assemble today's workout from a scheduled plan day
pub fn build_today_workout(
    day: &PlanDay,
    plan_id: &str,
    plan_generated_at: DateTime<Utc>,
) -> TodayWorkout {
    TodayWorkout {
        day_number: day.day,
        name: day.name.clone(),
        exercises: day
            .exercises
            .iter()
            .enumerate()
            .map(|(index, exercise)| ExerciseSpec {
                id: exercise_id(day.day, index, &exercise.name),
                name: exercise.name.clone(),
                sets: exercise.sets,
                reps: exercise.reps.clone(),
                rest: exercise.rest,
                notes: exercise.notes.clone(),
            })
            .collect(),
        plan_id: plan_id.to_string(),
        plan_generated_at,
    }
}

/// Leading integer of a rep scheme: "8-12" -> 8, "10" -> 10, "AMRAP" -> 0
pub fn leading_reps(reps: &str) -> u32 {
    let first = reps.split('-').next().unwrap_or_default().trim_start();
    let digits: String = first.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanExercise;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn plan(weeks: u32, days: &[u32]) -> WorkoutPlanData {
        WorkoutPlanData {
            weeks,
            days: days
                .iter()
                .map(|&day| PlanDay {
                    day,
                    name: format!("Day {}", day),
                    exercises: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_three_day_split() {
        let plan = plan(4, &[1, 3, 5]);
        let start = date(2024, 1, 1);

        assert_eq!(resolve_day(&plan, start, start), DayResolution::Workout(1));
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 2)), DayResolution::RestDay);
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 3)), DayResolution::Workout(3));
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 5)), DayResolution::Workout(5));
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 7)), DayResolution::RestDay);
    }

    #[test]
    fn test_consecutive_days_plan() {
        let plan = plan(4, &[1, 2, 3]);
        let start = date(2024, 1, 1);

        assert_eq!(resolve_day(&plan, start, start), DayResolution::Workout(1));
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 4)), DayResolution::RestDay);
        // T + 2 days is the third scheduled day
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 3)), DayResolution::Workout(3));
    }

    #[test]
    fn test_week_pattern_repeats_and_cycle_wraps() {
        let plan = plan(4, &[1, 3, 5]);
        let start = date(2024, 1, 1);

        // Second week, same weekday pattern
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 8)), DayResolution::Workout(1));
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 10)), DayResolution::Workout(3));
        // 28 days later the 4-week cycle starts over
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 29)), DayResolution::Workout(1));
        assert_eq!(resolve_day(&plan, start, date(2024, 1, 30)), DayResolution::RestDay);
    }

    #[test]
    fn test_zero_weeks_is_rest() {
        let plan = plan(0, &[1, 2, 3]);
        let start = date(2024, 1, 1);
        assert_eq!(resolve_day(&plan, start, start), DayResolution::RestDay);
    }

    #[test]
    fn test_future_generation_counts_as_day_zero() {
        let plan = plan(4, &[1, 3, 5]);
        assert_eq!(
            resolve_day(&plan, date(2024, 1, 10), date(2024, 1, 3)),
            DayResolution::Workout(1)
        );
    }

    #[test]
    fn test_resolve_today_uses_local_generation_date() {
        let plan = plan(4, &[1, 3, 5]);
        let generated_at = Utc::now();
        let generated_on = generated_at.with_timezone(&Local).date_naive();

        assert_eq!(resolve_today(&plan, generated_at, generated_on), DayResolution::Workout(1));
        assert_eq!(
            resolve_today(&plan, generated_at, generated_on + chrono::Duration::days(1)),
            DayResolution::RestDay
        );
    }

    #[test]
    fn test_exercise_id_slug() {
        assert_eq!(exercise_id(1, 0, "Bench Press"), "day1-ex0-bench-press");
        assert_eq!(exercise_id(3, 2, "Romanian  Dead\tLift"), "day3-ex2-romanian-dead-lift");
        assert_eq!(exercise_id(2, 1, "Squat"), "day2-ex1-squat");
    }

    #[test]
    fn test_build_today_workout_assigns_stable_ids() {
        let day = PlanDay {
            day: 3,
            name: "Pull".to_string(),
            exercises: vec![
                PlanExercise {
                    name: "Barbell Row".to_string(),
                    sets: 4,
                    reps: "8-10".to_string(),
                    rest: 120,
                    notes: None,
                },
                PlanExercise {
                    name: "Face Pull".to_string(),
                    sets: 3,
                    reps: "15".to_string(),
                    rest: 60,
                    notes: Some("Light".to_string()),
                },
            ],
        };
        let generated_at = Utc::now();

        let first = build_today_workout(&day, "plan-9", generated_at);
        let second = build_today_workout(&day, "plan-9", generated_at);

        assert_eq!(first, second);
        assert_eq!(first.day_number, 3);
        assert_eq!(first.exercises[0].id, "day3-ex0-barbell-row");
        assert_eq!(first.exercises[1].id, "day3-ex1-face-pull");
        assert_eq!(first.exercises[1].notes.as_deref(), Some("Light"));
        assert_eq!(first.total_sets(), 7);
    }

    #[test]
    fn test_leading_reps() {
        assert_eq!(leading_reps("8-12"), 8);
        assert_eq!(leading_reps("10"), 10);
        assert_eq!(leading_reps(" 5"), 5);
        assert_eq!(leading_reps("30s"), 30);
        assert_eq!(leading_reps("AMRAP"), 0);
        assert_eq!(leading_reps(""), 0);
    }
}
