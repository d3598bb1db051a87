//! ============================================================================
//! REST Backend - PostgREST tables + auth user endpoint
//! ============================================================================
//! Talks to the hosted backend over HTTP:
//! - GET    /auth/v1/user                      current user for the token
//! - GET    /rest/v1/workout_plans             active plan lookup
//! - GET    /rest/v1/exercise_swaps            swap count for a date
//! - GET    /rest/v1/workout_logs              existing log for user + date
//! - POST   /rest/v1/workout_logs              insert a log
//! - PATCH  /rest/v1/workout_logs?id=eq.{id}   update a log
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{IdentityProvider, RemoteStore};
use crate::cache::CompletedExercise;
use crate::types::{date_key, ActivePlan, AuthUser, WorkoutLogRef, WorkoutPlanData};

/// Errors reported by the backend itself
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Backend URL is not configured")]
    NotConfigured,

    #[error("Backend rejected credentials ({0})")]
    Unauthorized(StatusCode),

    #[error("Backend error {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// HTTP client for the hosted backend
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Attach the project key and, when signed in, the user's bearer token
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to {}: {}", what, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized(status).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body }.into());
        }
        Ok(response)
    }

    async fn fetch_rows<T: for<'de> Deserialize<'de>>(
        &self,
        table: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<Vec<T>> {
        let request = self.client.get(self.table_url(table)).query(query);
        let response = self.send(request, what).await?;
        response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse {} response: {}", table, e))
    }
}

/// Row count as u32, pinned at `u32::MAX`
fn saturating_count(rows: usize) -> u32 {
    u32::try_from(rows).unwrap_or(u32::MAX)
}

#[derive(Debug, Deserialize)]
struct PlanRow {
    id: String,
    plan_data: WorkoutPlanData,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

#[derive(Debug, Serialize)]
struct WorkoutLogInsert<'a> {
    user_id: &'a str,
    workout_date: String,
    exercises: &'a [CompletedExercise],
    completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct WorkoutLogUpdate<'a> {
    exercises: &'a [CompletedExercise],
    completed_at: DateTime<Utc>,
}

#[async_trait]
impl IdentityProvider for RestBackend {
    async fn current_user(&self) -> Result<Option<AuthUser>> {
        if self.access_token.is_none() {
            return Ok(None);
        }

        let request = self.client.get(format!("{}/auth/v1/user", self.base_url));
        match self.send(request, "fetch current user").await {
            Ok(response) => {
                let user: AuthUser = response
                    .json()
                    .await
                    .map_err(|e| anyhow!("Failed to parse user response: {}", e))?;
                debug!("Authenticated as {}", user.id);
                Ok(Some(user))
            }
            Err(e) if matches!(e.downcast_ref::<BackendError>(), Some(BackendError::Unauthorized(_))) => {
                warn!("Access token rejected, treating as signed out");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RemoteStore for RestBackend {
    async fn get_active_plan(&self, user_id: &str) -> Result<Option<ActivePlan>> {
        let rows: Vec<PlanRow> = self
            .fetch_rows(
                "workout_plans",
                &[
                    ("select", "id,plan_data,generated_at".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                    ("active", "eq.true".to_string()),
                ],
                "fetch active plan",
            )
            .await?;

        // Exactly one active plan is expected
        if rows.len() > 1 {
            warn!("User {} has {} active plans", user_id, rows.len());
            return Ok(None);
        }
        Ok(rows.into_iter().next().map(|row| ActivePlan {
            id: row.id,
            plan_data: row.plan_data,
            generated_at: row.generated_at,
        }))
    }

    async fn get_swap_count(&self, user_id: &str, date: NaiveDate) -> Result<u32> {
        let rows: Vec<IdRow> = self
            .fetch_rows(
                "exercise_swaps",
                &[
                    ("select", "id".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                    ("workout_date", format!("eq.{}", date_key(date))),
                ],
                "fetch swap count",
            )
            .await?;
        Ok(saturating_count(rows.len()))
    }

    async fn find_workout_log(&self, user_id: &str, date: NaiveDate) -> Result<Option<WorkoutLogRef>> {
        let rows: Vec<IdRow> = self
            .fetch_rows(
                "workout_logs",
                &[
                    ("select", "id".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                    ("workout_date", format!("eq.{}", date_key(date))),
                    ("limit", "1".to_string()),
                ],
                "look up workout log",
            )
            .await?;
        Ok(rows.into_iter().next().map(|row| WorkoutLogRef { id: row.id }))
    }

    async fn insert_workout_log(
        &self,
        user_id: &str,
        date: NaiveDate,
        exercises: &[CompletedExercise],
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let body = WorkoutLogInsert {
            user_id,
            workout_date: date_key(date),
            exercises,
            completed_at,
        };
        let request = self.client.post(self.table_url("workout_logs")).json(&body);
        self.send(request, "insert workout log").await?;

        info!("Inserted workout log for {}", body.workout_date);
        Ok(())
    }

    async fn update_workout_log(
        &self,
        id: &str,
        exercises: &[CompletedExercise],
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let body = WorkoutLogUpdate {
            exercises,
            completed_at,
        };
        let request = self
            .client
            .patch(self.table_url("workout_logs"))
            .query(&[("id", format!("eq.{}", id))])
            .json(&body);
        self.send(request, "update workout log").await?;

        info!("Updated workout log {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CompletedSet;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = RestBackend::new("https://db.example.com/", "anon", None);
        assert_eq!(
            backend.table_url("workout_logs"),
            "https://db.example.com/rest/v1/workout_logs"
        );
    }

    #[test]
    fn test_insert_body_shape() {
        let exercises = vec![CompletedExercise {
            name: "Squat".to_string(),
            sets: vec![CompletedSet { reps: 5, weight: 0.0, completed: true }],
        }];
        let completed_at = DateTime::from_timestamp_millis(1_704_100_000_000).unwrap();
        let body = WorkoutLogInsert {
            user_id: "user-1",
            workout_date: date_key(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            exercises: &exercises,
            completed_at,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["user_id"], "user-1");
        assert_eq!(json["workout_date"], "2024-01-01");
        assert_eq!(json["exercises"][0]["sets"][0]["reps"], 5);
        assert_eq!(json["exercises"][0]["sets"][0]["completed"], true);
    }

    #[test]
    fn test_plan_row_parses_timestamptz() {
        let row: PlanRow = serde_json::from_value(serde_json::json!({
            "id": "plan-1",
            "plan_data": { "weeks": 4, "days": [] },
            "generated_at": "2024-01-01T08:30:00.123456+00:00"
        }))
        .unwrap();
        assert_eq!(row.id, "plan-1");
        assert_eq!(row.generated_at.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_swap_count_saturates() {
        assert_eq!(saturating_count(0), 0);
        assert_eq!(saturating_count(3), 3);
        assert_eq!(saturating_count(u32::MAX as usize), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(saturating_count(u32::MAX as usize + 1), u32::MAX);
    }

    #[tokio::test]
    async fn test_no_token_means_signed_out() {
        let backend = RestBackend::new("http://127.0.0.1:9", "anon", None);
        assert!(backend.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_errors() {
        let backend = RestBackend::new("http://127.0.0.1:9", "anon", Some("token".to_string()));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(backend.find_workout_log("user-1", date).await.is_err());
    }
}
