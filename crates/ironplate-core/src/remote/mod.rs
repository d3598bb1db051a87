//! ============================================================================
//! Remote Module - Backend collaborators
//! ============================================================================
//! Interfaces the workout core needs from the identity service and the
//! relational backend, plus a REST implementation of both.
//!
//! ## Usage
//! ```rust,ignore
//! use ironplate_core::remote::{RestBackend, RemoteStore};
//!
//! let backend = RestBackend::new(url, api_key, Some(access_token));
//! let plan = backend.get_active_plan(&user.id).await?;
//! ```
//! ============================================================================

mod rest;

pub use rest::{BackendError, RestBackend};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::cache::CompletedExercise;
use crate::types::{ActivePlan, AuthUser, WorkoutLogRef};

/// "Is there an authenticated user, and who?"
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<Option<AuthUser>>;
}

/// Row operations against the backend's plan, swap and workout log tables
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The user's single active plan, if any
    async fn get_active_plan(&self, user_id: &str) -> Result<Option<ActivePlan>>;

    /// Exercise swaps already used on `date`
    async fn get_swap_count(&self, user_id: &str, date: NaiveDate) -> Result<u32>;

    async fn find_workout_log(&self, user_id: &str, date: NaiveDate) -> Result<Option<WorkoutLogRef>>;

    async fn insert_workout_log(
        &self,
        user_id: &str,
        date: NaiveDate,
        exercises: &[CompletedExercise],
        completed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn update_workout_log(
        &self,
        id: &str,
        exercises: &[CompletedExercise],
        completed_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Identity fixed at construction
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<AuthUser>,
}

impl StaticIdentity {
    pub fn signed_in(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user: Some(AuthUser { id: id.into(), email }),
        }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<AuthUser>> {
        Ok(self.user.clone())
    }
}
