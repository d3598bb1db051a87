//! ============================================================================
//! IRONPLATE-CORE: Offline-first workout tracking
//! ============================================================================
//! Everything a client needs to run today's workout without a connection:
//! - Local durable store (redb) for cached workouts and completions
//! - Day resolver mapping a plan and a date to a training day
//! - Connectivity-aware sync coordinator that drains finished workouts
//! - Workout session controller tying it together
//! ============================================================================

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod remote;
pub mod schedule;
pub mod session;
pub mod sync;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use types::*;
pub use cache::WorkoutCache;
pub use config::IronplateConfig;
pub use connectivity::{ConnectionStatus, ConnectivitySignal, ReachabilityProbe};
pub use remote::{IdentityProvider, RemoteStore, RestBackend, StaticIdentity};
pub use schedule::DayResolution;
pub use session::{SessionError, SessionState, WorkoutSession};
pub use sync::{SyncCoordinator, SyncOutcome, SyncStatus};
