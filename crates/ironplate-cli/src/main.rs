// ============================================================================
// ironplate - workout cache inspection and offline session tool
// ============================================================================
// Usage:
//   ironplate stats                         Show local store statistics
//   ironplate pending                       List workouts waiting to sync
//   ironplate purge [--dry-run]             Delete expired cached workouts
//   ironplate export --format json          Export the local store as JSON
//   ironplate today                         Load and show today's workout
//   ironplate toggle <EXERCISE_ID> <SET>    Flip one set's completion
//   ironplate finish                        Finish today's workout
//   ironplate sync                          Push pending workouts now
//   ironplate watch                         Run background sync until Ctrl-C
// ============================================================================

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use ironplate_core::{
    date_key, ConnectivitySignal, IronplateConfig, ReachabilityProbe, RestBackend, SessionState,
    SyncCoordinator, SyncOutcome, WorkoutCache, WorkoutSession,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How often `watch` re-checks reachability
const PROBE_PERIOD: Duration = Duration::from_secs(15);

/// Ironplate offline workout tool
#[derive(Parser)]
#[command(name = "ironplate", version, about = "Inspect the workout cache and run offline sessions")]
struct Cli {
    /// Path to the database file (default: ~/.ironplate/workout-cache.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Session date as YYYY-MM-DD (default: today, local time)
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    /// Treat the backend as unreachable
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show local store statistics
    Stats,

    /// List finished workouts not yet synced
    Pending,

    /// Delete cached workouts older than the retention window
    Purge {
        /// Show what would be purged without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Export local store contents as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Load today's workout, cache-first
    Today,

    /// Flip completion of one set of today's workout
    Toggle {
        exercise_id: String,
        set_index: u32,
    },

    /// Record today's workout as finished and try to sync it
    Finish,

    /// Push pending workouts to the backend
    Sync,

    /// Keep syncing in the background until interrupted
    Watch,
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ironplate=info,ironplate_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Could not load .env file: {}", e);
        }
    }
    init_logging();

    let cli = Cli::parse();
    let config = IronplateConfig::from_env();
    let db_path = cli.db_path.clone().or_else(|| config.db_path.clone());
    let cache = WorkoutCache::open(db_path.as_deref())?;

    match cli.command {
        Commands::Stats => cmd_stats(&cache),
        Commands::Pending => cmd_pending(&cache),
        Commands::Purge { dry_run } => cmd_purge(&cache, dry_run),
        Commands::Export { ref format } => cmd_export(&cache, format),
        Commands::Today => {
            let app = App::connect(&cli, &config, cache).await?;
            cmd_today(&app).await
        }
        Commands::Toggle {
            ref exercise_id,
            set_index,
        } => {
            let app = App::connect(&cli, &config, cache).await?;
            cmd_toggle(&app, exercise_id, set_index).await
        }
        Commands::Finish => {
            let app = App::connect(&cli, &config, cache).await?;
            cmd_finish(&app).await
        }
        Commands::Sync => {
            let app = App::connect(&cli, &config, cache).await?;
            cmd_sync(&app).await
        }
        Commands::Watch => {
            let app = App::connect(&cli, &config, cache).await?;
            cmd_watch(&app, &config).await
        }
    }
}

// ============================================================================
// Backend-connected context
// ============================================================================

struct App {
    cache: WorkoutCache,
    backend: Arc<RestBackend>,
    signal: ConnectivitySignal,
    coordinator: SyncCoordinator,
    date: Option<NaiveDate>,
}

impl App {
    async fn connect(cli: &Cli, config: &IronplateConfig, cache: WorkoutCache) -> Result<Self> {
        let backend = Arc::new(
            config
                .backend()
                .context("Set IRONPLATE_BACKEND_URL to use session commands")?,
        );

        let online = if cli.offline {
            false
        } else if let Some(target) = config.probe_target() {
            ReachabilityProbe::new(target, PROBE_PERIOD).check().await
        } else {
            true
        };
        if !online {
            warn!("Backend unreachable, working offline");
        }

        let signal = ConnectivitySignal::new(online);
        let coordinator = SyncCoordinator::with_config(
            cache.clone(),
            backend.clone(),
            backend.clone(),
            signal.clone(),
            config.sync_config(),
        );

        Ok(Self {
            cache,
            backend,
            signal,
            coordinator,
            date: cli.date,
        })
    }

    async fn session(&self) -> WorkoutSession {
        let mut session = WorkoutSession::new(
            self.cache.clone(),
            self.backend.clone(),
            self.backend.clone(),
            self.coordinator.clone(),
        );
        if let Some(date) = self.date {
            session = session.with_date(date);
        }
        session.activate().await;
        session
    }
}

// ============================================================================
// Local store commands
// ============================================================================

fn cmd_stats(cache: &WorkoutCache) -> Result<()> {
    let stats = cache.stats();

    println!("=== Ironplate Workout Cache Stats ===");
    match cache.path() {
        Some(path) => println!("Database: {}", path.display()),
        None => println!("Database: (in memory)"),
    }
    println!();
    println!("Cached workouts:      {}", stats.cached_workouts);
    println!("Set completions:      {}", stats.set_completions);
    println!("Workout completions:  {}", stats.workout_completions);
    println!("  waiting to sync     {}", stats.unsynced_completions);

    Ok(())
}

fn cmd_pending(cache: &WorkoutCache) -> Result<()> {
    let pending = cache.get_unsynced_workout_completions();

    if pending.is_empty() {
        println!("Nothing waiting to sync.");
        return Ok(());
    }

    println!("{:<40}  {:<10}  {:<23}  {}", "ID", "DATE", "COMPLETED AT", "SETS DONE");
    println!("{}", "-".repeat(90));

    for record in &pending {
        let total: usize = record.exercises.iter().map(|e| e.sets.len()).sum();
        println!(
            "{:<40}  {:<10}  {:<23}  {}/{}",
            record.id,
            date_key(record.date),
            format_timestamp(record.completed_at),
            record.completed_sets(),
            total
        );
    }

    println!("\nTotal: {} pending", pending.len());
    Ok(())
}

fn cmd_purge(cache: &WorkoutCache, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("=== DRY RUN - no data will be deleted ===\n");

        let expired = cache.expired_workouts();
        println!("Would purge {} expired cached workouts", expired.len());
        for cached in &expired {
            println!(
                "  - {} {} (cached: {})",
                date_key(cached.date),
                cached.workout.name,
                format_timestamp(cached.cached_at)
            );
        }
    } else {
        let purged = cache.purge_expired();
        println!("Purged {} expired cached workouts", purged);
    }

    Ok(())
}

fn cmd_export(cache: &WorkoutCache, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": cache.stats(),
        "cached_workouts": cache.list_cached_workouts(),
        "workout_completions": cache.list_workout_completions(),
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

// ============================================================================
// Session commands
// ============================================================================

fn print_session(session: &WorkoutSession) -> Result<()> {
    match session.state() {
        SessionState::Ready => {}
        SessionState::RestDay => {
            println!("{}: rest day", date_key(session.date()));
            return Ok(());
        }
        SessionState::NoPlan => {
            println!("No active workout plan. Complete onboarding to generate one.");
            return Ok(());
        }
        SessionState::Loading => return Err(anyhow!("Workout is still loading")),
        SessionState::Error(e) if session.workout().is_none() => return Err(anyhow!("{}", e)),
        SessionState::Error(e) => println!("Warning: {} (showing cached workout)\n", e),
    }

    let workout = session
        .workout()
        .ok_or_else(|| anyhow!("No workout loaded"))?;

    println!(
        "=== {} - Day {}: {} ===",
        date_key(session.date()),
        workout.day_number,
        workout.name
    );
    if session.is_offline() {
        println!("(offline)");
    }
    println!("Swaps used today: {}\n", session.swap_count());

    for exercise in &workout.exercises {
        let marks: String = (0..exercise.sets)
            .map(|set| if session.is_set_completed(&exercise.id, set) { 'x' } else { '.' })
            .collect();
        println!(
            "  [{}] {:<24} {} x {:<6} rest {}s   ({})",
            marks, exercise.name, exercise.sets, exercise.reps, exercise.rest, exercise.id
        );
        if let Some(notes) = &exercise.notes {
            println!("        {}", notes);
        }
    }

    Ok(())
}

fn print_outcome(outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Offline => println!("Offline, nothing synced."),
        SyncOutcome::AlreadySyncing => println!("A sync is already running."),
        SyncOutcome::NothingPending => println!("Nothing waiting to sync."),
        SyncOutcome::Unauthenticated => println!("Sign in to sync (set IRONPLATE_ACCESS_TOKEN)."),
        SyncOutcome::IdentityUnavailable => println!("Could not verify sign-in, try again later."),
        SyncOutcome::Completed { synced, failed } => {
            println!("Synced {} workouts, {} left for retry", synced, failed)
        }
    }
}

async fn cmd_today(app: &App) -> Result<()> {
    let session = app.session().await;
    print_session(&session)
}

async fn cmd_toggle(app: &App, exercise_id: &str, set_index: u32) -> Result<()> {
    let mut session = app.session().await;
    let workout = session
        .workout()
        .ok_or_else(|| anyhow!("No workout for {}", date_key(session.date())))?;
    let exercise = workout
        .exercise(exercise_id)
        .ok_or_else(|| anyhow!("Unknown exercise '{}'", exercise_id))?;
    if set_index >= exercise.sets {
        anyhow::bail!(
            "Set {} out of range, '{}' has {} sets (0-based)",
            set_index,
            exercise.name,
            exercise.sets
        );
    }

    let completed = session.toggle_set_completion(exercise_id, set_index);
    println!(
        "{} set {}: {}",
        exercise_id,
        set_index,
        if completed { "done" } else { "not done" }
    );
    Ok(())
}

async fn cmd_finish(app: &App) -> Result<()> {
    let mut session = app.session().await;
    if !session.finish_workout().await {
        anyhow::bail!("Could not finish workout for {}", date_key(session.date()));
    }

    let pending = app.coordinator.pending_count();
    if pending == 0 {
        println!("Workout saved and synced.");
    } else {
        println!("Workout saved. {} waiting to sync.", pending);
    }
    Ok(())
}

async fn cmd_sync(app: &App) -> Result<()> {
    print_outcome(app.coordinator.force_sync().await);
    Ok(())
}

async fn cmd_watch(app: &App, config: &IronplateConfig) -> Result<()> {
    let probe = config
        .probe_target()
        .map(|target| ReachabilityProbe::new(target, PROBE_PERIOD).spawn(app.signal.clone()));

    let connection = app
        .coordinator
        .on_connection_change(|status| info!("Connection: {}", status));
    let status = app
        .coordinator
        .on_sync_status_change(|status| info!("Sync: {}", status));

    app.coordinator.initialize();
    println!("Watching for pending workouts, press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    connection.unsubscribe();
    status.unsubscribe();
    app.coordinator.destroy();
    if let Some(probe) = probe {
        probe.abort();
    }

    println!("{} workouts still waiting to sync.", app.coordinator.pending_count());
    Ok(())
}
