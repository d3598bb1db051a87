// ============================================================================
// WorkoutCache - Embedded Database (redb)
// ============================================================================
// On-device storage for today's workout, per-set completion flags and
// finished workouts waiting to sync.
// Default path: ~/.ironplate/workout-cache.redb (override via IRONPLATE_DB_PATH)
//
// Durability is best-effort: the public operations log storage failures and
// behave as if nothing was cached. Only `open` reports an error.
// ============================================================================

pub mod types;

pub use types::{
    completion_key, set_completion_id, workout_completion_id, CacheStats, CachedWorkout,
    CompletedExercise, CompletedSet, SetCompletionRecord, WorkoutCompletionRecord,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::types::{date_key, TodayWorkout};

/// Cached workouts are considered expired after this many days
pub const CACHE_EXPIRY_DAYS: i64 = 7;

// Table definitions
const WORKOUTS: TableDefinition<&str, &[u8]> = TableDefinition::new("workouts");
/// Secondary index: (cached_at millis, date) for the expiry sweep
const WORKOUTS_BY_CACHED_AT: TableDefinition<(i64, &str), ()> =
    TableDefinition::new("workouts_by_cached_at");
const SET_COMPLETIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("set_completions");
const WORKOUT_COMPLETIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("workout_completions");
/// Secondary index: ids of workout completions with `synced == false`
const UNSYNCED_COMPLETIONS: TableDefinition<&str, ()> =
    TableDefinition::new("unsynced_completions");

/// Local durable store for the workout session and sync coordinator.
/// Cloning shares the underlying database.
#[derive(Clone)]
pub struct WorkoutCache {
    db: Arc<Database>,
    path: Option<PathBuf>,
    retention: Duration,
}

impl WorkoutCache {
    /// Open (or create) the cache at the given path.
    /// If `path` is None, uses IRONPLATE_DB_PATH env var or ~/.ironplate/workout-cache.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("IRONPLATE_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let ironplate_dir = home.join(".ironplate");
            std::fs::create_dir_all(&ironplate_dir)
                .map_err(|e| anyhow!("Failed to create .ironplate directory: {}", e))?;
            ironplate_dir.join("workout-cache.redb")
        };

        info!("Opening workout cache at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open workout cache: {}", e))?;

        Self::init(db, Some(db_path))
    }

    /// Volatile cache backed by memory, nothing survives a restart
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|e| anyhow!("Failed to create in-memory cache: {}", e))?;

        Self::init(db, None)
    }

    fn init(db: Database, path: Option<PathBuf>) -> Result<Self> {
        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            write_txn.open_table(WORKOUTS)?;
            write_txn.open_table(WORKOUTS_BY_CACHED_AT)?;
            write_txn.open_table(SET_COMPLETIONS)?;
            write_txn.open_table(WORKOUT_COMPLETIONS)?;
            write_txn.open_table(UNSYNCED_COMPLETIONS)?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        debug!("Workout cache ready");

        Ok(Self {
            db: Arc::new(db),
            path,
            retention: Duration::days(CACHE_EXPIRY_DAYS),
        })
    }

    /// Override the expiry window (default 7 days)
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Database file path, None for the in-memory backend
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========================================================================
    // Workout Snapshot Operations
    // ========================================================================

    /// Cache today's workout, replacing any entry for the same date
    pub fn put_workout(&self, date: NaiveDate, workout: &TodayWorkout) {
        let cached = CachedWorkout {
            date,
            workout: workout.clone(),
            cached_at: Utc::now(),
        };
        logged("cache workout", self.store_cached_workout(&cached), ());
    }

    /// Cached workout for `date`. Expired entries are deleted and reported absent.
    pub fn get_workout(&self, date: NaiveDate) -> Option<TodayWorkout> {
        logged("read cached workout", self.try_get_workout(date, Utc::now()), None)
    }

    pub fn delete_workout(&self, date: NaiveDate) {
        logged("clear cached workout", self.try_delete_workout(date), false);
    }

    /// Delete every cached workout at or past the retention window.
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        logged("purge expired workouts", self.try_purge_expired(Utc::now()), 0)
    }

    /// Entries `purge_expired` would remove right now
    pub fn expired_workouts(&self) -> Vec<CachedWorkout> {
        let cutoff = Utc::now() - self.retention;
        logged("list cached workouts", self.try_list_cached_workouts(), Vec::new())
            .into_iter()
            .filter(|c| c.cached_at <= cutoff)
            .collect()
    }

    pub fn list_cached_workouts(&self) -> Vec<CachedWorkout> {
        logged("list cached workouts", self.try_list_cached_workouts(), Vec::new())
    }

    pub(crate) fn store_cached_workout(&self, cached: &CachedWorkout) -> Result<()> {
        let key = date_key(cached.date);
        let value = bincode::serialize(cached)
            .map_err(|e| anyhow!("Failed to serialize cached workout: {}", e))?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WORKOUTS)?;
            let mut index = write_txn.open_table(WORKOUTS_BY_CACHED_AT)?;

            let previous = table
                .insert(key.as_str(), value.as_slice())?
                .map(|old| bincode::deserialize::<CachedWorkout>(old.value()))
                .transpose()
                .map_err(|e| anyhow!("Failed to deserialize replaced workout: {}", e))?;
            if let Some(previous) = previous {
                index.remove((previous.cached_at.timestamp_millis(), key.as_str()))?;
            }
            index.insert((cached.cached_at.timestamp_millis(), key.as_str()), ())?;
        }
        write_txn.commit()?;

        debug!("Cached workout for {}", key);
        Ok(())
    }

    fn try_get_workout(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<Option<TodayWorkout>> {
        let key = date_key(date);

        let cached = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(WORKOUTS)?;
            match table.get(key.as_str())? {
                Some(value) => bincode::deserialize::<CachedWorkout>(value.value())
                    .map_err(|e| anyhow!("Failed to deserialize cached workout: {}", e))?,
                None => return Ok(None),
            }
        };

        if now - cached.cached_at > self.retention {
            debug!("Cached workout for {} expired (cached at {})", key, cached.cached_at);
            self.try_delete_workout(date)?;
            return Ok(None);
        }

        Ok(Some(cached.workout))
    }

    fn try_delete_workout(&self, date: NaiveDate) -> Result<bool> {
        let key = date_key(date);

        let write_txn = self.db.begin_write()?;
        let removed;
        {
            let mut table = write_txn.open_table(WORKOUTS)?;
            let mut index = write_txn.open_table(WORKOUTS_BY_CACHED_AT)?;
            let previous = table
                .remove(key.as_str())?
                .map(|old| bincode::deserialize::<CachedWorkout>(old.value()))
                .transpose()
                .map_err(|e| anyhow!("Failed to deserialize removed workout: {}", e))?;
            if let Some(previous) = &previous {
                index.remove((previous.cached_at.timestamp_millis(), key.as_str()))?;
            }
            removed = previous.is_some();
        }
        write_txn.commit()?;

        if removed {
            debug!("Deleted cached workout: {}", key);
        }
        Ok(removed)
    }

    fn try_purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = (now - self.retention).timestamp_millis();

        let write_txn = self.db.begin_write()?;
        let expired: Vec<(i64, String)>;
        {
            let mut table = write_txn.open_table(WORKOUTS)?;
            let mut index = write_txn.open_table(WORKOUTS_BY_CACHED_AT)?;

            // Everything strictly below (cutoff + 1, "") has cached_at <= cutoff
            expired = index
                .range(..(cutoff.saturating_add(1), ""))?
                .map(|entry| {
                    entry.map(|(key, _)| {
                        let (cached_at, date) = key.value();
                        (cached_at, date.to_string())
                    })
                })
                .collect::<Result<_, _>>()?;

            for (cached_at, date) in &expired {
                index.remove((*cached_at, date.as_str()))?;
                table.remove(date.as_str())?;
            }
        }
        write_txn.commit()?;

        if !expired.is_empty() {
            info!(
                "Purged {} cached workouts older than {} days",
                expired.len(),
                self.retention.num_days()
            );
        }
        Ok(expired.len())
    }

    fn try_list_cached_workouts(&self) -> Result<Vec<CachedWorkout>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WORKOUTS)?;

        let mut results = Vec::new();
        for entry in table.range::<&str>(..)? {
            let (_key, value) = entry?;
            let cached: CachedWorkout = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize cached workout: {}", e))?;
            results.push(cached);
        }
        Ok(results)
    }

    // ========================================================================
    // Set Completion Operations
    // ========================================================================

    /// Record the state of one set. `completed_at` is stamped only when completed.
    pub fn put_set_completion(&self, date: NaiveDate, exercise_id: &str, set_index: u32, completed: bool) {
        let record = SetCompletionRecord::new(date, exercise_id, set_index, completed);
        logged("save set completion", self.try_put_set_completion(&record), ());
    }

    /// All set flags for `date`, keyed by `exerciseId-setIndex`
    pub fn get_set_completions(&self, date: NaiveDate) -> HashMap<String, bool> {
        logged("read set completions", self.try_get_set_completions(date), Vec::new())
            .into_iter()
            .map(|record| (record.lookup_key(), record.completed))
            .collect()
    }

    /// Delete the per-set rows for `date`. Workout completion records live in
    /// their own table and are untouched. Returns the number of rows removed.
    pub fn clear_set_completions(&self, date: NaiveDate) -> usize {
        logged("clear set completions", self.try_clear_set_completions(date), 0)
    }

    fn try_put_set_completion(&self, record: &SetCompletionRecord) -> Result<()> {
        let value = bincode::serialize(record)
            .map_err(|e| anyhow!("Failed to serialize set completion: {}", e))?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SET_COMPLETIONS)?;
            table.insert(record.id.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;

        debug!("Stored set completion {} = {}", record.id, record.completed);
        Ok(())
    }

    fn try_get_set_completions(&self, date: NaiveDate) -> Result<Vec<SetCompletionRecord>> {
        let (start, end) = date_prefix_range(date);

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SET_COMPLETIONS)?;

        let mut results = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_key, value) = entry?;
            let record: SetCompletionRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize set completion: {}", e))?;
            results.push(record);
        }
        Ok(results)
    }

    fn try_clear_set_completions(&self, date: NaiveDate) -> Result<usize> {
        let (start, end) = date_prefix_range(date);

        let write_txn = self.db.begin_write()?;
        let keys: Vec<String>;
        {
            let mut table = write_txn.open_table(SET_COMPLETIONS)?;
            keys = table
                .range(start.as_str()..end.as_str())?
                .map(|entry| entry.map(|(key, _)| key.value().to_string()))
                .collect::<Result<_, _>>()?;
            for key in &keys {
                table.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;

        debug!("Cleared {} set completions for {}", keys.len(), date_key(date));
        Ok(keys.len())
    }

    // ========================================================================
    // Workout Completion Operations
    // ========================================================================

    /// Persist a finished workout for syncing. Returns its id, or None when
    /// the write failed.
    pub fn put_workout_completion(
        &self,
        date: NaiveDate,
        exercises: Vec<CompletedExercise>,
        completed_at: DateTime<Utc>,
    ) -> Option<String> {
        let record = WorkoutCompletionRecord::new(date, exercises, completed_at);
        match self.store_workout_completion(&record) {
            Ok(()) => Some(record.id),
            Err(e) => {
                warn!("Failed to save workout completion: {}", e);
                None
            }
        }
    }

    /// Finished workouts not yet confirmed by the backend, ordered by date
    /// then completion time
    pub fn get_unsynced_workout_completions(&self) -> Vec<WorkoutCompletionRecord> {
        logged("read unsynced completions", self.try_get_unsynced(), Vec::new())
    }

    /// Flag a completion as synced. Absent ids are ignored.
    pub fn mark_workout_completion_synced(&self, id: &str) {
        logged("mark completion synced", self.try_mark_synced(id), false);
    }

    pub fn list_workout_completions(&self) -> Vec<WorkoutCompletionRecord> {
        logged("list workout completions", self.try_list_workout_completions(), Vec::new())
    }

    pub(crate) fn store_workout_completion(&self, record: &WorkoutCompletionRecord) -> Result<()> {
        let value = bincode::serialize(record)
            .map_err(|e| anyhow!("Failed to serialize workout completion: {}", e))?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WORKOUT_COMPLETIONS)?;
            let mut unsynced = write_txn.open_table(UNSYNCED_COMPLETIONS)?;
            table.insert(record.id.as_str(), value.as_slice())?;
            if record.synced {
                unsynced.remove(record.id.as_str())?;
            } else {
                unsynced.insert(record.id.as_str(), ())?;
            }
        }
        write_txn.commit()?;

        debug!("Stored workout completion: {}", record.id);
        Ok(())
    }

    fn try_get_unsynced(&self) -> Result<Vec<WorkoutCompletionRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WORKOUT_COMPLETIONS)?;
        let unsynced = read_txn.open_table(UNSYNCED_COMPLETIONS)?;

        let mut results = Vec::new();
        for entry in unsynced.range::<&str>(..)? {
            let (key, _) = entry?;
            let Some(value) = table.get(key.value())? else {
                warn!("Unsynced index points at missing completion {}", key.value());
                continue;
            };
            let record: WorkoutCompletionRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize workout completion: {}", e))?;
            if !record.synced {
                results.push(record);
            }
        }
        Ok(results)
    }

    fn try_mark_synced(&self, id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let updated;
        {
            let mut table = write_txn.open_table(WORKOUT_COMPLETIONS)?;
            let mut unsynced = write_txn.open_table(UNSYNCED_COMPLETIONS)?;

            let existing = table
                .get(id)?
                .map(|value| bincode::deserialize::<WorkoutCompletionRecord>(value.value()))
                .transpose()
                .map_err(|e| anyhow!("Failed to deserialize workout completion: {}", e))?;

            updated = match existing {
                Some(mut record) if !record.synced => {
                    record.synced = true;
                    let value = bincode::serialize(&record)
                        .map_err(|e| anyhow!("Failed to serialize workout completion: {}", e))?;
                    table.insert(id, value.as_slice())?;
                    true
                }
                _ => false,
            };
            unsynced.remove(id)?;
        }
        write_txn.commit()?;

        if updated {
            debug!("Marked workout completion synced: {}", id);
        }
        Ok(updated)
    }

    fn try_list_workout_completions(&self) -> Result<Vec<WorkoutCompletionRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WORKOUT_COMPLETIONS)?;

        let mut results = Vec::new();
        for entry in table.range::<&str>(..)? {
            let (_key, value) = entry?;
            let record: WorkoutCompletionRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize workout completion: {}", e))?;
            results.push(record);
        }
        Ok(results)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> CacheStats {
        logged("read cache stats", self.try_stats(), CacheStats::default())
    }

    fn try_stats(&self) -> Result<CacheStats> {
        let read_txn = self.db.begin_read()?;

        let cached_workouts = read_txn.open_table(WORKOUTS)?.range::<&str>(..)?.count();
        let set_completions = read_txn.open_table(SET_COMPLETIONS)?.range::<&str>(..)?.count();
        let workout_completions = read_txn
            .open_table(WORKOUT_COMPLETIONS)?
            .range::<&str>(..)?
            .count();
        let unsynced_completions = read_txn
            .open_table(UNSYNCED_COMPLETIONS)?
            .range::<&str>(..)?
            .count();

        Ok(CacheStats {
            cached_workouts,
            set_completions,
            workout_completions,
            unsynced_completions,
        })
    }
}

/// Key range covering every set completion row of one date
fn date_prefix_range(date: NaiveDate) -> (String, String) {
    let day = date_key(date);
    // '.' sorts right after '-'
    (format!("{}-", day), format!("{}.", day))
}

fn logged<T>(operation: &str, result: Result<T>, fallback: T) -> T {
    result.unwrap_or_else(|e| {
        warn!("Failed to {}: {}", operation, e);
        fallback
    })
}
