//! Persistent tier of the result cache: one SQLite table in the workspace.
//!
//! Every failure here is logged and swallowed. A broken or missing database makes the engine
//! recompute, it never makes a request fail.

use crate::calc::SchoolAnalyticsResult;
use crate::config::EngineConfig;
use crate::db;
use crate::error::{EngineError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

#[derive(Clone)]
pub struct PersistentCache {
    conn: Option<Arc<Mutex<Connection>>>,
    max_entries: usize,
    max_age_ms: i64,
    clock: Clock,
}

impl std::fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("available", &self.is_available())
            .field("max_entries", &self.max_entries)
            .field("max_age_ms", &self.max_age_ms)
            .finish()
    }
}

impl PersistentCache {
    /// Opens the cache database in `workspace`, or returns an unavailable cache if that fails.
    pub fn open(workspace: &Path, config: &EngineConfig) -> Self {
        match db::open_cache_db(workspace) {
            Ok(conn) => Self::from_connection(conn, config),
            Err(e) => {
                warn!(workspace = %workspace.display(), error = %e, "analytics cache unavailable");
                Self::unavailable(config)
            }
        }
    }

    pub fn from_connection(conn: Connection, config: &EngineConfig) -> Self {
        Self {
            conn: Some(Arc::new(Mutex::new(conn))),
            max_entries: config.cache_max_entries,
            max_age_ms: config.max_age_ms(),
            clock: system_clock(),
        }
    }

    /// Every lookup misses and every write is dropped.
    pub fn unavailable(config: &EngineConfig) -> Self {
        Self {
            conn: None,
            max_entries: config.cache_max_entries,
            max_age_ms: config.max_age_ms(),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// A stored result, unless it is missing, expired or unreadable. Expired and unreadable
    /// entries are deleted on the way out.
    pub async fn get(&self, key: &str) -> Option<SchoolAnalyticsResult> {
        let key = key.to_string();
        let now = (self.clock)();
        let max_age_ms = self.max_age_ms;
        self.run("get", move |conn| {
            let row = conn
                .query_row(
                    "SELECT result, created_at FROM analytics_results WHERE key = ?",
                    [&key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;
            let Some((text, created_at)) = row else {
                return Ok(None);
            };

            if now.saturating_sub(created_at) > max_age_ms {
                debug!(%key, "analytics cache entry expired");
                conn.execute("DELETE FROM analytics_results WHERE key = ?", [&key])?;
                return Ok(None);
            }
            match serde_json::from_str::<SchoolAnalyticsResult>(&text) {
                Ok(result) if result.has_valid_context() => Ok(Some(result)),
                Ok(_) | Err(_) => {
                    warn!(%key, "discarding unreadable analytics cache entry");
                    conn.execute("DELETE FROM analytics_results WHERE key = ?", [&key])?;
                    Ok(None)
                }
            }
        })
        .await
        .flatten()
    }

    /// Stores `result` under `key`, then prunes expired entries and the oldest overflow.
    pub async fn set(&self, key: &str, result: &SchoolAnalyticsResult) {
        if !self.is_available() {
            return;
        }
        let text = match serde_json::to_string(result) {
            Ok(t) => t,
            Err(e) => {
                warn!(%key, error = %e, "could not serialize analytics result");
                return;
            }
        };
        let key = key.to_string();
        let now = (self.clock)();
        let (max_age_ms, max_entries) = (self.max_age_ms, self.max_entries);
        self.run("set", move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO analytics_results(key, result, created_at) VALUES(?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET result = excluded.result, created_at = excluded.created_at",
                params![key, text, now],
            )?;
            prune(&tx, now, max_age_ms, max_entries)?;
            tx.commit()?;
            Ok(())
        })
        .await;
    }

    pub async fn delete(&self, key: &str) {
        let key = key.to_string();
        self.run("delete", move |conn| {
            conn.execute("DELETE FROM analytics_results WHERE key = ?", [&key])?;
            Ok(())
        })
        .await;
    }

    /// Number of stored entries; 0 when unavailable.
    pub async fn len(&self) -> usize {
        self.run("len", |conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM analytics_results", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        })
        .await
        .unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Runs `op` on the blocking pool. `None` when the cache is unavailable or the operation
    /// failed; failures are logged.
    async fn run<T, F>(&self, what: &'static str, op: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone()?;
        let joined = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            op(&guard)
        })
        .await;
        match joined.map_err(EngineError::from).and_then(|r| r) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(op = what, error = %e, "analytics cache operation failed");
                None
            }
        }
    }
}

fn prune(conn: &Connection, now: i64, max_age_ms: i64, max_entries: usize) -> Result<()> {
    let expired = conn.execute(
        "DELETE FROM analytics_results WHERE created_at < ?",
        [now.saturating_sub(max_age_ms)],
    )?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM analytics_results", [], |row| row.get(0))?;
    let overflow = count - i64::try_from(max_entries).unwrap_or(i64::MAX);
    let evicted = if overflow > 0 {
        conn.execute(
            "DELETE FROM analytics_results WHERE key IN (
                SELECT key FROM analytics_results ORDER BY created_at ASC, key ASC LIMIT ?
            )",
            [overflow],
        )?
    } else {
        0
    };
    if expired + evicted > 0 {
        debug!(expired, evicted, "pruned analytics cache");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{self, AnalyticsContext};
    use crate::model::{AnalyticsFilters, Dataset, Grade, SchoolClass, Student, QUARTERS};
    use std::sync::atomic::{AtomicI64, Ordering};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn sample(filter_key: &str) -> SchoolAnalyticsResult {
        let mut r = SchoolAnalyticsResult::empty();
        r.context = Some(AnalyticsContext {
            data_signature: "c:1:abc::s:0:def::g:0:::a:0:::i:0:".into(),
            filter_key: filter_key.into(),
            ..AnalyticsContext::default()
        });
        r.overview.total_students = 12;
        r.overview.overall_average = 6.75;
        r
    }

    fn cache_at(clock: Arc<AtomicI64>) -> PersistentCache {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        PersistentCache::from_connection(conn, &EngineConfig::default())
            .with_clock(Arc::new(move || clock.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn round_trip_within_max_age() {
        let now = Arc::new(AtomicI64::new(1_000));
        let cache = cache_at(now.clone());
        let r = sample("k1");
        cache.set("k1", &r).await;
        now.store(1_000 + 6 * DAY_MS, Ordering::SeqCst);
        assert_eq!(cache.get("k1").await, Some(r));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn computed_result_round_trips_exactly() {
        let classes = vec![SchoolClass {
            id: "c1".into(),
            name: "1º A".into(),
            series: "1º".into(),
            start_calendar_year: Some(2025),
            ..SchoolClass::default()
        }];
        let students = (0..60)
            .map(|n| Student {
                id: format!("s{n}"),
                name: format!("Aluno {n}"),
                class_id: "c1".into(),
                status: "active".into(),
                ..Student::default()
            })
            .collect::<Vec<_>>();
        let grades = students
            .iter()
            .enumerate()
            .flat_map(|(n, s)| {
                QUARTERS.iter().take(3).enumerate().map(move |(q, quarter)| Grade {
                    student_id: s.id.clone(),
                    class_id: "c1".into(),
                    subject: if q % 2 == 0 { "Matemática" } else { "Arte" }.into(),
                    quarter: quarter.to_string(),
                    grade: ((n + q) as f64 / 9.7) % 10.0,
                    ..Grade::default()
                })
            })
            .collect();
        let data = Dataset {
            students,
            classes,
            grades,
            ..Dataset::default()
        };
        let r = calc::compute_dataset(&data, &AnalyticsFilters::default());
        assert!(r.has_valid_context());
        assert!(!r.student_predictions.is_empty());

        let cache = cache_at(Arc::new(AtomicI64::new(0)));
        cache.set("computed", &r).await;
        assert_eq!(cache.get("computed").await, Some(r));
    }

    #[tokio::test]
    async fn expired_entry_misses_and_is_removed() {
        let now = Arc::new(AtomicI64::new(1_000));
        let cache = cache_at(now.clone());
        cache.set("k1", &sample("k1")).await;
        now.store(1_000 + 7 * DAY_MS + 1, Ordering::SeqCst);
        assert_eq!(cache.get("k1").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn overflow_evicts_oldest_first() {
        let now = Arc::new(AtomicI64::new(0));
        let cache = cache_at(now.clone());
        for i in 0..55 {
            now.store(i * 1_000, Ordering::SeqCst);
            cache.set(&format!("k{i:02}"), &sample("f")).await;
        }
        assert_eq!(cache.len().await, 50);
        for i in 0..5 {
            assert_eq!(cache.get(&format!("k{i:02}")).await, None);
        }
        assert!(cache.get("k05").await.is_some());
        assert!(cache.get("k54").await.is_some());
    }

    #[tokio::test]
    async fn entries_without_context_are_discarded() {
        let now = Arc::new(AtomicI64::new(0));
        let cache = cache_at(now);
        cache.set("bare", &SchoolAnalyticsResult::empty()).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("bare").await, None);
        assert!(cache.is_empty().await);

        cache
            .run("corrupt", |conn| {
                conn.execute(
                    "INSERT INTO analytics_results(key, result, created_at) VALUES('junk', '{not json', 0)",
                    [],
                )?;
                Ok(())
            })
            .await;
        assert_eq!(cache.get("junk").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn unavailable_cache_always_misses() {
        let cache = PersistentCache::unavailable(&EngineConfig::default());
        cache.set("k1", &sample("k1")).await;
        assert_eq!(cache.get("k1").await, None);
        cache.delete("k1").await;
        assert_eq!(cache.len().await, 0);
        assert!(!cache.is_available());
    }

    #[tokio::test]
    async fn delete_removes_one_entry() {
        let cache = cache_at(Arc::new(AtomicI64::new(0)));
        cache.set("a", &sample("a")).await;
        cache.set("b", &sample("b")).await;
        cache.delete("a").await;
        assert_eq!(cache.get("a").await, None);
        assert!(cache.get("b").await.is_some());
    }
}
