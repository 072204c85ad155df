//! Background compute worker.
//!
//! A dedicated thread owns the dataset, an in-memory result cache keyed by data version plus
//! filters, and the analytics computer. The interactive side talks to it only through
//! [`WorkerMessage`] values and reads [`WorkerReply`] values back; nothing mutable is shared.

use crate::cache_key::worker_key;
use crate::calc::{self, SchoolAnalyticsResult};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::{AnalyticsFilters, Dataset, YearSelector, QUARTERS};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Replace the whole dataset. Every cached result is dropped.
    SetData { data: Arc<Dataset> },
    SetFilters {
        request_id: u64,
        filters: AnalyticsFilters,
    },
}

/// The analytics computer panicked. Carries the panic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeFault(pub String);

#[derive(Debug, Clone)]
pub struct WorkerReply {
    pub request_id: u64,
    pub result: std::result::Result<Arc<SchoolAnalyticsResult>, ComputeFault>,
}

#[derive(Debug, Default)]
pub struct WorkerMetrics {
    computations: AtomicU64,
    cache_hits: AtomicU64,
    precomputed: AtomicU64,
    sweeps_abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Results computed to answer a request.
    pub computations: u64,
    /// Requests answered from the in-memory cache.
    pub cache_hits: u64,
    /// Results computed by the idle sweep.
    pub precomputed: u64,
    pub sweeps_abandoned: u64,
}

impl WorkerMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            computations: self.computations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            precomputed: self.precomputed.load(Ordering::Relaxed),
            sweeps_abandoned: self.sweeps_abandoned.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct WorkerHandle {
    tx: UnboundedSender<WorkerMessage>,
    metrics: Arc<WorkerMetrics>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Starts the worker thread. Replies arrive on the returned receiver.
    pub fn spawn(config: &EngineConfig) -> Result<(Self, UnboundedReceiver<WorkerReply>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(WorkerMetrics::default());
        let mut state = WorkerState {
            data: Arc::new(Dataset::default()),
            data_version: 0,
            results: HashMap::new(),
            token: 0,
            sweep: None,
            precompute: config.precompute,
            metrics: metrics.clone(),
            replies: reply_tx,
        };
        let thread = std::thread::Builder::new()
            .name("analytics-worker".into())
            .spawn(move || state.run(rx))
            .map_err(|_| EngineError::WorkerUnavailable)?;
        info!(precompute = config.precompute, "analytics worker started");
        Ok((
            Self {
                tx,
                metrics,
                thread,
            },
            reply_rx,
        ))
    }

    pub fn send(&self, msg: WorkerMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| EngineError::WorkerUnavailable)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Closes the message channel and waits for the thread to finish its current unit of work.
    pub fn shutdown(self) {
        let Self { tx, thread, .. } = self;
        drop(tx);
        if thread.join().is_err() {
            error!("analytics worker thread panicked");
        }
    }
}

/// Remaining combinations of an idle precompute sweep.
struct Sweep {
    token: u64,
    pending: VecDeque<AnalyticsFilters>,
}

struct WorkerState {
    data: Arc<Dataset>,
    data_version: u64,
    results: HashMap<String, Arc<SchoolAnalyticsResult>>,
    /// Bumped by every message; a sweep holding an older token is stale.
    token: u64,
    sweep: Option<Sweep>,
    precompute: bool,
    metrics: Arc<WorkerMetrics>,
    replies: UnboundedSender<WorkerReply>,
}

impl WorkerState {
    fn run(&mut self, mut rx: UnboundedReceiver<WorkerMessage>) {
        loop {
            // Incoming messages always win over the sweep.
            let msg = if self.sweep.is_some() {
                match rx.try_recv() {
                    Ok(m) => Some(m),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match rx.blocking_recv() {
                    Some(m) => Some(m),
                    None => break,
                }
            };
            match msg {
                Some(m) => self.handle(m),
                None => {
                    self.sweep_step();
                    std::thread::yield_now();
                }
            }
        }
        debug!("analytics worker stopped");
    }

    fn handle(&mut self, msg: WorkerMessage) {
        // Any pending sweep is now stale and abandons itself on its next step.
        self.token += 1;

        match msg {
            WorkerMessage::SetData { data } => {
                self.data = data;
                self.data_version += 1;
                self.results.clear();
                debug!(version = self.data_version, "analytics dataset replaced");
            }
            WorkerMessage::SetFilters {
                request_id,
                filters,
            } => {
                let key = worker_key(self.data_version, &filters);
                let result = match self.results.get(&key) {
                    Some(hit) => {
                        WorkerMetrics::bump(&self.metrics.cache_hits);
                        debug!(request_id, "worker cache hit");
                        Ok(hit.clone())
                    }
                    None => {
                        let computed = self.compute(&filters);
                        if let Ok(r) = &computed {
                            WorkerMetrics::bump(&self.metrics.computations);
                            self.results.insert(key, r.clone());
                        }
                        computed
                    }
                };
                let ok = result.is_ok();
                if self
                    .replies
                    .send(WorkerReply { request_id, result })
                    .is_err()
                {
                    debug!(request_id, "reply receiver dropped");
                }
                if ok && self.precompute && !self.data.is_empty() {
                    self.schedule_sweep(&filters);
                }
            }
        }
    }

    fn compute(
        &self,
        filters: &AnalyticsFilters,
    ) -> std::result::Result<Arc<SchoolAnalyticsResult>, ComputeFault> {
        let data = self.data.clone();
        panic::catch_unwind(AssertUnwindSafe(|| calc::compute_dataset(&data, filters)))
            .map(Arc::new)
            .map_err(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(%message, "analytics computation panicked");
                ComputeFault(message)
            })
    }

    /// Queues every school-year x quarter variant of `base` that is not cached yet.
    fn schedule_sweep(&mut self, base: &AnalyticsFilters) {
        if self.sweep.take().is_some() {
            WorkerMetrics::bump(&self.metrics.sweeps_abandoned);
        }
        let years = [
            YearSelector::All,
            YearSelector::Only(1),
            YearSelector::Only(2),
            YearSelector::Only(3),
        ];
        let quarters = std::iter::once("all").chain(QUARTERS);
        let pending = years
            .iter()
            .flat_map(|&school_year| {
                quarters.clone().map(move |quarter| AnalyticsFilters {
                    school_year,
                    quarter: quarter.to_string(),
                    ..base.clone()
                })
            })
            .filter(|f| !self.results.contains_key(&worker_key(self.data_version, f)))
            .collect::<VecDeque<_>>();
        if !pending.is_empty() {
            self.sweep = Some(Sweep {
                token: self.token,
                pending,
            });
        }
    }

    /// Computes at most one queued combination.
    fn sweep_step(&mut self) {
        let Some(sweep) = self.sweep.as_mut() else {
            return;
        };
        if sweep.token != self.token {
            self.sweep = None;
            WorkerMetrics::bump(&self.metrics.sweeps_abandoned);
            return;
        }
        let Some(filters) = sweep.pending.pop_front() else {
            self.sweep = None;
            return;
        };
        if sweep.pending.is_empty() {
            self.sweep = None;
        }

        let key = worker_key(self.data_version, &filters);
        if self.results.contains_key(&key) {
            return;
        }
        if let Ok(r) = self.compute(&filters) {
            WorkerMetrics::bump(&self.metrics.precomputed);
            self.results.insert(key, r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Grade, SchoolClass, Student};
    use std::time::Duration;

    fn dataset() -> Arc<Dataset> {
        Arc::new(Dataset {
            students: vec![Student {
                id: "s1".into(),
                name: "Ana".into(),
                class_id: "c1".into(),
                status: "active".into(),
                ..Student::default()
            }],
            classes: vec![SchoolClass {
                id: "c1".into(),
                name: "1º A".into(),
                series: "1º".into(),
                start_calendar_year: Some(2025),
                ..SchoolClass::default()
            }],
            grades: vec![Grade {
                student_id: "s1".into(),
                class_id: "c1".into(),
                subject: "Arte".into(),
                quarter: QUARTERS[0].into(),
                grade: 7.5,
                ..Grade::default()
            }],
            ..Dataset::default()
        })
    }

    fn filters_request(request_id: u64, filters: AnalyticsFilters) -> WorkerMessage {
        WorkerMessage::SetFilters {
            request_id,
            filters,
        }
    }

    async fn next(rx: &mut UnboundedReceiver<WorkerReply>) -> WorkerReply {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("reply in time")
            .expect("worker alive")
    }

    #[tokio::test]
    async fn repeated_filters_hit_memory_until_data_changes() {
        let config = EngineConfig {
            precompute: false,
            ..EngineConfig::default()
        };
        let (worker, mut rx) = WorkerHandle::spawn(&config).expect("spawn");
        worker
            .send(WorkerMessage::SetData { data: dataset() })
            .expect("send");
        worker
            .send(filters_request(1, AnalyticsFilters::default()))
            .expect("send");
        let first = next(&mut rx).await;
        assert_eq!(first.request_id, 1);
        let first = first.result.expect("computed");
        assert_eq!(first.overview.total_students, 1);

        worker
            .send(filters_request(2, AnalyticsFilters::default()))
            .expect("send");
        let second = next(&mut rx).await.result.expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(worker.metrics().cache_hits, 1);
        assert_eq!(worker.metrics().computations, 1);

        worker
            .send(WorkerMessage::SetData { data: dataset() })
            .expect("send");
        worker
            .send(filters_request(3, AnalyticsFilters::default()))
            .expect("send");
        let third = next(&mut rx).await;
        assert_eq!(third.request_id, 3);
        assert!(!Arc::ptr_eq(&first, &third.result.expect("recomputed")));
        assert_eq!(worker.metrics().computations, 2);
        worker.shutdown();
    }

    #[tokio::test]
    async fn idle_sweep_prewarms_year_and_quarter_variants() {
        let (worker, mut rx) = WorkerHandle::spawn(&EngineConfig::default()).expect("spawn");
        worker
            .send(WorkerMessage::SetData { data: dataset() })
            .expect("send");
        worker
            .send(filters_request(1, AnalyticsFilters::default()))
            .expect("send");
        next(&mut rx).await.result.expect("computed");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while worker.metrics().precomputed < 15 {
            assert!(tokio::time::Instant::now() < deadline, "sweep did not finish");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let variant = AnalyticsFilters {
            school_year: YearSelector::Only(2),
            quarter: QUARTERS[1].into(),
            ..AnalyticsFilters::default()
        };
        worker.send(filters_request(2, variant)).expect("send");
        next(&mut rx).await.result.expect("cached");
        assert_eq!(worker.metrics().cache_hits, 1);
        assert_eq!(worker.metrics().computations, 1);
        worker.shutdown();
    }

    #[tokio::test]
    async fn data_change_abandons_pending_sweep() {
        let (worker, mut rx) = WorkerHandle::spawn(&EngineConfig::default()).expect("spawn");
        // All three are queued before the worker can take a sweep step.
        worker
            .send(WorkerMessage::SetData { data: dataset() })
            .expect("send");
        worker
            .send(filters_request(1, AnalyticsFilters::default()))
            .expect("send");
        worker
            .send(WorkerMessage::SetData { data: dataset() })
            .expect("send");
        next(&mut rx).await.result.expect("computed");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while worker.metrics().sweeps_abandoned < 1 {
            assert!(tokio::time::Instant::now() < deadline, "sweep was not abandoned");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(worker.metrics().precomputed, 0);

        // The sweep never resumes for the replaced data.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.metrics().precomputed, 0);

        worker
            .send(filters_request(2, AnalyticsFilters::default()))
            .expect("send");
        assert_eq!(next(&mut rx).await.request_id, 2);
        assert_eq!(worker.metrics().computations, 2);
        assert_eq!(worker.metrics().cache_hits, 0);
        worker.shutdown();
    }

    #[tokio::test]
    async fn new_request_replaces_running_sweep() {
        let (worker, mut rx) = WorkerHandle::spawn(&EngineConfig::default()).expect("spawn");
        let variant = AnalyticsFilters {
            series: vec!["1º".into()],
            ..AnalyticsFilters::default()
        };
        worker
            .send(WorkerMessage::SetData { data: dataset() })
            .expect("send");
        worker
            .send(filters_request(1, AnalyticsFilters::default()))
            .expect("send");
        worker.send(filters_request(2, variant)).expect("send");
        assert_eq!(next(&mut rx).await.request_id, 1);
        assert_eq!(next(&mut rx).await.request_id, 2);

        // The first sweep was replaced before it took a step.
        assert!(worker.metrics().sweeps_abandoned >= 1);
        worker.shutdown();
    }

    #[tokio::test]
    async fn empty_dataset_still_answers() {
        let (worker, mut rx) = WorkerHandle::spawn(&EngineConfig::default()).expect("spawn");
        worker
            .send(filters_request(7, AnalyticsFilters::default()))
            .expect("send");
        let reply = next(&mut rx).await;
        assert_eq!(reply.request_id, 7);
        assert_eq!(reply.result.expect("result").overview.total_students, 0);
        assert_eq!(worker.metrics().precomputed, 0);
        worker.shutdown();
    }
}
