//! Interactive side of the engine: decides whether a selection is already visible, already in
//! flight, stored in the persistent cache, or needs the worker, and drops replies that arrive for
//! superseded requests.

use crate::cache::PersistentCache;
use crate::cache_key::cache_key;
use crate::calc::SchoolAnalyticsResult;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::{AnalyticsFilters, Dataset};
use crate::signature::dataset_signature;
use crate::worker::{ComputeFault, MetricsSnapshot, WorkerHandle, WorkerMessage, WorkerReply};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

/// What the caller should display.
#[derive(Debug, Clone)]
pub struct AnalyticsView {
    pub analytics: Arc<SchoolAnalyticsResult>,
    pub loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Applied,
    /// The reply answered a request that is no longer the latest one.
    Stale,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    pub loading: bool,
    pub request_id: u64,
    pub last_applied_key: String,
    pub last_requested_key: String,
    pub data_signature: String,
}

pub struct Coordinator {
    worker: WorkerHandle,
    replies: UnboundedReceiver<WorkerReply>,
    cache: PersistentCache,
    request_id: u64,
    request_keys: HashMap<u64, String>,
    last_applied_key: String,
    last_requested_key: String,
    last_data_signature: String,
    analytics: Arc<SchoolAnalyticsResult>,
    loading: bool,
}

impl Coordinator {
    pub fn new(config: &EngineConfig, cache: PersistentCache) -> Result<Self> {
        let (worker, replies) = WorkerHandle::spawn(config)?;
        Ok(Self {
            worker,
            replies,
            cache,
            request_id: 0,
            request_keys: HashMap::new(),
            last_applied_key: String::new(),
            last_requested_key: String::new(),
            last_data_signature: String::new(),
            analytics: Arc::new(SchoolAnalyticsResult::empty()),
            loading: false,
        })
    }

    pub fn cache(&self) -> &PersistentCache {
        &self.cache
    }

    pub fn set_cache(&mut self, cache: PersistentCache) {
        info!(available = cache.is_available(), "analytics cache attached");
        self.cache = cache;
    }

    pub fn view(&self) -> AnalyticsView {
        AnalyticsView {
            analytics: self.analytics.clone(),
            loading: self.loading,
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            loading: self.loading,
            request_id: self.request_id,
            last_applied_key: self.last_applied_key.clone(),
            last_requested_key: self.last_requested_key.clone(),
            data_signature: self.last_data_signature.clone(),
        }
    }

    pub fn worker_metrics(&self) -> MetricsSnapshot {
        self.worker.metrics()
    }

    /// Brings the visible result in line with `data` and `filters`. Returns immediately; when a
    /// worker request was issued the view is `loading` until its reply is applied.
    pub async fn sync(
        &mut self,
        data: &Arc<Dataset>,
        filters: &AnalyticsFilters,
    ) -> Result<AnalyticsView> {
        if data.is_empty() {
            self.reset();
            return Ok(self.view());
        }

        let signature = dataset_signature(data);
        let key = cache_key(&signature, filters);
        if signature != self.last_data_signature {
            debug!(%signature, "dataset changed");
            self.worker.send(WorkerMessage::SetData { data: data.clone() })?;
            self.last_data_signature = signature;
        }

        if key == self.last_applied_key {
            self.loading = false;
            return Ok(self.view());
        }
        if key == self.last_requested_key {
            return Ok(self.view());
        }

        if let Some(stored) = self.cache.get(&key).await {
            debug!(%key, "persistent cache hit");
            // Whatever is still in flight answers an older selection now.
            self.request_id += 1;
            self.request_keys.clear();
            self.last_requested_key.clear();
            self.analytics = Arc::new(stored);
            self.last_applied_key = key;
            self.loading = false;
            return Ok(self.view());
        }

        self.request_id += 1;
        self.request_keys.clear();
        self.request_keys.insert(self.request_id, key.clone());
        self.last_requested_key = key;
        self.loading = true;
        self.worker.send(WorkerMessage::SetFilters {
            request_id: self.request_id,
            filters: filters.clone(),
        })?;
        Ok(self.view())
    }

    /// Applies a worker reply if it answers the latest request and persists its result.
    pub async fn apply_reply(&mut self, reply: WorkerReply) -> Result<ReplyOutcome> {
        let key = self.request_keys.remove(&reply.request_id);
        if reply.request_id != self.request_id {
            debug!(
                request_id = reply.request_id,
                latest = self.request_id,
                "discarding stale analytics reply"
            );
            return Ok(ReplyOutcome::Stale);
        }

        self.loading = false;
        match reply.result {
            Ok(result) => {
                self.analytics = result.clone();
                if let Some(key) = key {
                    self.cache.set(&key, &result).await;
                    self.last_applied_key = key;
                }
                Ok(ReplyOutcome::Applied)
            }
            Err(ComputeFault(message)) => {
                error!(request_id = reply.request_id, %message, "analytics request failed");
                // Let the same selection be retried.
                self.last_requested_key.clear();
                Err(EngineError::ComputeFailed(message))
            }
        }
    }

    /// Waits for and applies replies until nothing is loading.
    pub async fn settle(&mut self) -> Result<AnalyticsView> {
        while self.loading {
            let reply = self
                .replies
                .recv()
                .await
                .ok_or(EngineError::WorkerUnavailable)?;
            self.apply_reply(reply).await?;
        }
        Ok(self.view())
    }

    fn reset(&mut self) {
        // Replies still queued for the old data must not replace the empty result.
        self.request_id += 1;
        self.analytics = Arc::new(SchoolAnalyticsResult::empty());
        self.loading = false;
        self.last_data_signature.clear();
        self.last_applied_key.clear();
        self.last_requested_key.clear();
        self.request_keys.clear();
    }

    pub fn shutdown(self) {
        self.worker.shutdown();
    }
}
