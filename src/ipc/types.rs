use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::EngineConfig;
use crate::coordinator::Coordinator;
use crate::model::Dataset;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub config: EngineConfig,
    /// Last dataset pushed by the host; shared with the worker without copying.
    pub data: Arc<Dataset>,
    pub coordinator: Coordinator,
}
