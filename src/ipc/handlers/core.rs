use crate::cache::PersistentCache;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // An unopenable cache only costs recomputation; the workspace still switches.
    let cache = PersistentCache::open(&path, &state.config);
    let cache_available = cache.is_available();
    state.coordinator.set_cache(cache);
    state.workspace = Some(path.clone());
    info!(workspace = %path.display(), cache_available, "workspace selected");

    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "cacheAvailable": cache_available
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
