use crate::cache_key::cache_key;
use crate::calc::{sort_class_ranking, RankingSort, RankingSortKey, SortDir};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{AnalyticsFilters, Dataset};
use crate::signature::dataset_signature;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn parse_filters(req: &Request) -> Result<AnalyticsFilters, serde_json::Value> {
    match req.params.get("filters") {
        None | Some(serde_json::Value::Null) => Ok(AnalyticsFilters::default()),
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| err(&req.id, "bad_params", format!("invalid filters: {e}"), None)),
    }
}

fn parse_ranking(req: &Request) -> Result<Option<RankingSort>, serde_json::Value> {
    let Some(raw) = req.params.get("ranking").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let sort_by = raw
        .get("sortBy")
        .and_then(|v| v.as_str())
        .unwrap_or("average");
    let Some(key) = RankingSortKey::parse(sort_by) else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("unknown ranking.sortBy: {}", sort_by),
            Some(json!({ "sortBy": sort_by })),
        ));
    };

    let mut sort = RankingSort::by(key);
    match raw.get("sortDir").and_then(|v| v.as_str()) {
        None => {}
        Some("asc") => sort.dir = SortDir::Asc,
        Some("desc") => sort.dir = SortDir::Desc,
        Some(other) => {
            return Err(err(
                &req.id,
                "bad_params",
                "ranking.sortDir must be asc or desc",
                Some(json!({ "sortDir": other })),
            ))
        }
    }
    Ok(Some(sort))
}

/// Empty when there is nothing to cache.
fn current_cache_key(data: &Dataset, filters: &AnalyticsFilters) -> String {
    if data.is_empty() {
        return String::new();
    }
    cache_key(&dataset_signature(data), filters)
}

fn handle_analytics_set_data(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data: Dataset = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid dataset: {e}"), None),
    };
    let signature = dataset_signature(&data);
    let counts = data.counts();
    info!(
        students = counts.students,
        classes = counts.classes,
        grades = counts.grades,
        attendance = counts.attendance,
        incidents = counts.incidents,
        "dataset received"
    );
    state.data = Arc::new(data);
    ok(
        &req.id,
        json!({
            "signature": signature,
            "counts": counts
        }),
    )
}

async fn handle_analytics_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let filters = match parse_filters(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ranking = match parse_ranking(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let data = state.data.clone();
    if let Err(e) = state.coordinator.sync(&data, &filters).await {
        return engine_err(&req.id, &e);
    }
    let view = match state.coordinator.settle().await {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };

    let mut analytics = view.analytics;
    if let Some(sort) = ranking {
        let mut sorted = (*analytics).clone();
        sort_class_ranking(&mut sorted.class_ranking, sort);
        analytics = Arc::new(sorted);
    }
    let analytics = match serde_json::to_value(analytics.as_ref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_result", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "analytics": analytics,
            "loading": view.loading,
            "cacheKey": current_cache_key(&data, &filters)
        }),
    )
}

fn handle_analytics_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut status = match serde_json::to_value(state.coordinator.status()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_result", e.to_string(), None),
    };
    status["worker"] = json!(state.coordinator.worker_metrics());
    ok(&req.id, status)
}

async fn handle_analytics_cache_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match required_str(req, "key") {
        Ok(v) => v,
        Err(e) => return e,
    };
    state.coordinator.cache().delete(&key).await;
    ok(&req.id, json!({ "key": key }))
}

fn handle_analytics_cache_key(state: &mut AppState, req: &Request) -> serde_json::Value {
    let filters = match parse_filters(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "cacheKey": current_cache_key(&state.data, &filters) }),
    )
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.setData" => Some(handle_analytics_set_data(state, req)),
        "analytics.compute" => Some(handle_analytics_compute(state, req).await),
        "analytics.status" => Some(handle_analytics_status(state, req)),
        "analytics.cache.delete" => Some(handle_analytics_cache_delete(state, req).await),
        "analytics.cacheKey" => Some(handle_analytics_cache_key(state, req)),
        _ => None,
    }
}
