//! The read API the dashboard talks to. Handlers parse query strings
//! the way the UI sends them (lenient integer defaults, strict date
//! errors), call into the query engine, and encode JSON.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Deserialize;
use spanlight_core::api::{
    EndpointLatency, EndpointMetrics, HeatmapPoint, SearchResponse, ServiceDependency,
    ServiceMetrics, SortField, SortOption, SortOrder, SpanDetail, TimeCount, TimePoint, TraceSpan,
    TraceSummary,
};
use spanlight_core::error::{Result, SpanlightError};
use spanlight_core::time::{DateRange, resolve_date_range};
use spanlight_store::Store;

pub struct ApiError(SpanlightError);

impl From<SpanlightError> for ApiError {
    fn from(err: SpanlightError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SpanlightError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            SpanlightError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            SpanlightError::SpanNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

pub fn router(store: Store) -> Router {
    Router::new()
        .route("/v1/traces/slowest", get(top_slow_traces))
        .route("/v1/traces/service/{service}", get(service_traces))
        .route("/v1/traces/endpoints", get(endpoint_latencies))
        .route("/v1/traces/dependencies", get(service_dependencies))
        .route("/v1/traces/heatmap", get(trace_heatmap))
        .route("/v1/traces/{trace_id}", get(trace_details))
        .route("/v1/spans/{span_id}", get(span_details))
        .route("/v1/search", get(search))
        .route("/api/metrics/traces", get(trace_metrics))
        .route("/api/metrics/services", get(service_metrics))
        .route("/api/metrics/endpoints", get(endpoint_metrics))
        .route("/api/metrics/pseries", get(percentile_series))
        .route("/api/metrics/avg", get(avg_duration))
        .with_state(store)
}

pub async fn run_api_server(store: Store, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SpanlightError::Io(format!("bind api listener failed: {e}")))?;
    tracing::info!(%addr, "query api listening");
    axum::serve(listener, router(store))
        .await
        .map_err(|e| SpanlightError::Io(format!("api server failed: {e}")))
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    start: Option<String>,
    end: Option<String>,
    #[serde(rename = "timeRange")]
    time_range: Option<String>,
}

impl RangeParams {
    fn resolve(&self) -> Result<DateRange> {
        resolve_date_range(
            self.start.as_deref(),
            self.end.as_deref(),
            self.time_range.as_deref(),
        )
    }

    fn resolve_or(&self, default_time_range: &str) -> Result<DateRange> {
        resolve_date_range(
            self.start.as_deref(),
            self.end.as_deref(),
            Some(self.time_range.as_deref().unwrap_or(default_time_range)),
        )
    }
}

#[derive(Debug, Deserialize)]
struct SlowestParams {
    n: Option<String>,
}

async fn top_slow_traces(
    State(store): State<Store>,
    Query(params): Query<SlowestParams>,
) -> std::result::Result<Json<Vec<TraceSummary>>, ApiError> {
    let n: u32 = params
        .n
        .as_deref()
        .unwrap_or("10")
        .parse()
        .map_err(|_| SpanlightError::MalformedRequest("invalid parameter 'n'".to_string()))?;
    Ok(Json(store.get_top_slow_traces(n).await?))
}

async fn service_traces(
    State(store): State<Store>,
    Path(service): Path<String>,
) -> std::result::Result<Json<Vec<TraceSummary>>, ApiError> {
    Ok(Json(store.get_service_traces(&service).await?))
}

async fn trace_details(
    State(store): State<Store>,
    Path(trace_id): Path<String>,
) -> std::result::Result<Json<Vec<TraceSpan>>, ApiError> {
    Ok(Json(store.get_trace_details(&trace_id).await?))
}

async fn endpoint_latencies(
    State(store): State<Store>,
) -> std::result::Result<Json<Vec<EndpointLatency>>, ApiError> {
    Ok(Json(store.get_endpoint_latencies().await?))
}

async fn service_dependencies(
    State(store): State<Store>,
) -> std::result::Result<Json<Vec<ServiceDependency>>, ApiError> {
    Ok(Json(store.get_service_dependencies().await?))
}

async fn trace_heatmap(
    State(store): State<Store>,
) -> std::result::Result<Json<Vec<HeatmapPoint>>, ApiError> {
    Ok(Json(store.get_trace_heatmap().await?))
}

async fn span_details(
    State(store): State<Store>,
    Path(span_id): Path<String>,
) -> std::result::Result<Json<SpanDetail>, ApiError> {
    Ok(Json(store.get_span_details(&span_id).await?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
    #[serde(rename = "sortField")]
    sort_field: Option<String>,
    #[serde(rename = "sortOrder")]
    sort_order: Option<String>,
    start: Option<String>,
    end: Option<String>,
    #[serde(rename = "timeRange")]
    time_range: Option<String>,
    percentile: Option<String>,
}

async fn search(
    State(store): State<Store>,
    Query(params): Query<SearchParams>,
) -> std::result::Result<Json<SearchResponse>, ApiError> {
    let page = positive_or(params.page.as_deref(), 1);
    let page_size = positive_or(params.page_size.as_deref(), 10);
    let percentile = params
        .percentile
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(95);
    let sort = SortOption {
        field: SortField::parse(params.sort_field.as_deref().unwrap_or_default()),
        order: SortOrder::parse(params.sort_order.as_deref().unwrap_or_default()),
    };
    let range = resolve_date_range(
        params.start.as_deref(),
        params.end.as_deref(),
        params.time_range.as_deref(),
    )?;

    let response = store
        .search_spans(
            &range,
            params.query.as_deref().unwrap_or_default(),
            page,
            page_size,
            sort,
            percentile,
        )
        .await?;
    Ok(Json(response))
}

async fn trace_metrics(
    State(store): State<Store>,
    Query(params): Query<RangeParams>,
) -> std::result::Result<Json<Vec<TimeCount>>, ApiError> {
    let range = params.resolve()?;
    Ok(Json(store.get_trace_counts(&range).await?))
}

async fn service_metrics(
    State(store): State<Store>,
    Query(params): Query<RangeParams>,
) -> std::result::Result<Json<Vec<ServiceMetrics>>, ApiError> {
    // The services dashboard defaults to the last day when no range is
    // sent.
    let range = params.resolve_or("24h")?;
    Ok(Json(store.get_service_metrics(&range).await?))
}

async fn endpoint_metrics(
    State(store): State<Store>,
    Query(params): Query<RangeParams>,
) -> std::result::Result<Json<Vec<EndpointMetrics>>, ApiError> {
    let range = params.resolve()?;
    Ok(Json(store.get_endpoint_metrics(&range).await?))
}

#[derive(Debug, Deserialize)]
struct PercentileParams {
    start: Option<String>,
    end: Option<String>,
    #[serde(rename = "timeRange")]
    time_range: Option<String>,
    percentile: Option<String>,
}

async fn percentile_series(
    State(store): State<Store>,
    Query(params): Query<PercentileParams>,
) -> std::result::Result<Json<Vec<TimePoint>>, ApiError> {
    let percentile = params
        .percentile
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(95);
    let range = resolve_date_range(
        params.start.as_deref(),
        params.end.as_deref(),
        params.time_range.as_deref(),
    )?;
    Ok(Json(store.get_percentile_series(&range, percentile).await?))
}

async fn avg_duration(
    State(store): State<Store>,
    Query(params): Query<RangeParams>,
) -> std::result::Result<Json<Vec<TimePoint>>, ApiError> {
    let range = params.resolve()?;
    Ok(Json(store.get_avg_duration(&range).await?))
}

/// Lenient integer parsing for paging params: anything unparseable or
/// below 1 falls back to the default, matching what the dashboard
/// already tolerates.
fn positive_or(input: Option<&str>, default: u32) -> u32 {
    input
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_or_falls_back() {
        assert_eq!(positive_or(None, 10), 10);
        assert_eq!(positive_or(Some("abc"), 10), 10);
        assert_eq!(positive_or(Some("0"), 10), 10);
        assert_eq!(positive_or(Some("-3"), 10), 10);
        assert_eq!(positive_or(Some("2"), 10), 2);
    }

    #[test]
    fn range_params_default_only_when_asked() {
        let params = RangeParams {
            start: None,
            end: None,
            time_range: None,
        };
        assert!(params.resolve().unwrap().is_empty());
        assert!(!params.resolve_or("24h").unwrap().is_empty());
    }
}
