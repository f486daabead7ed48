//! JSON types served by the read API. Field renames here are the wire
//! contract with the dashboard; everything else stays snake_case.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One slow/recent trace row: the root span's identity and duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub name: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    pub span_id: String,
    pub parent_span_id: String,
    pub name: String,
    pub service: String,
    pub start_time_unix_nano: i64,
    pub end_time_unix_nano: i64,
    pub duration_ms: f64,
    #[serde(rename = "hasError")]
    pub has_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointLatency {
    pub endpoint: String,
    pub service: String,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p90_duration_ms: f64,
    pub p99_duration_ms: f64,
    pub request_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDependency {
    pub parent_service: String,
    pub child_service: String,
    pub call_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub hour: DateTime<Utc>,
    pub trace_count: u64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanDetail {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: String,
    pub name: String,
    pub service: String,
    pub start_time_unix_nano: i64,
    pub end_time_unix_nano: i64,
    pub duration_ms: f64,
    pub avg_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p90_duration_ms: f64,
    pub p99_duration_ms: f64,
    pub duration_diff_percent: f64,
    #[serde(rename = "hasError")]
    pub has_error: bool,
    pub resource_attributes: BTreeMap<String, String>,
    pub span_attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub trace_id: String,
    pub span_id: String,
    pub name: String,
    pub service: String,
    pub duration_ms: f64,
    pub start_time_unix_nano: i64,
    pub end_time_unix_nano: i64,
    pub resource_attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(rename = "totalCount")]
    pub total_count: u64,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    #[serde(rename = "percentileSeries")]
    pub percentile_series: Vec<TimePoint>,
    #[serde(rename = "traceCountSeries")]
    pub trace_count_series: Vec<TimePoint>,
    #[serde(rename = "avgDurationSeries")]
    pub avg_duration_series: Vec<TimePoint>,
}

/// A gap-padded series point; `timestamp` is the bucket start in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeCount {
    pub timestamp: DateTime<Utc>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub service: String,
    pub count: u64,
    pub avg_duration_ms: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMetrics {
    pub endpoint: String,
    pub count: u64,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    StartTime,
    EndTime,
    Duration,
}

impl SortField {
    pub fn parse(input: &str) -> Self {
        match input {
            "end_time" => Self::EndTime,
            "duration" => Self::Duration,
            _ => Self::StartTime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(input: &str) -> Self {
        match input {
            "asc" => Self::Asc,
            _ => Self::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortOption {
    pub field: SortField,
    pub order: SortOrder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_defaults() {
        assert_eq!(SortField::parse(""), SortField::StartTime);
        assert_eq!(SortField::parse("bogus"), SortField::StartTime);
        assert_eq!(SortField::parse("duration"), SortField::Duration);
        assert_eq!(SortOrder::parse(""), SortOrder::Desc);
        assert_eq!(SortOrder::parse("asc"), SortOrder::Asc);
        assert_eq!(SortOrder::parse("descending"), SortOrder::Desc);
    }

    #[test]
    fn search_response_wire_names() {
        let response = SearchResponse {
            results: Vec::new(),
            total_count: 0,
            page: 1,
            page_size: 10,
            percentile_series: Vec::new(),
            trace_count_series: Vec::new(),
            avg_duration_series: Vec::new(),
        };
        let json = serde_json::to_value(&response).unwrap();
        for key in [
            "results",
            "totalCount",
            "page",
            "pageSize",
            "percentileSeries",
            "traceCountSeries",
            "avgDurationSeries",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn series_points_serialize_rfc3339() {
        let point = TimePoint {
            timestamp: DateTime::from_timestamp(1_704_067_200, 0).unwrap(),
            value: 1.5,
        };
        let json = serde_json::to_string(&point).unwrap();
        assert!(json.contains("2024-01-01T00:00:00Z"));
    }
}
