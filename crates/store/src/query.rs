use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::Deserialize;
use spanlight_core::api::{
    EndpointLatency, EndpointMetrics, HeatmapPoint, SearchResponse, SearchResult,
    ServiceDependency, ServiceMetrics, SortField, SortOption, SortOrder, SpanDetail, TimeCount,
    TimePoint, TraceSpan, TraceSummary,
};
use spanlight_core::error::{Result, SpanlightError};
use spanlight_core::time::{DateRange, from_unix_seconds, interval_for, pad_series};

use crate::Store;
use crate::filter::SpanFilter;

#[derive(Row, Deserialize)]
struct TraceSummaryRow {
    trace_id: String,
    name: String,
    duration_ms: f64,
}

#[derive(Row, Deserialize)]
struct TraceSpanRow {
    span_id: String,
    parent_span_id: String,
    name: String,
    service: String,
    start_time_unix_nano: i64,
    end_time_unix_nano: i64,
    duration_ms: f64,
    has_error: u8,
}

#[derive(Row, Deserialize)]
struct EndpointLatencyRow {
    endpoint: String,
    service: String,
    avg_duration_ms: f64,
    min_duration_ms: f64,
    max_duration_ms: f64,
    p50_duration_ms: f64,
    p90_duration_ms: f64,
    p99_duration_ms: f64,
    request_count: u64,
}

#[derive(Row, Deserialize)]
struct DependencyRow {
    parent_service: String,
    child_service: String,
    call_count: u64,
}

#[derive(Row, Deserialize)]
struct HeatmapRow {
    hour: u32,
    trace_count: u64,
    avg_duration_ms: f64,
}

#[derive(Row, Deserialize)]
struct SpanDetailRow {
    span_id: String,
    trace_id: String,
    parent_span_id: String,
    name: String,
    service: String,
    start_time_unix_nano: i64,
    end_time_unix_nano: i64,
    duration_ms: f64,
    has_error: u8,
    resource_keys: Vec<String>,
    resource_values: Vec<String>,
    span_keys: Vec<String>,
    span_values: Vec<String>,
}

#[derive(Row, Deserialize)]
struct NameStatsRow {
    avg_duration_ms: f64,
    p50_duration_ms: f64,
    p90_duration_ms: f64,
    p99_duration_ms: f64,
}

#[derive(Row, Deserialize)]
struct SearchHitRow {
    trace_id: String,
    span_id: String,
    name: String,
    service: String,
    duration_ms: f64,
    start_time_unix_nano: i64,
    end_time_unix_nano: i64,
    resource_keys: Vec<String>,
    resource_values: Vec<String>,
}

#[derive(Row, Deserialize)]
struct CountRow {
    count: u64,
}

#[derive(Row, Deserialize)]
struct BucketValueRow {
    bucket: u32,
    value: f64,
}

#[derive(Row, Deserialize)]
struct BucketCountRow {
    bucket: u32,
    value: u64,
}

#[derive(Row, Deserialize)]
struct ServiceMetricsRow {
    service: String,
    count: u64,
    avg_duration_ms: f64,
    error_rate: f64,
}

#[derive(Row, Deserialize)]
struct EndpointMetricsRow {
    endpoint: String,
    count: u64,
    avg_duration_ms: f64,
    p95_duration_ms: f64,
}

impl Store {
    /// Free-text / attribute-predicate search over a window, with
    /// store-side pagination and the three chart series computed over
    /// the same filtered set (as a `stats` CTE, so filter and series
    /// can never drift apart).
    pub async fn search_spans(
        &self,
        range: &DateRange,
        query: &str,
        page: u32,
        page_size: u32,
        sort: SortOption,
        percentile: i32,
    ) -> Result<SearchResponse> {
        let filter = SpanFilter::time_window(range).with_search_query(query);
        let where_clause = filter.where_clause();

        let count_sql = format!(
            "SELECT count(DISTINCT trace_id, span_id) AS count \
             FROM denormalized_span WHERE {where_clause}"
        );
        let total: CountRow = filter
            .bind(self.client().query(&count_sql))
            .fetch_one()
            .await
            .map_err(|e| SpanlightError::Store(format!("count search results failed: {e}")))?;

        let interval = interval_for(range);
        let stats_sql = format!(
            "SELECT start_time_unix_nano, end_time_unix_nano \
             FROM denormalized_span WHERE {where_clause}"
        );
        let q = f64::from(percentile.clamp(0, 100)) / 100.0;
        let percentile_series = self
            .stats_series(
                &stats_sql,
                &filter,
                interval,
                range,
                &format!(
                    "quantile({q})((stats.end_time_unix_nano - stats.start_time_unix_nano) / 1000000)"
                ),
            )
            .await?;
        let trace_count_series = self
            .stats_series(&stats_sql, &filter, interval, range, "count() / 1.0")
            .await?;
        let avg_duration_series = self
            .stats_series(
                &stats_sql,
                &filter,
                interval,
                range,
                "avg((stats.end_time_unix_nano - stats.start_time_unix_nano) / 1000000)",
            )
            .await?;

        let order_column = match sort.field {
            SortField::StartTime => "start_time_unix_nano",
            SortField::EndTime => "end_time_unix_nano",
            SortField::Duration => "duration_ns",
        };
        let order_dir = match sort.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let offset = page.saturating_sub(1) * page_size;

        let page_sql = format!(
            "SELECT trace_id, span_id, name, scope_name AS service, \
             duration_ns / 1000000 AS duration_ms, start_time_unix_nano, end_time_unix_nano, \
             resource_attributes.key AS resource_keys, \
             resource_attributes.value AS resource_values \
             FROM denormalized_span WHERE {where_clause} \
             ORDER BY {order_column} {order_dir} LIMIT {page_size} OFFSET {offset}"
        );
        let hits: Vec<SearchHitRow> = filter
            .bind(self.client().query(&page_sql))
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("search spans failed: {e}")))?;

        Ok(SearchResponse {
            results: hits
                .into_iter()
                .map(|row| SearchResult {
                    trace_id: row.trace_id,
                    span_id: row.span_id,
                    name: row.name,
                    service: row.service,
                    duration_ms: row.duration_ms,
                    start_time_unix_nano: row.start_time_unix_nano,
                    end_time_unix_nano: row.end_time_unix_nano,
                    resource_attrs: attr_map(row.resource_keys, row.resource_values),
                })
                .collect(),
            total_count: total.count,
            page,
            page_size,
            percentile_series,
            trace_count_series,
            avg_duration_series,
        })
    }

    pub async fn get_percentile_series(
        &self,
        range: &DateRange,
        percentile: i32,
    ) -> Result<Vec<TimePoint>> {
        if range.is_empty() {
            return Err(SpanlightError::MalformedRequest(
                "invalid date range".to_string(),
            ));
        }
        let q = f64::from(percentile.clamp(0, 100)) / 100.0;
        let filter = SpanFilter::time_window(range);
        let stats_sql = format!(
            "SELECT start_time_unix_nano, end_time_unix_nano \
             FROM denormalized_span WHERE {}",
            filter.where_clause()
        );
        self.stats_series(
            &stats_sql,
            &filter,
            interval_for(range),
            range,
            &format!(
                "quantile({q})((stats.end_time_unix_nano - stats.start_time_unix_nano) / 1000000)"
            ),
        )
        .await
    }

    pub async fn get_avg_duration(&self, range: &DateRange) -> Result<Vec<TimePoint>> {
        if range.is_empty() {
            return Err(SpanlightError::MalformedRequest(
                "invalid date range".to_string(),
            ));
        }
        let filter = SpanFilter::time_window(range);
        let stats_sql = format!(
            "SELECT start_time_unix_nano, end_time_unix_nano \
             FROM denormalized_span WHERE {}",
            filter.where_clause()
        );
        self.stats_series(
            &stats_sql,
            &filter,
            interval_for(range),
            range,
            "avg((stats.end_time_unix_nano - stats.start_time_unix_nano) / 1000000)",
        )
        .await
    }

    /// Span count per bucket, zero-padded across the whole range.
    pub async fn get_trace_counts(&self, range: &DateRange) -> Result<Vec<TimeCount>> {
        let filter = SpanFilter::start_window(range);
        let interval = interval_for(range);
        let sql = format!(
            "SELECT toUnixTimestamp(toStartOfInterval(\
             fromUnixTimestamp64Nano(start_time_unix_nano), INTERVAL {interval})) AS bucket, \
             count() AS value \
             FROM denormalized_span WHERE {} \
             GROUP BY bucket ORDER BY bucket",
            filter.where_clause()
        );
        let rows: Vec<BucketCountRow> = filter
            .bind(self.client().query(&sql))
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("count spans per bucket failed: {e}")))?;

        let values: HashMap<DateTime<Utc>, u64> = rows
            .into_iter()
            .map(|r| (from_unix_seconds(i64::from(r.bucket)), r.value))
            .collect();
        Ok(pad_series(&values, interval, range)?
            .into_iter()
            .map(|(timestamp, value)| TimeCount { timestamp, value })
            .collect())
    }

    /// All spans of one trace, flat, ordered by start time.
    pub async fn get_trace_details(&self, trace_id: &str) -> Result<Vec<TraceSpan>> {
        let sql = "SELECT span_id, parent_span_id, name, scope_name AS service, \
                   start_time_unix_nano, end_time_unix_nano, \
                   duration_ns / 1000000 AS duration_ms, \
                   has(events.name, 'exception') AS has_error \
                   FROM denormalized_span WHERE trace_id = ? \
                   ORDER BY start_time_unix_nano ASC";
        let rows: Vec<TraceSpanRow> = self
            .client()
            .query(sql)
            .bind(trace_id)
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("query trace spans failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| TraceSpan {
                span_id: row.span_id,
                parent_span_id: row.parent_span_id,
                name: row.name,
                service: row.service,
                start_time_unix_nano: row.start_time_unix_nano,
                end_time_unix_nano: row.end_time_unix_nano,
                duration_ms: row.duration_ms,
                has_error: row.has_error != 0,
            })
            .collect())
    }

    /// One span plus how its duration compares to every span sharing
    /// its name.
    pub async fn get_span_details(&self, span_id: &str) -> Result<SpanDetail> {
        let sql = "SELECT span_id, trace_id, parent_span_id, name, scope_name AS service, \
                   start_time_unix_nano, end_time_unix_nano, \
                   duration_ns / 1000000 AS duration_ms, \
                   has(events.name, 'exception') AS has_error, \
                   resource_attributes.key AS resource_keys, \
                   resource_attributes.value AS resource_values, \
                   span_attributes.key AS span_keys, \
                   span_attributes.value AS span_values \
                   FROM denormalized_span WHERE span_id = ? LIMIT 1";
        let row: Option<SpanDetailRow> = self
            .client()
            .query(sql)
            .bind(span_id)
            .fetch_optional()
            .await
            .map_err(|e| SpanlightError::Store(format!("query span failed: {e}")))?;
        let Some(row) = row else {
            return Err(SpanlightError::SpanNotFound(span_id.to_string()));
        };

        let stats_sql = "SELECT avg(duration_ns / 1000000) AS avg_duration_ms, \
                         quantile(0.5)(duration_ns / 1000000) AS p50_duration_ms, \
                         quantile(0.9)(duration_ns / 1000000) AS p90_duration_ms, \
                         quantile(0.99)(duration_ns / 1000000) AS p99_duration_ms \
                         FROM denormalized_span WHERE name = ?";
        let stats: NameStatsRow = self
            .client()
            .query(stats_sql)
            .bind(&row.name)
            .fetch_one()
            .await
            .map_err(|e| SpanlightError::Store(format!("aggregate span durations failed: {e}")))?;

        let duration_diff_percent = if stats.avg_duration_ms == 0.0 {
            0.0
        } else {
            (row.duration_ms - stats.avg_duration_ms) / stats.avg_duration_ms * 100.0
        };

        Ok(SpanDetail {
            span_id: row.span_id,
            trace_id: row.trace_id,
            parent_span_id: row.parent_span_id,
            name: row.name,
            service: row.service,
            start_time_unix_nano: row.start_time_unix_nano,
            end_time_unix_nano: row.end_time_unix_nano,
            duration_ms: row.duration_ms,
            avg_duration_ms: stats.avg_duration_ms,
            p50_duration_ms: stats.p50_duration_ms,
            p90_duration_ms: stats.p90_duration_ms,
            p99_duration_ms: stats.p99_duration_ms,
            duration_diff_percent,
            has_error: row.has_error != 0,
            resource_attributes: attr_map(row.resource_keys, row.resource_values),
            span_attributes: attr_map(row.span_keys, row.span_values),
        })
    }

    /// Most recent root spans, slowest first within a start time.
    pub async fn get_top_slow_traces(&self, n: u32) -> Result<Vec<TraceSummary>> {
        let sql = "SELECT trace_id, name, duration_ns / 1000000 AS duration_ms \
                   FROM denormalized_span WHERE parent_span_id = '' \
                   ORDER BY start_time_unix_nano DESC, duration_ms DESC LIMIT ?";
        let rows: Vec<TraceSummaryRow> = self
            .client()
            .query(sql)
            .bind(n)
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("query slow traces failed: {e}")))?;
        Ok(rows.into_iter().map(trace_summary).collect())
    }

    /// Up to the 100 most recent spans emitted under one scope name.
    pub async fn get_service_traces(&self, service: &str) -> Result<Vec<TraceSummary>> {
        let sql = "SELECT trace_id, name, duration_ns / 1000000 AS duration_ms \
                   FROM denormalized_span WHERE scope_name = ? \
                   ORDER BY start_time_unix_nano DESC LIMIT 100";
        let rows: Vec<TraceSummaryRow> = self
            .client()
            .query(sql)
            .bind(service)
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("query service traces failed: {e}")))?;
        Ok(rows.into_iter().map(trace_summary).collect())
    }

    pub async fn get_endpoint_latencies(&self) -> Result<Vec<EndpointLatency>> {
        let sql = "SELECT name AS endpoint, scope_name AS service, \
                   avg(duration_ns / 1000000) AS avg_duration_ms, \
                   min(duration_ns / 1000000) AS min_duration_ms, \
                   max(duration_ns / 1000000) AS max_duration_ms, \
                   quantile(0.5)(duration_ns / 1000000) AS p50_duration_ms, \
                   quantile(0.9)(duration_ns / 1000000) AS p90_duration_ms, \
                   quantile(0.99)(duration_ns / 1000000) AS p99_duration_ms, \
                   count(*) AS request_count \
                   FROM denormalized_span WHERE parent_span_id = '' \
                   GROUP BY name, scope_name ORDER BY avg_duration_ms DESC";
        let rows: Vec<EndpointLatencyRow> = self
            .client()
            .query(sql)
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("query endpoint latencies failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| EndpointLatency {
                endpoint: row.endpoint,
                service: row.service,
                avg_duration_ms: row.avg_duration_ms,
                min_duration_ms: row.min_duration_ms,
                max_duration_ms: row.max_duration_ms,
                p50_duration_ms: row.p50_duration_ms,
                p90_duration_ms: row.p90_duration_ms,
                p99_duration_ms: row.p99_duration_ms,
                request_count: row.request_count,
            })
            .collect())
    }

    /// Parent→child call edges across differing scopes, busiest first.
    pub async fn get_service_dependencies(&self) -> Result<Vec<ServiceDependency>> {
        let sql = "SELECT s1.scope_name AS parent_service, s2.scope_name AS child_service, \
                   count(*) AS call_count \
                   FROM denormalized_span AS s1 \
                   INNER JOIN denormalized_span AS s2 ON s1.span_id = s2.parent_span_id \
                   WHERE s1.scope_name != s2.scope_name \
                   GROUP BY s1.scope_name, s2.scope_name \
                   ORDER BY call_count DESC";
        let rows: Vec<DependencyRow> = self
            .client()
            .query(sql)
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("query service dependencies failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| ServiceDependency {
                parent_service: row.parent_service,
                child_service: row.child_service,
                call_count: row.call_count,
            })
            .collect())
    }

    /// Root-span count and average duration for the last 24 hour
    /// buckets, newest first.
    pub async fn get_trace_heatmap(&self) -> Result<Vec<HeatmapPoint>> {
        let sql = "SELECT toUnixTimestamp(toStartOfHour(\
                   fromUnixTimestamp64Nano(start_time_unix_nano))) AS hour, \
                   count() AS trace_count, \
                   avg((end_time_unix_nano - start_time_unix_nano) / 1000000) AS avg_duration_ms \
                   FROM denormalized_span WHERE parent_span_id = '' \
                   GROUP BY hour ORDER BY hour DESC LIMIT 24";
        let rows: Vec<HeatmapRow> = self
            .client()
            .query(sql)
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("query trace heatmap failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| HeatmapPoint {
                hour: from_unix_seconds(i64::from(row.hour)),
                trace_count: row.trace_count,
                avg_duration_ms: row.avg_duration_ms,
            })
            .collect())
    }

    /// Per-service span volume and latency; `error_rate` is the share
    /// of spans slower than twice the service average.
    pub async fn get_service_metrics(&self, range: &DateRange) -> Result<Vec<ServiceMetrics>> {
        let filter = SpanFilter::start_window(range);
        let sql = format!(
            "WITH durations AS (\
                 SELECT scope_name AS service, \
                 (end_time_unix_nano - start_time_unix_nano) / 1000000 AS duration_ms \
                 FROM denormalized_span WHERE {}\
             ), \
             service_stats AS (\
                 SELECT service, avg(duration_ms) AS avg_duration \
                 FROM durations GROUP BY service\
             ) \
             SELECT d.service AS service, count(*) AS count, \
             avg(d.duration_ms) AS avg_duration_ms, \
             countIf(d.duration_ms > s.avg_duration * 2) / count(*) * 100 AS error_rate \
             FROM durations AS d \
             INNER JOIN service_stats AS s ON d.service = s.service \
             GROUP BY d.service ORDER BY count DESC",
            filter.where_clause()
        );
        let rows: Vec<ServiceMetricsRow> = filter
            .bind(self.client().query(&sql))
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("query service metrics failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| ServiceMetrics {
                service: row.service,
                count: row.count,
                avg_duration_ms: row.avg_duration_ms,
                error_rate: row.error_rate,
            })
            .collect())
    }

    pub async fn get_endpoint_metrics(&self, range: &DateRange) -> Result<Vec<EndpointMetrics>> {
        let filter = SpanFilter::start_window(range);
        let sql = format!(
            "WITH durations AS (\
                 SELECT name AS endpoint, \
                 (end_time_unix_nano - start_time_unix_nano) / 1000000 AS duration_ms \
                 FROM denormalized_span WHERE {}\
             ) \
             SELECT endpoint, count(*) AS count, \
             avg(duration_ms) AS avg_duration_ms, \
             quantile(0.95)(duration_ms) AS p95_duration_ms \
             FROM durations GROUP BY endpoint LIMIT 10",
            filter.where_clause()
        );
        let rows: Vec<EndpointMetricsRow> = filter
            .bind(self.client().query(&sql))
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("query endpoint metrics failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| EndpointMetrics {
                endpoint: row.endpoint,
                count: row.count,
                avg_duration_ms: row.avg_duration_ms,
                p95_duration_ms: row.p95_duration_ms,
            })
            .collect())
    }

    /// Run one bucketed aggregate over a filtered span set embedded as
    /// a `stats` CTE, then pad the buckets across the range.
    async fn stats_series(
        &self,
        stats_sql: &str,
        filter: &SpanFilter,
        interval: &'static str,
        range: &DateRange,
        agg_expr: &str,
    ) -> Result<Vec<TimePoint>> {
        let sql = format!(
            "WITH stats AS ({stats_sql}) \
             SELECT toUnixTimestamp(toStartOfInterval(\
             toDateTime(stats.start_time_unix_nano / 1e9), INTERVAL {interval})) AS bucket, \
             {agg_expr} AS value \
             FROM stats GROUP BY bucket ORDER BY bucket"
        );
        let rows: Vec<BucketValueRow> = filter
            .bind(self.client().query(&sql))
            .fetch_all()
            .await
            .map_err(|e| SpanlightError::Store(format!("series query failed: {e}")))?;

        let values: HashMap<DateTime<Utc>, f64> = rows
            .into_iter()
            .map(|r| (from_unix_seconds(i64::from(r.bucket)), r.value))
            .collect();
        Ok(pad_series(&values, interval, range)?
            .into_iter()
            .map(|(timestamp, value)| TimePoint { timestamp, value })
            .collect())
    }
}

fn trace_summary(row: TraceSummaryRow) -> TraceSummary {
    TraceSummary {
        trace_id: row.trace_id,
        name: row.name,
        duration_ms: row.duration_ms,
    }
}

fn attr_map(keys: Vec<String>, values: Vec<String>) -> BTreeMap<String, String> {
    keys.into_iter().zip(values).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_map_zips_parallel_arrays() {
        let map = attr_map(
            vec!["service.name".into(), "host".into()],
            vec!["svc".into(), "web-1".into()],
        );
        assert_eq!(map.get("service.name").map(String::as_str), Some("svc"));
        assert_eq!(map.get("host").map(String::as_str), Some("web-1"));
    }

    #[test]
    fn attr_map_tolerates_length_mismatch() {
        let map = attr_map(vec!["a".into(), "b".into()], vec!["1".into()]);
        assert_eq!(map.len(), 1);
    }
}
