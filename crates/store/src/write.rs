use clickhouse::Row;
use serde::Serialize;
use spanlight_core::error::{Result, SpanlightError};
use spanlight_core::model::Span;

use crate::Store;

/// Wire row for the denormalised table. Attribute pairs and events are
/// flattened into the store's parallel-array columns; serde renames are
/// the column names.
#[derive(Debug, Row, Serialize)]
pub(crate) struct SpanRow {
    trace_id: String,
    span_id: String,
    parent_span_id: String,
    flags: i32,
    name: String,
    start_time_unix_nano: i64,
    end_time_unix_nano: i64,
    scope_name: String,
    resource_schema_url: String,
    resource_id: String,
    #[serde(rename = "resource_attributes.key")]
    resource_attr_keys: Vec<String>,
    #[serde(rename = "resource_attributes.value")]
    resource_attr_values: Vec<String>,
    #[serde(rename = "span_attributes.key")]
    span_attr_keys: Vec<String>,
    #[serde(rename = "span_attributes.value")]
    span_attr_values: Vec<String>,
    #[serde(rename = "events.time_unix_nano")]
    event_times: Vec<i64>,
    #[serde(rename = "events.name")]
    event_names: Vec<String>,
    #[serde(rename = "events.attributes.key")]
    event_attr_keys: Vec<Vec<String>>,
    #[serde(rename = "events.attributes.value")]
    event_attr_values: Vec<Vec<String>>,
}

impl From<&Span> for SpanRow {
    fn from(span: &Span) -> Self {
        let (resource_attr_keys, resource_attr_values) = split_pairs(&span.resource_attributes);
        let (span_attr_keys, span_attr_values) = split_pairs(&span.span_attributes);

        let mut event_times = Vec::with_capacity(span.events.len());
        let mut event_names = Vec::with_capacity(span.events.len());
        let mut event_attr_keys = Vec::with_capacity(span.events.len());
        let mut event_attr_values = Vec::with_capacity(span.events.len());
        for event in &span.events {
            event_times.push(event.time_unix_nano);
            event_names.push(event.name.clone());
            let (keys, values) = split_pairs(&event.attributes);
            event_attr_keys.push(keys);
            event_attr_values.push(values);
        }

        Self {
            trace_id: span.trace_id.clone(),
            span_id: span.span_id.clone(),
            parent_span_id: span.parent_span_id.clone(),
            flags: span.flags,
            name: span.name.clone(),
            start_time_unix_nano: span.start_time_unix_nano,
            end_time_unix_nano: span.end_time_unix_nano,
            scope_name: span.scope_name.clone(),
            resource_schema_url: span.resource_schema_url.clone(),
            resource_id: span.resource_id.clone(),
            resource_attr_keys,
            resource_attr_values,
            span_attr_keys,
            span_attr_values,
            event_times,
            event_names,
            event_attr_keys,
            event_attr_values,
        }
    }
}

fn split_pairs(attrs: &[spanlight_core::model::Attribute]) -> (Vec<String>, Vec<String>) {
    let mut keys = Vec::with_capacity(attrs.len());
    let mut values = Vec::with_capacity(attrs.len());
    for attr in attrs {
        keys.push(attr.key.clone());
        values.push(attr.value.clone());
    }
    (keys, values)
}

impl Store {
    /// Append one row per span as a single prepared batch. The batch is
    /// abandoned on any append or send error; the caller owns retry.
    pub async fn insert_spans(&self, spans: &[Span]) -> Result<()> {
        if spans.is_empty() {
            return Ok(());
        }

        let mut insert = self
            .client()
            .insert("denormalized_span")
            .map_err(|e| SpanlightError::Store(format!("prepare span batch failed: {e}")))?;

        for span in spans {
            insert
                .write(&SpanRow::from(span))
                .await
                .map_err(|e| SpanlightError::Store(format!("append span failed: {e}")))?;
        }

        insert
            .end()
            .await
            .map_err(|e| SpanlightError::Store(format!("send span batch failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use spanlight_testkit::sample_span;

    use super::*;

    #[test]
    fn row_flattens_pairs_into_parallel_arrays() {
        let span = sample_span("t1", "s1", "");
        let row = SpanRow::from(&span);

        assert_eq!(row.resource_attr_keys.len(), row.resource_attr_values.len());
        assert_eq!(row.span_attr_keys.len(), row.span_attr_values.len());
        assert_eq!(row.event_times.len(), row.event_names.len());
        assert_eq!(row.event_times.len(), row.event_attr_keys.len());
        assert_eq!(row.event_times.len(), row.event_attr_values.len());

        let idx = row
            .resource_attr_keys
            .iter()
            .position(|k| k == "service.name")
            .unwrap();
        assert_eq!(row.resource_attr_values[idx], "checkout");
    }

    #[test]
    fn spanless_collections_become_empty_arrays() {
        let mut span = sample_span("t1", "s1", "");
        span.resource_attributes.clear();
        span.events.clear();
        let row = SpanRow::from(&span);

        assert!(row.resource_attr_keys.is_empty());
        assert!(row.resource_attr_values.is_empty());
        assert!(row.event_times.is_empty());
        assert!(row.event_attr_keys.is_empty());
    }
}
