//! Normalises decoded OTLP exports into canonical span records:
//! attribute values flatten to text, identifiers become base64, and
//! each resource-spans group gets a fresh resource id.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use spanlight_core::model::{Attribute, Span, SpanEvent};
use uuid::Uuid;

pub fn normalize_request(req: &ExportTraceServiceRequest) -> Vec<Span> {
    let mut spans = Vec::new();

    for rs in &req.resource_spans {
        let resource_attributes = rs
            .resource
            .as_ref()
            .map(|r| flatten_attributes(&r.attributes))
            .unwrap_or_default();
        let resource_id = Uuid::new_v4().to_string();

        for ss in &rs.scope_spans {
            let scope_name = ss
                .scope
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default();

            for span in &ss.spans {
                spans.push(Span {
                    trace_id: encode_id(&span.trace_id),
                    span_id: encode_id(&span.span_id),
                    parent_span_id: encode_id(&span.parent_span_id),
                    flags: span.flags as i32,
                    name: span.name.clone(),
                    start_time_unix_nano: span.start_time_unix_nano as i64,
                    end_time_unix_nano: span.end_time_unix_nano as i64,
                    scope_name: scope_name.clone(),
                    resource_schema_url: rs.schema_url.clone(),
                    resource_id: resource_id.clone(),
                    resource_attributes: resource_attributes.clone(),
                    span_attributes: flatten_attributes(&span.attributes),
                    events: span
                        .events
                        .iter()
                        .map(|e| SpanEvent {
                            time_unix_nano: e.time_unix_nano as i64,
                            name: e.name.clone(),
                            attributes: flatten_attributes(&e.attributes),
                        })
                        .collect(),
                });
            }
        }
    }

    spans
}

/// Flatten a tagged attribute list to string pairs. Entries with no
/// value, an unknown variant, or an array that flattens to nothing are
/// dropped.
pub fn flatten_attributes(attrs: &[KeyValue]) -> Vec<Attribute> {
    let mut out = Vec::with_capacity(attrs.len());
    for kv in attrs {
        let Some(value) = kv.value.as_ref().and_then(|v| v.value.as_ref()) else {
            continue;
        };
        if let Some(flat) = flatten_value(value) {
            out.push(Attribute::new(kv.key.clone(), flat));
        }
    }
    out
}

fn flatten_value(value: &any_value::Value) -> Option<String> {
    match value {
        any_value::Value::StringValue(s) => Some(s.clone()),
        any_value::Value::BoolValue(b) => Some(b.to_string()),
        any_value::Value::IntValue(i) => Some(i.to_string()),
        any_value::Value::DoubleValue(d) => Some(d.to_string()),
        any_value::Value::BytesValue(b) => Some(BASE64.encode(b)),
        any_value::Value::ArrayValue(array) => {
            let values: Vec<String> = array
                .values
                .iter()
                .filter_map(flatten_scalar)
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                return None;
            }
            if is_simple_string_array(&array.values) {
                // Comma-joined keeps plain string lists searchable.
                Some(values.join(","))
            } else {
                serde_json::to_string(&values).ok()
            }
        }
        any_value::Value::KvlistValue(kvlist) => {
            let map: BTreeMap<String, String> = flatten_attributes(&kvlist.values)
                .into_iter()
                .map(|attr| (attr.key, attr.value))
                .collect();
            serde_json::to_string(&map).ok()
        }
    }
}

/// Scalar-only flattening for array elements; nested arrays and kvlists
/// inside an array are skipped.
fn flatten_scalar(value: &AnyValue) -> Option<String> {
    match value.value.as_ref()? {
        any_value::Value::StringValue(s) => Some(s.clone()),
        any_value::Value::BoolValue(b) => Some(b.to_string()),
        any_value::Value::IntValue(i) => Some(i.to_string()),
        any_value::Value::DoubleValue(d) => Some(d.to_string()),
        any_value::Value::BytesValue(b) => Some(BASE64.encode(b)),
        _ => None,
    }
}

fn is_simple_string_array(values: &[AnyValue]) -> bool {
    values.iter().all(|v| {
        matches!(
            v.value.as_ref(),
            None | Some(any_value::Value::StringValue(_))
        )
    })
}

pub fn encode_id(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use opentelemetry_proto::tonic::common::v1::{ArrayValue, KeyValueList};
    use spanlight_testkit::{keyvalue, sample_export_request};

    use super::*;

    fn flatten_one(value: any_value::Value) -> Option<String> {
        flatten_value(&value)
    }

    #[test]
    fn scalars_flatten_to_canonical_text() {
        assert_eq!(
            flatten_one(any_value::Value::StringValue("x".into())),
            Some("x".into())
        );
        assert_eq!(
            flatten_one(any_value::Value::IntValue(42)),
            Some("42".into())
        );
        assert_eq!(
            flatten_one(any_value::Value::DoubleValue(2.5)),
            Some("2.5".into())
        );
        assert_eq!(
            flatten_one(any_value::Value::BoolValue(true)),
            Some("true".into())
        );
        assert_eq!(
            flatten_one(any_value::Value::BytesValue(vec![1, 2, 3])),
            Some("AQID".into())
        );
    }

    #[test]
    fn string_arrays_join_with_commas() {
        let array = any_value::Value::ArrayValue(ArrayValue {
            values: vec![
                AnyValue {
                    value: Some(any_value::Value::StringValue("a".into())),
                },
                AnyValue {
                    value: Some(any_value::Value::StringValue("b".into())),
                },
            ],
        });
        assert_eq!(flatten_one(array), Some("a,b".into()));
    }

    #[test]
    fn mixed_arrays_encode_as_json_list() {
        let array = any_value::Value::ArrayValue(ArrayValue {
            values: vec![
                AnyValue {
                    value: Some(any_value::Value::StringValue("a".into())),
                },
                AnyValue {
                    value: Some(any_value::Value::IntValue(7)),
                },
            ],
        });
        assert_eq!(flatten_one(array), Some(r#"["a","7"]"#.into()));
    }

    #[test]
    fn empty_array_drops_the_entry() {
        let array = any_value::Value::ArrayValue(ArrayValue { values: vec![] });
        assert_eq!(flatten_one(array), None);

        let attrs = vec![KeyValue {
            key: "empty".into(),
            value: Some(AnyValue {
                value: Some(any_value::Value::ArrayValue(ArrayValue { values: vec![] })),
            }),
        }];
        assert!(flatten_attributes(&attrs).is_empty());
    }

    #[test]
    fn kvlist_encodes_as_sorted_json_object() {
        let kvlist = any_value::Value::KvlistValue(KeyValueList {
            values: vec![keyvalue("b", "2"), keyvalue("a", "1")],
        });
        assert_eq!(flatten_one(kvlist), Some(r#"{"a":"1","b":"2"}"#.into()));
    }

    #[test]
    fn valueless_entries_are_dropped() {
        let attrs = vec![
            KeyValue {
                key: "none".into(),
                value: None,
            },
            keyvalue("kept", "v"),
        ];
        let flat = flatten_attributes(&attrs);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].key, "kept");
    }

    #[test]
    fn normalizes_full_export() {
        let req = sample_export_request();
        let spans = normalize_request(&req);
        assert_eq!(spans.len(), 2);

        let root = &spans[0];
        assert_eq!(root.name, "GET /checkout");
        assert_eq!(root.scope_name, "checkout");
        assert_eq!(root.trace_id, BASE64.encode([1u8; 16]));
        assert_eq!(root.span_id, BASE64.encode([2u8; 8]));
        assert_eq!(root.parent_span_id, "");
        assert!(root.is_root());
        assert_eq!(
            root.resource_attributes,
            vec![Attribute::new("service.name", "checkout")]
        );
        assert!(!root.resource_id.is_empty());

        let child = &spans[1];
        assert_eq!(child.parent_span_id, root.span_id);
        assert_eq!(child.resource_id, root.resource_id);
        assert_eq!(child.events.len(), 1);
        assert_eq!(child.events[0].name, "exception");
    }
}
