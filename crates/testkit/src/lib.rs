use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, InstrumentationScope, KeyValue, any_value,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{
    ResourceSpans, ScopeSpans, Span as OtlpSpan, span,
};
use spanlight_core::model::{Attribute, Span, SpanEvent};

pub fn keyvalue(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

/// A canonical span the way the normaliser would emit it.
pub fn sample_span(trace_id: &str, span_id: &str, parent_span_id: &str) -> Span {
    Span {
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        parent_span_id: parent_span_id.to_string(),
        flags: 0,
        name: "GET /checkout".to_string(),
        start_time_unix_nano: 1_000_000_000,
        end_time_unix_nano: 1_005_000_000,
        scope_name: "checkout".to_string(),
        resource_schema_url: String::new(),
        resource_id: "11111111-1111-4111-8111-111111111111".to_string(),
        resource_attributes: vec![
            Attribute::new("service.name", "checkout"),
            Attribute::new("host.name", "web-1"),
        ],
        span_attributes: vec![Attribute::new("http.method", "GET")],
        events: vec![SpanEvent {
            time_unix_nano: 1_002_000_000,
            name: "exception".to_string(),
            attributes: vec![Attribute::new("exception.type", "Timeout")],
        }],
    }
}

/// A two-span OTLP export: a root HTTP span and a child database span
/// carrying an exception event.
pub fn sample_export_request() -> ExportTraceServiceRequest {
    let root = OtlpSpan {
        trace_id: vec![1; 16],
        span_id: vec![2; 8],
        parent_span_id: vec![],
        name: "GET /checkout".to_string(),
        start_time_unix_nano: 1_000_000_000,
        end_time_unix_nano: 1_005_000_000,
        attributes: vec![keyvalue("http.method", "GET")],
        ..Default::default()
    };

    let child = OtlpSpan {
        trace_id: vec![1; 16],
        span_id: vec![3; 8],
        parent_span_id: vec![2; 8],
        name: "db.query".to_string(),
        start_time_unix_nano: 1_001_000_000,
        end_time_unix_nano: 1_004_000_000,
        attributes: vec![keyvalue("db.statement", "SELECT 1")],
        events: vec![span::Event {
            time_unix_nano: 1_002_000_000,
            name: "exception".to_string(),
            attributes: vec![keyvalue("exception.type", "Timeout")],
            ..Default::default()
        }],
        ..Default::default()
    };

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: vec![keyvalue("service.name", "checkout")],
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: "checkout".to_string(),
                    ..Default::default()
                }),
                spans: vec![root, child],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// A pre-1.0 OTLP JSON export: `instrumentationLibrarySpans` groups and
/// `{"Value":{"StringValue":...}}` attribute wrappers.
pub fn legacy_payload() -> serde_json::Value {
    serde_json::json!({
        "resourceSpans": [
            {
                "resource": {
                    "attributes": [
                        {
                            "key": "service.name",
                            "value": { "Value": { "StringValue": "legacy-svc" } }
                        }
                    ]
                },
                "instrumentationLibrarySpans": [
                    {
                        "instrumentationLibrary": { "name": "legacy-lib" },
                        "spans": [
                            {
                                "traceId": "0102030405060708090a0b0c0d0e0f10",
                                "spanId": "0102030405060708",
                                "name": "legacy op",
                                "startTimeUnixNano": "1000000000",
                                "endTimeUnixNano": "1005000000",
                                "attributes": [
                                    {
                                        "key": "http.method",
                                        "value": { "Value": { "StringValue": "GET" } }
                                    }
                                ]
                            }
                        ]
                    }
                ]
            }
        ]
    })
}
