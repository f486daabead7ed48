use serde::{Deserialize, Serialize};

/// A single key/value attribute after normalisation. Every OTLP value
/// variant is flattened to text before it reaches this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub time_unix_nano: i64,
    pub name: String,
    pub attributes: Vec<Attribute>,
}

/// Canonical span record: one per OTLP span, the unit of storage and
/// query. Identifiers are base64 of the raw OTLP bytes; an absent
/// parent encodes as the empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub flags: i32,
    pub name: String,
    pub start_time_unix_nano: i64,
    pub end_time_unix_nano: i64,
    pub scope_name: String,
    pub resource_schema_url: String,
    pub resource_id: String,
    pub resource_attributes: Vec<Attribute>,
    pub span_attributes: Vec<Attribute>,
    pub events: Vec<SpanEvent>,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        (self.end_time_unix_nano - self.start_time_unix_nano) as f64 / 1_000_000.0
    }

    /// A span has an error iff any of its events is named "exception".
    pub fn has_error(&self) -> bool {
        self.events.iter().any(|e| e.name == "exception")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span {
            trace_id: "dHJhY2U=".into(),
            span_id: "c3Bhbg==".into(),
            parent_span_id: String::new(),
            flags: 0,
            name: "GET /a".into(),
            start_time_unix_nano: 1_000_000_000,
            end_time_unix_nano: 1_005_000_000,
            scope_name: "svc".into(),
            resource_schema_url: String::new(),
            resource_id: "r1".into(),
            resource_attributes: vec![Attribute::new("service.name", "svc")],
            span_attributes: Vec::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn root_and_duration() {
        let s = span();
        assert!(s.is_root());
        assert_eq!(s.duration_ms(), 5.0);
    }

    #[test]
    fn error_requires_exception_event() {
        let mut s = span();
        assert!(!s.has_error());

        s.events.push(SpanEvent {
            time_unix_nano: 1_001_000_000,
            name: "retry".into(),
            attributes: Vec::new(),
        });
        assert!(!s.has_error());

        s.events.push(SpanEvent {
            time_unix_nano: 1_002_000_000,
            name: "exception".into(),
            attributes: vec![Attribute::new("exception.type", "io")],
        });
        assert!(s.has_error());
    }
}
