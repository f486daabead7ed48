use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use prost::Message;
use spanlight_core::error::{Result, SpanlightError};
use spanlight_store::Store;

use crate::legacy;
use crate::normalize::normalize_request;

#[derive(Clone)]
pub struct ReceiverState {
    pub store: Store,
}

pub fn router(store: Store) -> Router {
    Router::new()
        .route("/v1/traces", post(export_traces))
        .with_state(ReceiverState { store })
}

/// The ingest write is synchronous: 200 is only returned once the span
/// batch has been sent to the store, so the exporter's retry loop owns
/// redelivery.
async fn export_traces(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap_or_default()
        .trim()
        .to_string();

    let request = match decode_export(&content_type, &body) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, %content_type, "rejected trace export");
            return error_response(err);
        }
    };

    let spans = normalize_request(&request);
    tracing::debug!(spans = spans.len(), "ingesting trace export");
    if let Err(err) = state.store.insert_spans(&spans).await {
        tracing::warn!(error = %err, "trace export insert failed");
        return error_response(err);
    }

    let body = ExportTraceServiceResponse::default().encode_to_vec();
    (
        [(header::CONTENT_TYPE, "application/x-protobuf")],
        body,
    )
        .into_response()
}

fn error_response(err: SpanlightError) -> Response {
    let status = match &err {
        SpanlightError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        SpanlightError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

/// Dispatch on content type: protobuf decodes directly, JSON goes
/// through legacy detection first. The legacy check is structural
/// rather than parse-failure-driven because the tolerant JSON decoder
/// would otherwise accept an old payload as an empty request.
pub fn decode_export(content_type: &str, body: &[u8]) -> Result<ExportTraceServiceRequest> {
    match content_type {
        "application/x-protobuf" => ExportTraceServiceRequest::decode(body)
            .map_err(|e| SpanlightError::MalformedRequest(format!("invalid protobuf: {e}"))),
        "application/json" => decode_json(body),
        other => Err(SpanlightError::UnsupportedMediaType(other.to_string())),
    }
}

fn decode_json(body: &[u8]) -> Result<ExportTraceServiceRequest> {
    let mut value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| SpanlightError::MalformedRequest(format!("invalid json: {e}")))?;

    if legacy::is_legacy_payload(&value) {
        legacy::upgrade_legacy_payload(&mut value);
    }

    serde_json::from_value(value)
        .map_err(|e| SpanlightError::MalformedRequest(format!("invalid json: {e}")))
}

#[cfg(test)]
mod tests {
    use spanlight_testkit::{legacy_payload, sample_export_request};

    use super::*;

    #[test]
    fn protobuf_round_trips() {
        let encoded = sample_export_request().encode_to_vec();
        let decoded = decode_export("application/x-protobuf", &encoded).unwrap();
        assert_eq!(decoded.resource_spans.len(), 1);
    }

    #[test]
    fn garbage_protobuf_is_malformed() {
        let err = decode_export("application/x-protobuf", b"not protobuf").unwrap_err();
        assert!(matches!(err, SpanlightError::MalformedRequest(_)));
    }

    #[test]
    fn garbage_json_is_malformed() {
        let err = decode_export("application/json", b"{not json").unwrap_err();
        assert!(matches!(err, SpanlightError::MalformedRequest(_)));
    }

    #[test]
    fn other_content_types_are_unsupported() {
        let err = decode_export("text/plain", b"").unwrap_err();
        assert!(matches!(err, SpanlightError::UnsupportedMediaType(_)));
    }

    #[test]
    fn legacy_json_decodes_to_same_rows_as_modern() {
        let body = serde_json::to_vec(&legacy_payload()).unwrap();
        let decoded = decode_export("application/json", &body).unwrap();
        let spans = crate::normalize::normalize_request(&decoded);

        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "legacy op");
        assert_eq!(span.scope_name, "legacy-svc");
        assert!(
            span.resource_attributes
                .iter()
                .any(|a| a.key == "service.name" && a.value == "legacy-svc")
        );
        assert!(
            span.span_attributes
                .iter()
                .any(|a| a.key == "http.method" && a.value == "GET")
        );
    }
}
