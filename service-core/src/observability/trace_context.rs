//! W3C Trace Context propagation for outbound HTTP calls.
//!
//! Outbound requests to upstream services carry the current span's
//! `traceparent` (and `tracestate` when present) so a relayed call can be
//! followed across process boundaries.
//!
//! See: https://www.w3.org/TR/trace-context/

use opentelemetry::trace::TraceContextExt;
use reqwest::header::HeaderMap;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Header name for W3C traceparent
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Header name for W3C tracestate
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Header name for request correlation ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inject the current span's trace context into outbound headers.
///
/// Leaves `headers` untouched when there is no valid OpenTelemetry context,
/// which is the case whenever tracing runs without an OTLP exporter.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    let span = Span::current();
    let context = span.context();
    let otel_span = context.span();
    let span_context = otel_span.span_context();

    if !span_context.is_valid() {
        return;
    }

    // version-trace_id-span_id-trace_flags
    let traceparent = format!(
        "00-{}-{}-{:02x}",
        span_context.trace_id(),
        span_context.span_id(),
        span_context.trace_flags().to_u8()
    );

    if let Ok(value) = traceparent.parse() {
        headers.insert(TRACEPARENT_HEADER, value);
    }

    let tracestate = span_context.trace_state().header();
    if !tracestate.is_empty() {
        if let Ok(value) = tracestate.parse() {
            headers.insert(TRACESTATE_HEADER, value);
        }
    }
}

/// Extract request ID from incoming request headers.
pub fn extract_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extension trait for `reqwest::Client` producing request builders that
/// already carry trace headers.
pub trait TracedClientExt {
    fn traced_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder;

    fn traced_get(&self, url: &str) -> reqwest::RequestBuilder {
        self.traced_request(reqwest::Method::GET, url)
    }

    fn traced_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.traced_request(reqwest::Method::POST, url)
    }
}

impl TracedClientExt for reqwest::Client {
    fn traced_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        self.request(method, url).headers(headers)
    }
}
