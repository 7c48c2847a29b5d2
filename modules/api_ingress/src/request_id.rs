//! Request correlation: every request carries an `x-request-id`, and its
//! tracing span names the member it acts on. Read endpoints fill `user_id`
//! from the query; body-driven handlers record it themselves.

use std::time::Duration;

use axum::http::{HeaderName, Request, Response};
use axum::{body::Body, middleware::Next};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{MakeRequestId, RequestId};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::field::Empty;
use tracing::Span;

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

const MISSING: &str = "n/a";

/// Request id as seen by handlers and error responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

/// Mints ids for requests that arrive without one.
#[derive(Clone, Copy, Default)]
pub struct NanoRequestId;

impl MakeRequestId for NanoRequestId {
    fn make_request_id<B>(&mut self, _req: &Request<B>) -> Option<RequestId> {
        let id = nanoid::nanoid!(16);
        Some(RequestId::new(id.parse().ok()?))
    }
}

fn header_id<B>(req: &Request<B>) -> &str {
    req.headers()
        .get(request_id_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or(MISSING)
}

/// `userId` from a query string, as sent by the read endpoints.
pub fn user_id_from_query(query: &str) -> Option<&str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "userId")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Copies the request id into the extensions so handlers and the fallback
/// can put it into error bodies.
pub async fn attach_correlation_id(mut req: Request<Body>, next: Next) -> axum::response::Response {
    let id = CorrelationId(header_id(&req).to_owned());
    req.extensions_mut().insert(id);
    next.run(req).await
}

#[derive(Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, req: &Request<B>) -> Span {
        let span = tracing::info_span!(
            "http_request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %header_id(req),
            user_id = Empty,
            status = Empty,
            latency_ms = Empty
        );
        if let Some(user_id) = req.uri().query().and_then(user_id_from_query) {
            span.record("user_id", user_id);
        }
        span
    }
}

/// Fills the span's `status` and `latency_ms` and logs completion.
#[derive(Clone, Copy, Default)]
pub struct RecordOutcome;

impl<B> OnResponse<B> for RecordOutcome {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        span.record("status", status);
        span.record("latency_ms", latency_ms);
        tracing::debug!(parent: span, status, latency_ms, "request finished");
    }
}

pub type RequestTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan, DefaultOnRequest, RecordOutcome>;

pub fn trace_layer() -> RequestTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_response(RecordOutcome)
}
