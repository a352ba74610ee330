// src/server/handler.rs
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::engine::Trigger;
use crate::metrics::MetricsRegistry;
use crate::state::ResultTable;

/// Read-only status surface plus the manual refresh trigger.
///
/// - `GET /status` and `GET /status/<id>` return snapshots of the table
/// - `POST /refresh` queues a cycle
/// - `GET <metrics path>` serves Prometheus text when metrics are on
#[derive(Clone)]
pub struct StatusHandler {
    table: Arc<ResultTable>,
    trigger: Trigger,
    metrics: Option<(Arc<MetricsRegistry>, Arc<str>)>,
}

impl StatusHandler {
    pub fn new(table: Arc<ResultTable>, trigger: Trigger) -> Self {
        Self {
            table,
            trigger,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, registry: Arc<MetricsRegistry>, path: &str) -> Self {
        self.metrics = Some((registry, Arc::from(path)));
        self
    }

    pub fn route(&self, req: &Request<Body>) -> Response<Body> {
        let path = req.uri().path();
        let method = req.method();

        if let Some((registry, metrics_path)) = &self.metrics {
            if path == metrics_path.as_ref() {
                if *method != Method::GET {
                    return status_only(StatusCode::METHOD_NOT_ALLOWED);
                }
                return match registry.gather() {
                    Ok(body) => respond(StatusCode::OK, "text/plain; version=0.0.4", body),
                    Err(e) => {
                        tracing::error!("Failed to encode metrics: {}", e);
                        status_only(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                };
            }
        }

        match (method, path) {
            (&Method::GET, "/status") => json(StatusCode::OK, &self.table.snapshot()),
            (&Method::GET, p) if p.starts_with("/status/") => {
                let raw = &p["/status/".len()..];
                let Ok(id) = percent_decode_str(raw).decode_utf8() else {
                    return status_only(StatusCode::BAD_REQUEST);
                };
                match self.table.view_of(&id) {
                    Some(view) => json(StatusCode::OK, &view),
                    None => status_only(StatusCode::NOT_FOUND),
                }
            }
            (&Method::POST, "/refresh") => {
                if self.trigger.refresh() {
                    tracing::info!("Manual refresh requested");
                    json(StatusCode::ACCEPTED, &serde_json::json!({ "accepted": true }))
                } else {
                    status_only(StatusCode::SERVICE_UNAVAILABLE)
                }
            }
            (_, "/status") | (_, "/refresh") => status_only(StatusCode::METHOD_NOT_ALLOWED),
            _ => status_only(StatusCode::NOT_FOUND),
        }
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn status_only(status: StatusCode) -> Response<Body> {
    let reason = status.canonical_reason().unwrap_or("");
    respond(status, "text/plain; charset=utf-8", reason)
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            status_only(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

impl Service<Request<Body>> for StatusHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        futures::future::ready(Ok(self.route(&req)))
    }
}
