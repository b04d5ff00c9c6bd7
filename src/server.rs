//! HTTP transport for the RPC endpoint
//!
//! One `POST` route at the configured path takes a `methodCall` body,
//! dispatches it through the [`Registry`] and answers with a
//! `methodResponse`. Faults are regular `200 OK` responses; only requests
//! that cannot be decoded are rejected at the HTTP level.

use crate::api_errors::TransportError;
use crate::codec;
use crate::config::HostConfig;
use crate::errors::{HostError, HostResult};
use crate::fault::Fault;
use crate::registry::Registry;
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const HEALTH_PATH: &str = "/healthz";
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Build the router serving `registry` at `path`, plus the health check.
pub fn build_router(registry: Arc<Registry>, path: &str) -> Router {
    Router::new()
        .route(path, post(rpc_endpoint))
        .route(HEALTH_PATH, get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

fn check_content_type(headers: &HeaderMap) -> Result<(), TransportError> {
    let raw = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let mime = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match mime.as_str() {
        "text/xml" | "application/xml" => Ok(()),
        _ => Err(TransportError::unsupported_media_type(format!(
            "expected Content-Type text/xml, got '{raw}'"
        ))),
    }
}

async fn rpc_endpoint(
    State(registry): State<Arc<Registry>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, TransportError> {
    check_content_type(&headers).inspect_err(|e| warn!(error = %e, "rejected request"))?;
    if body.is_empty() {
        warn!("rejected request with empty body");
        return Err(TransportError::bad_request("empty request body"));
    }

    let call = codec::parse_method_call(&body).map_err(|e| {
        warn!(error = %e, "malformed methodCall");
        TransportError::from(e)
    })?;

    let xml = match registry.dispatch(&call.method_name, &call.params) {
        Ok(value) => {
            debug!(method = %call.method_name, "call succeeded");
            codec::write_response(&value)?
        }
        Err(err) => {
            let fault = Fault::from(err);
            info!(method = %call.method_name, code = fault.code, message = %fault.message, "call faulted");
            codec::write_fault(&fault)?
        }
    };

    Ok(([(CONTENT_TYPE, XML_CONTENT_TYPE)], xml).into_response())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Bind `host:port` from `config` and serve until the process ends.
pub async fn start(config: &HostConfig, registry: Registry) -> HostResult<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr.as_str())
        .await
        .map_err(|e| HostError::bind(addr.as_str(), e))?;
    serve(listener, config, registry).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, config: &HostConfig, registry: Registry) -> HostResult<()> {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| config.bind_addr());
    let app = build_router(Arc::new(registry), &config.path);

    info!("XML-RPC host listening on http://{local}{}", config.path);
    axum::serve(listener, app)
        .await
        .map_err(|e| HostError::serve(local, e))
}
