//! HTTP handlers: the render front door and the browser admin endpoints.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info, warn};

use prerender_browser::{Artifact, PagePool, RenderError, RenderFormat};

use crate::breaker::browser_family;
use crate::filters;
use crate::state::AppState;

/// Back-off before the single retry after a temporary browser failure.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// `GET /browser/list`
pub async fn browser_list(State(state): State<Arc<AppState>>) -> Response {
    match state.pool.pages().await {
        Ok(pages) => Json(pages).into_response(),
        Err(e) => {
            error!("failed to list browser pages: {e}");
            plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
        }
    }
}

/// `GET /browser/version`
pub async fn browser_version(State(state): State<Arc<AppState>>) -> Response {
    match state.pool.version().await {
        Ok(version) => Json(version).into_response(),
        Err(e) => {
            error!("failed to read browser version: {e}");
            plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
        }
    }
}

/// `PUT /browser/disable` - serve from cache only.
pub async fn browser_disable(State(state): State<Arc<AppState>>) -> Response {
    state.disable_rendering();
    info!("rendering disabled; serving from cache only");
    Json(json!({"message": "success"})).into_response()
}

/// `PUT /browser/enable`
pub async fn browser_enable(State(state): State<Arc<AppState>>) -> Response {
    state.enable_rendering();
    info!("rendering enabled");
    Json(json!({"message": "success"})).into_response()
}

/// Fallback handler: every unmatched path is a render request.
pub async fn handle_render(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let (format, url) = match parse_render_target(uri.path(), uri.query()) {
        Some(target) => target,
        None => return plain_response(StatusCode::BAD_REQUEST, "Bad Request"),
    };

    let parsed = match url::Url::parse(&url) {
        Ok(parsed) if parsed.host_str().is_some() => parsed,
        _ => return plain_response(StatusCode::BAD_REQUEST, "Bad Request"),
    };

    if !state.config.allowed_domains.is_empty() {
        let host = parsed.host_str().unwrap_or_default();
        if !state.config.allowed_domains.contains(host) {
            return plain_response(StatusCode::FORBIDDEN, "Forbidden");
        }
    }

    // Conditional GET against the cache's write time.
    if let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
    {
        if let Ok(Some(modified)) = state.cache.modified_since(&url, format.as_str()).await {
            if not_modified(modified, since) {
                return Response::builder()
                    .status(StatusCode::NOT_MODIFIED)
                    .header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified))
                    .body(Body::empty())
                    .unwrap_or_else(|_| StatusCode::NOT_MODIFIED.into_response());
            }
        }
    }

    match state.cache.get(&url, format.as_str()).await {
        Ok(Some(payload)) => {
            info!(%url, "cache hit");
            let modified = state
                .cache
                .modified_since(&url, format.as_str())
                .await
                .ok()
                .flatten()
                .unwrap_or_else(SystemTime::now);
            return artifact_response(200, format.content_type(), "hit", modified, payload);
        }
        Ok(None) => {}
        Err(e) => warn!(%url, "error reading cache: {e}"),
    }

    if !state.rendering_enabled() {
        warn!(%url, "rendering disabled and not cached");
        return plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
    }

    let family = browser_family(
        headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(""),
    );
    if !state.breaker.check(&family) {
        warn!(%url, %family, "circuit breaker open");
        return plain_response(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable");
    }

    let proxy = headers
        .get("x-prerender-proxy")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let started = std::time::Instant::now();
    let rendered = render_with_retry(&state.pool, &url, format, proxy).await;
    let duration_ms = started.elapsed().as_millis();

    match rendered {
        Ok((artifact, status)) => {
            state.breaker.record_success(&family);
            info!(%url, status, duration_ms, "rendered");

            let payload = match artifact {
                Artifact::Html(html) => filters::apply_filters(&html).into_bytes(),
                other => other.into_bytes(),
            };

            let cache = state.cache.clone();
            let cache_url = url.clone();
            let cache_payload = payload.clone();
            let ttl = state.config.cache.live_time;
            tokio::spawn(async move {
                if let Err(e) = cache
                    .set(&cache_url, &cache_payload, ttl, format.as_str())
                    .await
                {
                    warn!(url = %cache_url, "error writing cache: {e}");
                }
            });

            artifact_response(
                status,
                format.content_type(),
                "miss",
                SystemTime::now(),
                payload,
            )
        }
        Err(e) => {
            state.breaker.record_failure(&family);
            let (status, body) = match &e {
                RenderError::TooManyResponses => {
                    (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
                }
                RenderError::Timeout(_)
                | RenderError::TemporaryBrowserFailure(_)
                | RenderError::ConnectionClosed => (StatusCode::GATEWAY_TIMEOUT, "Gateway timeout"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            };
            warn!(%url, duration_ms, "render failed with {status}: {e}");
            plain_response(status, body)
        }
    }
}

/// Retry once, after a back-off, when the browser reports a recoverable
/// failure.
async fn render_with_retry(
    pool: &PagePool,
    url: &str,
    format: RenderFormat,
    proxy: Option<String>,
) -> Result<(Artifact, u16), RenderError> {
    match pool.render(url, format, proxy.clone()).await {
        Err(RenderError::TemporaryBrowserFailure(reason)) => {
            warn!(%url, "temporary browser failure: {reason}, retrying in 1s");
            tokio::time::sleep(RETRY_BACKOFF).await;
            pool.render(url, format, proxy).await
        }
        other => other,
    }
}

/// Split an unmatched request path into a format and the target URL.
fn parse_render_target(path: &str, query: Option<&str>) -> Option<(RenderFormat, String)> {
    let (format, rest) = if let Some(rest) = path.strip_prefix("/html/") {
        (RenderFormat::Html, rest)
    } else if let Some(rest) = path.strip_prefix("/mhtml/") {
        (RenderFormat::Mhtml, rest)
    } else if let Some(rest) = path.strip_prefix("/pdf/") {
        (RenderFormat::Pdf, rest)
    } else if let Some(rest) = path.strip_prefix("/png/") {
        (RenderFormat::Png, rest)
    } else if let Some(rest) = path.strip_prefix("/jpeg/") {
        (RenderFormat::Jpeg, rest)
    } else {
        (RenderFormat::Html, path.strip_prefix('/').unwrap_or(path))
    };

    if rest.is_empty() {
        return None;
    }

    let mut url = rest.to_string();
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    Some((format, url))
}

/// HTTP dates carry second precision; sub-second drift is not "newer".
fn not_modified(modified: SystemTime, since: SystemTime) -> bool {
    let seconds = |t: SystemTime| {
        t.duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    };
    seconds(modified) <= seconds(since)
}

fn artifact_response(
    status: u16,
    content_type: &str,
    cache_state: &str,
    modified: SystemTime,
    payload: Vec<u8>,
) -> Response {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::OK))
        .header(header::CONTENT_TYPE, content_type)
        .header("X-Prerender-Cache", cache_state)
        .header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified))
        .body(Body::from(payload))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn plain_response(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}
