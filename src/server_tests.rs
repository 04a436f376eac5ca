//! Router-level tests for everything that does not need a browser:
//! URL validation, the domain allow-list, the disabled/cache-only mode,
//! cache hits and conditional GETs.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use prerender_browser::{PagePool, PagePoolConfig};
use prerender_cache::{CacheBackend, DiskCache};
use prerender_config::Config;

use crate::state::AppState;

use super::build_router;

/// A pool pointing nowhere; these tests never reach the browser.
fn dead_pool() -> PagePool {
    PagePool::new("http://127.0.0.1:1", PagePoolConfig::default())
}

fn state_with(config: Config, cache: Arc<dyn CacheBackend>) -> Arc<AppState> {
    Arc::new(AppState::new(config, dead_pool(), cache))
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_bad_url_is_400() {
    let state = state_with(Config::default(), Arc::new(prerender_cache::DummyCache));
    let app = build_router(state);

    for path in ["/not-a-url", "/html/", "/"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "for {path}");
    }
}

#[tokio::test]
async fn test_disallowed_domain_is_403() {
    let mut config = Config::default();
    config.allowed_domains.insert("allowed.test".to_string());
    let state = state_with(config, Arc::new(prerender_cache::DummyCache));
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/html/http://forbidden.test/page")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_disabled_rendering_without_cache_is_502() {
    let state = state_with(Config::default(), Arc::new(prerender_cache::DummyCache));
    state.disable_rendering();
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/html/http://example.test/uncached")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_disable_enable_endpoints() {
    let state = state_with(Config::default(), Arc::new(prerender_cache::DummyCache));
    let app = build_router(state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/browser/disable")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!state.rendering_enabled());

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/browser/enable")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.rendering_enabled());
}

#[tokio::test]
async fn test_cache_hit_serves_payload_even_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let cache: Arc<dyn CacheBackend> = Arc::new(DiskCache::new(dir.path().to_path_buf()));
    let url = "http://example.test/cached";
    cache
        .set(url, b"<html>from cache</html>", Duration::from_secs(60), "html")
        .await
        .unwrap();

    let state = state_with(Config::default(), cache);
    state.disable_rendering();
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/html/http://example.test/cached")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Prerender-Cache").unwrap(),
        "hit"
    );
    assert!(response.headers().contains_key(header::LAST_MODIFIED));
    assert_eq!(body_bytes(response).await, b"<html>from cache</html>");
}

#[tokio::test]
async fn test_conditional_get_returns_304() {
    let dir = tempfile::tempdir().unwrap();
    let cache: Arc<dyn CacheBackend> = Arc::new(DiskCache::new(dir.path().to_path_buf()));
    let url = "http://example.test/conditional";
    cache
        .set(url, b"payload", Duration::from_secs(60), "html")
        .await
        .unwrap();

    let state = state_with(Config::default(), cache);
    let app = build_router(state);

    // A validator from the future: nothing changed since.
    let since = httpdate::fmt_http_date(std::time::SystemTime::now() + Duration::from_secs(60));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/html/http://example.test/conditional")
                .header(header::IF_MODIFIED_SINCE, since)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_stale_validator_serves_fresh_copy() {
    let dir = tempfile::tempdir().unwrap();
    let cache: Arc<dyn CacheBackend> = Arc::new(DiskCache::new(dir.path().to_path_buf()));
    let url = "http://example.test/stale-check";
    cache
        .set(url, b"payload", Duration::from_secs(60), "html")
        .await
        .unwrap();

    let state = state_with(Config::default(), cache);
    let app = build_router(state);

    let since =
        httpdate::fmt_http_date(std::time::SystemTime::now() - Duration::from_secs(3600));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/html/http://example.test/stale-check")
                .header(header::IF_MODIFIED_SINCE, since)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"payload");
}
