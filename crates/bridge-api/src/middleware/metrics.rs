//! HTTP 요청 metrics middleware.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{
    normalize_path, record_http_duration, record_http_request, record_http_response,
    record_websocket_upgrade,
};

/// WebSocket 업그레이드 요청인지 확인합니다.
fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// HTTP 메트릭을 수집하는 미들웨어 레이어.
///
/// - `http_requests_total`, `http_responses_total`: method/path(/status) 라벨
/// - `http_request_duration_seconds`: 일반 요청만 기록
/// - `websocket_upgrades_total`: 업그레이드 응답 상태별 카운터
///
/// 업그레이드 응답은 핸드셰이크 직후 반환되므로 지연 시간 분포에서 제외합니다.
pub async fn metrics_layer(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let upgrade = is_websocket_upgrade(request.headers());
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    record_http_request(&method, &path);
    let response = next.run(request).await;
    let status = response.status().as_u16();
    record_http_response(&method, &path, status);

    if upgrade {
        record_websocket_upgrade(status);
    } else {
        record_http_duration(&method, &path, start.elapsed().as_secs_f64());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{HeaderValue, Method, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "OK"
    }

    #[test]
    fn test_detects_websocket_upgrade() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));

        headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_websocket_upgrade(&headers));

        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[tokio::test]
    async fn test_metrics_middleware_passes_through() {
        let app = Router::new()
            .route("/stats", get(ok_handler))
            .layer(middleware::from_fn(metrics_layer));

        let request = Request::builder()
            .method(Method::GET)
            .uri("/stats")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_middleware_keeps_not_found() {
        let app = Router::new()
            .route("/files/{name}", get(ok_handler))
            .layer(middleware::from_fn(metrics_layer));

        let request = Request::builder()
            .uri("/missing")
            .header(header::UPGRADE, "websocket")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
