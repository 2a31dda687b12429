//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청, WebSocket 연결, 브리지 메시지 메트릭을 수집하고
//! `METRICS_PORT`의 `/metrics` 엔드포인트로 노출합니다.

use axum::{extract::State, routing::get, Router};
use bridge_core::{MessageDirection, MessageType};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설치하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        // HTTP 요청 지속 시간 히스토그램 버킷 설정
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install_recorder()
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// `/metrics` 라우터.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(handle)
}

// ============================================================================
// HTTP 메트릭 헬퍼 함수
// ============================================================================

/// HTTP 요청 카운터 증가.
pub fn record_http_request(method: &str, path: &str) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string())
        .increment(1);
}

/// HTTP 응답 카운터 증가.
pub fn record_http_response(method: &str, path: &str, status: u16) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 브리지 메트릭 헬퍼 함수
// ============================================================================

/// 브리지를 통과한 메시지 카운터 증가.
pub fn record_bridge_message(direction: MessageDirection, message_type: MessageType) {
    let direction = match direction {
        MessageDirection::VisitorToAdmin => "visitor_to_admin",
        MessageDirection::AdminToVisitor => "admin_to_visitor",
        MessageDirection::System => "system",
    };
    counter!(
        "bridge_messages_total",
        "direction" => direction,
        "type" => message_type.as_str()
    )
    .increment(1);
}

/// 텔레그램 API 실패 카운터 증가.
pub fn record_telegram_error(operation: &'static str) {
    counter!("telegram_api_errors_total", "operation" => operation).increment(1);
}

/// 활성 세션 수 설정.
pub fn set_active_sessions(count: usize) {
    gauge!("bridge_sessions_active").set(count as f64);
}

/// WebSocket 업그레이드 요청 결과 카운터 증가 (성공 시 101).
pub fn record_websocket_upgrade(status: u16) {
    counter!("websocket_upgrades_total", "status" => status.to_string()).increment(1);
}

/// WebSocket 연결 수 증가.
pub fn increment_websocket_connections() {
    gauge!("websocket_connections_active").increment(1.0);
}

/// WebSocket 연결 수 감소.
pub fn decrement_websocket_connections() {
    gauge!("websocket_connections_active").decrement(1.0);
}

// ============================================================================
// 경로 정규화 유틸리티
// ============================================================================

/// 경로에서 동적 파라미터를 정규화합니다.
///
/// 예: `/ws/123e4567-e89b-12d3-a456-426614174000` → `/ws/:id`
///
/// 방문자가 정하는 세션 ID와 파일 이름은 라벨 폭증을 막기 위해 모두 `:id`로 바꿉니다.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut previous = "";

    for segment in path.split('/') {
        let is_uuid = segment.len() == 36 && segment.chars().filter(|c| *c == '-').count() == 4;
        let is_numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
        let is_free_param = matches!(previous, "ws" | "files") && !segment.is_empty();

        if is_uuid || is_numeric || is_free_param {
            normalized.push(":id");
        } else {
            normalized.push(segment);
        }
        previous = segment;
    }
    normalized.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/ws/123e4567-e89b-12d3-a456-426614174000";
        assert_eq!(normalize_path(path), "/ws/:id");
    }

    #[test]
    fn test_normalize_path_free_session_id() {
        assert_eq!(normalize_path("/ws/visitor-abc"), "/ws/:id");
        assert_eq!(normalize_path("/files/photo_1.jpg"), "/files/:id");
    }

    #[test]
    fn test_normalize_path_no_params() {
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
        assert_eq!(normalize_path("/ws"), "/ws");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/sessions/12345"), "/sessions/:id");
    }
}
