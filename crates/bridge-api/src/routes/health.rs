//! 서비스 상태 endpoint.
//!
//! 서비스 정보, liveness, readiness 엔드포인트를 제공합니다.
//! 컨테이너 헬스 체크와 로드밸런서에서 사용됩니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use bridge_core::format_uptime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

/// `GET /` 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// 항상 "online"
    pub status: String,
    pub service: String,
    pub version: String,
    pub active_sessions: usize,
}

/// `GET /health` 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthSummary {
    /// WebSocket 서버 상태 ("running")
    pub websocket: String,
    /// 텔레그램 봇 상태 ("running" | "stopped" | "disabled")
    pub telegram_bot: String,
    /// 활성 세션 수
    pub sessions: usize,
    /// 업타임 (H:MM:SS)
    pub uptime: String,
}

/// 상세 헬스 체크 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 개별 컴포넌트 상태
    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    /// 텔레그램 폴링 상태
    pub telegram: ComponentStatus,

    /// 세션 저장소 상태
    pub sessions: ComponentStatus,

    /// 임시 파일 디렉토리 상태
    pub storage: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    /// 상태 ("up" | "down" | "not_configured")
    pub status: String,

    /// 추가 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    pub fn up() -> Self {
        Self {
            status: "up".to_string(),
            message: None,
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn not_configured() -> Self {
        Self {
            status: "not_configured".to_string(),
            message: None,
        }
    }

    pub fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 서비스 정보.
///
/// GET /
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "서비스 정보", body = ServiceInfo)
    )
)]
pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        status: "online".to_string(),
        service: "Telegram WebSocket Bridge".to_string(),
        version: state.version.clone(),
        active_sessions: state.sessions.active_count().await,
    })
}

/// 간단한 헬스 체크.
///
/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "서버 동작 중", body = HealthSummary)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthSummary> {
    let telegram_bot = if !state.telegram_enabled() {
        "disabled"
    } else if state.is_bot_running() {
        "running"
    } else {
        "stopped"
    };

    let uptime = (chrono::Utc::now() - state.started_at)
        .to_std()
        .unwrap_or_default();

    Json(HealthSummary {
        websocket: "running".to_string(),
        telegram_bot: telegram_bot.to_string(),
        sessions: state.sessions.active_count().await,
        uptime: format_uptime(uptime),
    })
}

/// 상세 헬스 체크 (readiness probe용).
///
/// 텔레그램이 설정되어 있는데 폴링이 멈춰 있으면 503을 반환합니다.
/// GET /health/ready
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "모든 컴포넌트 정상", body = HealthResponse),
        (status = 503, description = "텔레그램 폴링 중단", body = HealthResponse)
    )
)]
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let mut overall_status = "healthy";
    let mut status_code = StatusCode::OK;

    let telegram_status = if !state.telegram_enabled() {
        ComponentStatus::not_configured()
    } else if state.is_bot_running() {
        ComponentStatus::up()
    } else {
        overall_status = "degraded";
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        ComponentStatus::down("폴링 중단")
    };

    let sessions_status = {
        let active = state.sessions.active_count().await;
        ComponentStatus::up_with_info(format!(
            "{} active, max {}",
            active, state.settings.max_sessions
        ))
    };

    // 임시 디렉토리 문제는 업로드만 영향을 받으므로 degraded로만 표시
    let storage_status = match tokio::fs::metadata(state.files.temp_dir()).await {
        Ok(meta) if meta.is_dir() => ComponentStatus::up(),
        Ok(_) | Err(_) => {
            if overall_status == "healthy" {
                overall_status = "degraded";
            }
            ComponentStatus::down("임시 디렉토리 없음")
        }
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            telegram: telegram_status,
            sessions: sessions_status,
            storage: storage_status,
        },
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성 (`/health` 아래에 중첩).
pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{body::Body, http::Request};
    use bridge_core::VisitorInfo;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_service_info() {
        let state = create_test_state();
        state
            .sessions
            .create_session("s1", VisitorInfo::default())
            .await;
        let app = Router::new()
            .route("/", get(service_info))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "online");
        assert_eq!(json["service"], "Telegram WebSocket Bridge");
        assert_eq!(json["active_sessions"], 1);
    }

    #[tokio::test]
    async fn test_health_check_without_telegram() {
        let app = health_router().with_state(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["websocket"], "running");
        assert_eq!(json["telegram_bot"], "disabled");
        assert_eq!(json["sessions"], 0);
        assert!(json["uptime"].as_str().unwrap().contains(':'));
    }

    #[tokio::test]
    async fn test_ready_reports_stopped_polling() {
        use bridge_telegram::{TelegramClient, TelegramConfig};

        let client = TelegramClient::new(TelegramConfig::new("1:t", -100));
        let state = AppState::new(std::sync::Arc::new(bridge_core::Settings::default()), Some(client));
        let app = health_router().with_state(state.clone());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["components"]["telegram"]["status"], "down");

        state.bot_running.store(true, Ordering::SeqCst);
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
