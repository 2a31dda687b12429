//! HTTP 라우트.
//!
//! # 라우트 구조
//!
//! - `/` - 서비스 정보
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/stats` - 서버 통계
//! - `/sessions` - 활성 세션 목록
//! - `/message` - 메시지 전송 (HTTP 폴백)
//! - `/upload` - 파일 업로드 (HTTP 폴백)
//! - `/ws`, `/ws/{session_id}` - 방문자 WebSocket
//! - `/files/{name}` - 저장된 업로드/관리자 미디어

pub mod health;
pub mod messages;
pub mod stats;

pub use health::{
    health_router, service_info, ComponentHealth, ComponentStatus, HealthResponse, HealthSummary,
    ServiceInfo,
};
pub use messages::{messages_router, SendMessageRequest, SendMessageResponse, UploadResponse};
pub use stats::{stats_router, StatsResponse};

use axum::{routing::get, Router};
use tower_http::services::ServeDir;

use crate::state::AppState;
use crate::websocket::websocket_router;

/// 전체 라우터 생성.
///
/// `/files`는 `TEMP_DIR`을 그대로 서빙합니다.
pub fn create_api_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .nest("/health", health_router())
        .merge(stats_router())
        .merge(messages_router(state.settings.max_file_size))
        .merge(websocket_router())
        .nest_service("/files", ServeDir::new(state.files.temp_dir()))
}
