//! OpenAPI 문서화 설정.
//!
//! utoipa로 REST API의 OpenAPI 3.0 문서를 생성합니다.
//! Swagger UI는 `/swagger-ui` 경로에서 사용 가능합니다.
//!
//! 새 엔드포인트를 추가할 때는 핸들러의 `#[utoipa::path(...)]`와
//! 요청/응답 타입을 아래 `paths(...)`, `components(schemas(...))`에 함께 등록합니다.
//! WebSocket 엔드포인트(`/ws`)는 OpenAPI로 표현되지 않아 제외됩니다.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiErrorResponse;
use crate::routes::{
    ComponentHealth, ComponentStatus, HealthResponse, HealthSummary, SendMessageRequest,
    SendMessageResponse, ServiceInfo, StatsResponse, UploadResponse,
};
use crate::services::{ServerStats, SessionSummary};
use crate::websocket::ConnectionStats;

/// Bridge API 문서.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Telegram WebSocket Bridge API",
        version = "1.0.0",
        description = r#"
# Telegram WebSocket Bridge

웹사이트 방문자 채팅을 텔레그램 관리자 그룹으로 중계하는 서버입니다.

## 방문자 채널

- **WebSocket**: `GET /ws`, `GET /ws/{session_id}` (JSON 텍스트 프레임, 바이너리 = 파일 업로드)
- **HTTP 폴백**: `POST /message`, `POST /upload`

관리자는 텔레그램 그룹에서 봇 메시지에 답장하여 응답합니다.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    tags(
        (name = "health", description = "서비스 상태"),
        (name = "stats", description = "통계와 세션 목록"),
        (name = "messages", description = "HTTP 메시지/업로드 폴백"),
    ),
    paths(
        crate::routes::health::service_info,
        crate::routes::health::health_check,
        crate::routes::health::health_ready,
        crate::routes::stats::get_stats,
        crate::routes::stats::list_sessions,
        crate::routes::messages::send_message,
        crate::routes::messages::upload_file,
    ),
    components(schemas(
        ApiErrorResponse,
        ServiceInfo,
        HealthSummary,
        HealthResponse,
        ComponentHealth,
        ComponentStatus,
        StatsResponse,
        ServerStats,
        SessionSummary,
        ConnectionStats,
        SendMessageRequest,
        SendMessageResponse,
        UploadResponse,
    ))
)]
pub struct ApiDoc;

/// Swagger UI 라우터 생성.
///
/// - `/swagger-ui` - Swagger UI 대화형 문서
/// - `/api-docs/openapi.json` - OpenAPI JSON
pub fn swagger_ui_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
