//! 방문자 WebSocket/REST 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Axum 기반 REST API (상태, 통계, HTTP 메시지 폴백)
//! - 방문자 채팅 WebSocket 서버
//! - 텔레그램 관리자 그룹 답장 라우팅
//! - Prometheus 메트릭
//! - 단순 프로토콜의 독립 WebSocket 봇 (`websocket-bot`)
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: REST API 엔드포인트
//! - [`websocket`]: 방문자 WebSocket 서버
//! - [`services`]: 세션, 파일, 텔레그램 게이트웨이, 관리자 라우터
//! - [`bot`]: `Visitor {session}` 프로토콜의 독립 봇
//! - [`metrics`]: Prometheus 메트릭 수집
//! - [`middleware`]: HTTP 미들웨어
//! - [`openapi`]: OpenAPI 문서 및 Swagger UI
//! - [`shutdown`]: 종료 시그널 처리

pub mod bot;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod state;
pub mod websocket;

pub use error::{ApiErrorResponse, ApiResult};
pub use metrics::setup_metrics_recorder;
pub use middleware::metrics_layer;
pub use routes::create_api_router;
pub use services::AdminRouter;
pub use state::AppState;
pub use websocket::{websocket_handler, websocket_router, ClientMessage, ServerFrame, WsError};
