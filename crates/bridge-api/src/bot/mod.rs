//! `Visitor {session}` 텍스트 프로토콜의 독립 WebSocket 봇 (`websocket-bot` 바이너리).
//!
//! 세션 저장소, REST, 파일 서빙 없이 방문자 소켓과 관리자 그룹만 연결합니다.

pub mod protocol;
pub mod server;

pub use protocol::{AdminContent, AdminPayload, Hello, VisitorFrame};
pub use server::{bot_router, WebSocketBot};
