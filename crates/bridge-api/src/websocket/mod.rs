//! 방문자용 WebSocket 서버.
//!
//! 웹사이트 채팅 위젯이 접속하는 엔드포인트.
//!
//! # 엔드포인트
//!
//! - `GET /ws` - 새 세션 ID 발급 후 접속
//! - `GET /ws/{session_id}` - 지정한 세션으로 접속 (재접속)
//!
//! # 메시지 형식
//!
//! ## 클라이언트 → 서버
//!
//! ```json
//! {"type": "text", "content": "안녕하세요", "metadata": {}}
//! {"type": "typing"}
//! {"type": "ping"}
//! ```
//!
//! 바이너리 프레임은 파일 업로드로 처리됩니다.
//!
//! ## 서버 → 클라이언트
//!
//! ```json
//! {"id": "...", "session_id": "...", "content": "...", "type": "admin", "direction": "admin_to_visitor", ...}
//! {"type": "pong", "timestamp": "..."}
//! ```

pub mod connections;
pub mod handler;
pub mod messages;

pub use connections::{ConnectionRegistry, ConnectionStats, FrameReceiver, FrameSender, Registration};
pub use handler::{websocket_handler, websocket_new_session_handler, websocket_router, PeerAddr};
pub use messages::{ClientFrame, ClientMessage, ServerFrame, WsError};
