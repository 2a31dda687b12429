//! 브리지 서비스.
//!
//! - [`session_manager`]: 방문자 세션과 일일 통계
//! - [`file_handler`]: 업로드/첨부 파일 저장과 정리
//! - [`gateway`]: 방문자 메시지를 관리자에게 전달
//! - [`reply_map`]: 텔레그램 답장 → 방문자 세션 매핑
//! - [`telegram_bot`]: 관리자 그룹 메시지를 방문자에게 전달

pub mod file_handler;
pub mod gateway;
pub mod reply_map;
pub mod session_manager;
pub mod telegram_bot;

pub use file_handler::{FileHandler, FileKind};
pub use gateway::{AdminGateway, LoggingGateway, TelegramGateway};
pub use reply_map::{ReplyMap, ReplyTarget};
pub use session_manager::{ServerStats, SessionManager, SessionSummary};
pub use telegram_bot::AdminRouter;
