//! 도메인 모델.

pub mod message;
pub mod session;

pub use message::{Message, MessageDirection, MessageType, SERVER_METADATA_KEYS};
pub use session::{
    format_session_duration, format_uptime, Session, SessionStats, SessionStatus, VisitorInfo,
};
