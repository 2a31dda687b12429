//! WebSocket 메시지 타입.
//!
//! 방문자 위젯과 서버 간에 교환되는 프레임 정의.

use bridge_core::{Message, MessageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// WebSocket 에러.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("잘못된 메시지 형식: {0}")]
    InvalidMessage(String),
    #[error("알 수 없는 메시지 타입: {0}")]
    UnknownMessageType(String),
    #[error("직렬화 실패: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("내부 오류: {0}")]
    InternalError(String),
}

// ==================== 클라이언트 → 서버 메시지 ====================

/// 방문자가 보내는 텍스트 프레임 (`{type, content, metadata}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    /// 메시지 타입 (`text`, `typing`, `ping` 등). 생략 시 `text`
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_kind() -> String {
    MessageType::Text.as_str().to_string()
}

/// 파싱된 방문자 요청.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// 핑 (연결 유지)
    Ping,
    /// 타이핑 표시 / 읽음 확인 (활동 시각만 갱신)
    Activity(MessageType),
    /// 관리자에게 전달할 메시지
    Chat {
        message_type: MessageType,
        content: String,
        metadata: Map<String, Value>,
    },
}

impl ClientMessage {
    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, WsError> {
        let frame: ClientFrame =
            serde_json::from_str(json).map_err(|e| WsError::InvalidMessage(e.to_string()))?;

        if frame.kind.eq_ignore_ascii_case("ping") {
            return Ok(ClientMessage::Ping);
        }

        let message_type: MessageType = frame
            .kind
            .parse()
            .map_err(|_| WsError::UnknownMessageType(frame.kind.clone()))?;

        if message_type.is_control() {
            return Ok(ClientMessage::Activity(message_type));
        }

        Ok(ClientMessage::Chat {
            message_type,
            content: frame.content,
            metadata: frame.metadata,
        })
    }

    /// 세션의 방문자 메시지로 변환합니다 (`Chat`만 해당).
    pub fn into_message(self, session_id: &str) -> Option<Message> {
        match self {
            ClientMessage::Chat {
                message_type,
                content,
                metadata,
            } => {
                Some(Message::new(session_id, content, message_type).with_client_metadata(metadata))
            }
            _ => None,
        }
    }
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 서버가 방문자에게 보내는 프레임.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// 채팅/시스템/에러 메시지
    Message(Box<Message>),
    /// 퐁 응답
    Pong { timestamp: DateTime<Utc> },
    /// 연결 종료 요청
    Close { code: u16, reason: String },
}

/// `{"type":"pong","timestamp":...}`.
#[derive(Serialize)]
struct PongPayload<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    timestamp: DateTime<Utc>,
}

impl ServerFrame {
    pub fn message(message: Message) -> Self {
        ServerFrame::Message(Box::new(message))
    }

    pub fn pong() -> Self {
        ServerFrame::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        ServerFrame::Close {
            code,
            reason: reason.into(),
        }
    }

    /// 텍스트 프레임 JSON. `Close`는 `None`.
    pub fn to_json(&self) -> Result<Option<String>, WsError> {
        match self {
            ServerFrame::Message(message) => Ok(Some(serde_json::to_string(message)?)),
            ServerFrame::Pong { timestamp } => Ok(Some(serde_json::to_string(&PongPayload {
                kind: "pong",
                timestamp: *timestamp,
            })?)),
            ServerFrame::Close { .. } => Ok(None),
        }
    }
}
