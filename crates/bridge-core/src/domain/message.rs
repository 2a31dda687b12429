//! 메시지 도메인 모델.
//!
//! 방문자 ↔ 관리자 간에 오가는 메시지를 정의합니다.
//! 와이어 형식의 필드명은 `type`, `direction` 등 클라이언트 위젯과 동일합니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 메시지 타입.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Voice,
    Image,
    File,
    System,
    Admin,
    Error,
    Typing,
    ReadReceipt,
    Join,
    Leave,
}

impl MessageType {
    /// 와이어 문자열 표현.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Voice => "voice",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::System => "system",
            MessageType::Admin => "admin",
            MessageType::Error => "error",
            MessageType::Typing => "typing",
            MessageType::ReadReceipt => "read_receipt",
            MessageType::Join => "join",
            MessageType::Leave => "leave",
        }
    }

    /// 첨부 파일을 동반하는 타입인지.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            MessageType::Voice | MessageType::Image | MessageType::File
        )
    }

    /// 관리자에게 전달하지 않는 제어성 타입인지.
    pub fn is_control(&self) -> bool {
        matches!(self, MessageType::Typing | MessageType::ReadReceipt)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("Unknown message type: {}", s))
    }
}

/// 메시지 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    #[default]
    VisitorToAdmin,
    AdminToVisitor,
    System,
}

/// 방문자와 관리자 사이의 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct Message {
    /// 고유 메시지 ID (UUID v4)
    #[serde(default = "new_message_id")]
    pub id: String,
    /// 방문자 세션 ID
    pub session_id: String,
    /// 본문
    #[serde(default)]
    pub content: String,
    /// 메시지 타입
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    /// 메시지 방향
    #[serde(default)]
    pub direction: MessageDirection,
    /// 생성 시각
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// 추가 메타데이터 (파일 경로, 관리자 이름 등)
    #[serde(default)]
    #[cfg_attr(feature = "utoipa-support", schema(value_type = Object))]
    pub metadata: Map<String, Value>,
}

/// 서버가 저장한 파일에만 붙이는 메타데이터 키.
///
/// 방문자가 보낸 메타데이터에서는 제거됩니다.
pub const SERVER_METADATA_KEYS: &[&str] = &[
    "file_path",
    "file_url",
    "file_size",
    "file_type",
    "file_name",
    "mime_type",
];

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Message {
    /// 방문자 → 관리자 메시지를 생성합니다.
    pub fn new(
        session_id: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: new_message_id(),
            session_id: session_id.into(),
            content: content.into(),
            message_type,
            direction: MessageDirection::VisitorToAdmin,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// 시스템 안내 메시지.
    pub fn system(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, content, MessageType::System).with_direction(MessageDirection::System)
    }

    /// 에러 메시지.
    pub fn error(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, content, MessageType::Error).with_direction(MessageDirection::System)
    }

    /// 코드가 포함된 에러 메시지.
    pub fn error_with_code(
        session_id: impl Into<String>,
        content: impl Into<String>,
        code: u16,
    ) -> Self {
        Self::error(session_id, content).with_metadata("code", code)
    }

    /// 관리자 → 방문자 메시지.
    pub fn admin(
        session_id: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self::new(session_id, content, message_type)
            .with_direction(MessageDirection::AdminToVisitor)
    }

    /// 방향을 설정합니다.
    pub fn with_direction(mut self, direction: MessageDirection) -> Self {
        self.direction = direction;
        self
    }

    /// 메타데이터 항목을 추가합니다.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 방문자가 보낸 메타데이터를 붙입니다. 서버 전용 키는 버립니다.
    pub fn with_client_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata
            .into_iter()
            .filter(|(key, _)| !SERVER_METADATA_KEYS.contains(&key.as_str()))
            .collect();
        self
    }

    /// 메타데이터 문자열 값.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// 본문 앞부분 (로그용).
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.content.chars().take(max_chars).collect();
        if self.content.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }

    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_names() {
        let msg = Message::new("abc", "hello", MessageType::ReadReceipt).with_metadata("k", 1);
        let json: Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "read_receipt");
        assert_eq!(json["direction"], "visitor_to_admin");
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["metadata"]["k"], 1);
        assert!(json.get("message_type").is_none());
    }

    #[test]
    fn test_message_defaults_on_parse() {
        let msg = Message::from_json(r#"{"session_id":"s1","content":"hi"}"#).unwrap();

        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.direction, MessageDirection::VisitorToAdmin);
        assert_eq!(msg.id.len(), 36);
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(Message::from_json(r#"{"session_id":"s1","type":"sticker"}"#).is_err());
        assert!("sticker".parse::<MessageType>().is_err());
        assert_eq!("read_receipt".parse::<MessageType>(), Ok(MessageType::ReadReceipt));
    }

    #[test]
    fn test_constructors() {
        let sys = Message::system("s", "Connected");
        assert_eq!(sys.message_type, MessageType::System);
        assert_eq!(sys.direction, MessageDirection::System);

        let admin = Message::admin("s", "hello", MessageType::Admin);
        assert_eq!(admin.direction, MessageDirection::AdminToVisitor);

        let err = Message::error_with_code("s", "slow down", 4002);
        assert_eq!(err.metadata["code"], 4002);
    }

    #[test]
    fn test_client_metadata_drops_server_keys() {
        let mut metadata = Map::new();
        metadata.insert("file_path".to_string(), Value::from("/proc/self/environ"));
        metadata.insert("file_url".to_string(), Value::from("/files/x"));
        metadata.insert("file_size".to_string(), Value::from(3));
        metadata.insert("page".to_string(), Value::from("/pricing"));

        let msg = Message::new("s", "hi", MessageType::File).with_client_metadata(metadata);
        assert_eq!(msg.metadata.len(), 1);
        assert_eq!(msg.metadata_str("page"), Some("/pricing"));
        assert!(msg.metadata_str("file_path").is_none());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let msg = Message::new("s", "안녕하세요 반갑습니다", MessageType::Text);
        assert_eq!(msg.preview(5), "안녕하세요...");
        assert_eq!(msg.preview(100), "안녕하세요 반갑습니다");
    }

    #[test]
    fn test_type_flags() {
        assert!(MessageType::Voice.is_media());
        assert!(!MessageType::Text.is_media());
        assert!(MessageType::Typing.is_control());
        assert!(!MessageType::Admin.is_control());
    }
}
