//! 텔레그램 에러 타입과 Bot API 업데이트 모델.

use bridge_core::BridgeError;
use serde::{Deserialize, Serialize};

/// 텔레그램 연동 에러.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("텔레그램 연동이 비활성화되어 있습니다")]
    Disabled,

    #[error("잘못된 설정: {0}")]
    InvalidConfig(String),

    #[error("텔레그램 API 에러 ({code}): {description}")]
    Api { code: i64, description: String },

    #[error("요청 한도 초과: {0}초 후 재시도")]
    RateLimited(u64),

    #[error("네트워크 에러: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// 텔레그램 작업을 위한 Result 타입.
pub type TelegramResult<T> = Result<T, TelegramError>;

impl TelegramError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelegramError::RateLimited(_) | TelegramError::NetworkError(_) => true,
            TelegramError::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

impl From<TelegramError> for BridgeError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::RateLimited(secs) => BridgeError::RateLimited(secs),
            TelegramError::InvalidConfig(msg) => BridgeError::Config(msg),
            other => BridgeError::Telegram(other.to_string()),
        }
    }
}

/// Bot API 공통 응답 래퍼.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
}

/// 개별 업데이트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
}

/// 메시지 정보.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<TgMessage>>,
    #[serde(default)]
    pub voice: Option<Voice>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub document: Option<Document>,
}

impl TgMessage {
    /// 본문 또는 캡션.
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// 가장 큰 해상도의 사진.
    pub fn largest_photo(&self) -> Option<&PhotoSize> {
        self.photo.as_ref().and_then(|sizes| sizes.last())
    }

    /// `/`로 시작하는 명령어인지.
    pub fn is_command(&self) -> bool {
        self.text
            .as_deref()
            .map(|t| t.trim_start().starts_with('/'))
            .unwrap_or(false)
    }

    /// 보낸 사람 표시 이름 (username → 이름 → "Admin").
    pub fn sender_name(&self) -> String {
        self.from
            .as_ref()
            .map(TgUser::display_name)
            .unwrap_or_else(|| "Admin".to_string())
    }
}

/// 사용자 정보.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl TgUser {
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ if !self.first_name.is_empty() => self.first_name.clone(),
            _ => "Admin".to_string(),
        }
    }
}

/// 채팅 정보.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub chat_type: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// 사진 크기별 정보.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// 음성 메시지.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// 문서 첨부.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// `getFile` 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgFile {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_with_photo() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                "chat": {"id": -100, "type": "supergroup", "title": "Support"},
                "date": 1700000000,
                "caption": "look",
                "photo": [
                    {"file_id": "small", "width": 90, "height": 90},
                    {"file_id": "big", "width": 800, "height": 800, "file_size": 5000}
                ],
                "reply_to_message": {
                    "message_id": 3,
                    "chat": {"id": -100, "type": "supergroup"},
                    "text": "Visitor abc"
                }
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        let msg = update.message.unwrap();

        assert_eq!(msg.text_or_caption(), Some("look"));
        assert_eq!(msg.largest_photo().unwrap().file_id, "big");
        assert_eq!(msg.reply_to_message.as_ref().unwrap().message_id, 3);
        assert_eq!(msg.sender_name(), "Ann");
        assert!(!msg.is_command());
    }

    #[test]
    fn test_error_conversion() {
        let err: BridgeError = TelegramError::RateLimited(7).into();
        assert!(matches!(err, BridgeError::RateLimited(7)));

        let api = TelegramError::Api {
            code: 400,
            description: "Bad Request".to_string(),
        };
        assert!(!api.is_retryable());
        assert!(matches!(BridgeError::from(api), BridgeError::Telegram(_)));
    }
}
