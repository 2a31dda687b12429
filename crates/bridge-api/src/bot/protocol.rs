//! `Visitor {session}` 프로토콜 프레임.

use bridge_telegram::format::escape_html;
use bridge_telegram::TgMessage;
use serde::{Deserialize, Serialize};

/// 그룹 메시지에서 세션을 찾을 때 쓰는 표식.
pub const VISITOR_MARKER: &str = "Visitor ";

/// 접속 직후 첫 프레임.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    #[serde(default)]
    pub session: Option<String>,
}

impl Hello {
    /// 첫 프레임에서 세션 ID를 꺼냅니다. 없거나 비어 있으면 `None`.
    pub fn session_from(text: &str) -> Option<String> {
        serde_json::from_str::<Hello>(text)
            .ok()
            .and_then(|hello| hello.session)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && !s.contains(char::is_whitespace))
    }
}

/// 방문자 → 봇 프레임.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VisitorFrame {
    Text {
        text: String,
    },
    Voice {
        file: Vec<u8>,
    },
    File {
        #[serde(default = "default_file_name")]
        name: String,
        file: Vec<u8>,
    },
}

fn default_file_name() -> String {
    "file".to_string()
}

/// 봇 → 방문자 프레임.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdminPayload {
    Text { text: String },
    Voice { file_path: String },
    File { file_path: String },
}

/// 관리자 답장에서 방문자에게 보낼 내용의 출처.
///
/// 텍스트 < 음성 < 문서 순으로 나중 것이 우선합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminContent {
    Text(String),
    Voice { file_id: String },
    Document { file_id: String },
}

impl AdminContent {
    pub fn from_message(message: &TgMessage) -> Option<Self> {
        let mut content = message.text.clone().map(AdminContent::Text);
        if let Some(voice) = &message.voice {
            content = Some(AdminContent::Voice {
                file_id: voice.file_id.clone(),
            });
        }
        if let Some(document) = &message.document {
            content = Some(AdminContent::Document {
                file_id: document.file_id.clone(),
            });
        }
        content
    }
}

/// 답장 대상 메시지(본문 또는 캡션)에서 세션 ID를 찾습니다.
///
/// `"Visitor "` 뒤의 첫 단어가 세션입니다.
pub fn session_from_reply(message: &TgMessage) -> Option<String> {
    let origin = message.reply_to_message.as_ref()?.text_or_caption()?;
    let (_, rest) = origin.split_once(VISITOR_MARKER)?;
    rest.split_whitespace().next().map(str::to_string)
}

/// 그룹에 올리는 접속 알림.
pub fn connected_text(session: &str) -> String {
    format!("{}{} connected", VISITOR_MARKER, escape_html(session))
}

/// 그룹에 올리는 방문자 텍스트.
pub fn visitor_text(session: &str, text: &str) -> String {
    format!(
        "{}{}\n\n{}",
        VISITOR_MARKER,
        escape_html(session),
        escape_html(text)
    )
}

/// 음성/파일 캡션.
pub fn visitor_caption(session: &str) -> String {
    format!("{}{}", VISITOR_MARKER, escape_html(session))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: serde_json::Value) -> TgMessage {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_hello_requires_session() {
        assert_eq!(
            Hello::session_from(r#"{"session": "abc123"}"#).as_deref(),
            Some("abc123")
        );
        assert_eq!(Hello::session_from(r#"{"session": ""}"#), None);
        assert_eq!(Hello::session_from(r#"{"user": "x"}"#), None);
        assert_eq!(Hello::session_from("not json"), None);
    }

    #[test]
    fn test_visitor_frames() {
        let text: VisitorFrame = serde_json::from_str(r#"{"type":"text","text":"hi"}"#).unwrap();
        assert_eq!(
            text,
            VisitorFrame::Text {
                text: "hi".to_string()
            }
        );

        let voice: VisitorFrame =
            serde_json::from_str(r#"{"type":"voice","file":[79,103,103,83]}"#).unwrap();
        assert_eq!(
            voice,
            VisitorFrame::Voice {
                file: b"OggS".to_vec()
            }
        );

        let file: VisitorFrame = serde_json::from_str(r#"{"type":"file","file":[1,2]}"#).unwrap();
        assert_eq!(
            file,
            VisitorFrame::File {
                name: "file".to_string(),
                file: vec![1, 2]
            }
        );

        assert!(serde_json::from_str::<VisitorFrame>(r#"{"type":"sticker"}"#).is_err());
    }

    #[test]
    fn test_session_from_reply_text_and_caption() {
        let reply_to_text = message(serde_json::json!({
            "message_id": 2,
            "chat": {"id": -100},
            "text": "hello",
            "reply_to_message": {
                "message_id": 1,
                "chat": {"id": -100},
                "text": "Visitor abc123\n\nneed help"
            }
        }));
        assert_eq!(session_from_reply(&reply_to_text).as_deref(), Some("abc123"));

        let reply_to_caption = message(serde_json::json!({
            "message_id": 3,
            "chat": {"id": -100},
            "text": "ok",
            "reply_to_message": {
                "message_id": 1,
                "chat": {"id": -100},
                "caption": "Visitor s-9"
            }
        }));
        assert_eq!(session_from_reply(&reply_to_caption).as_deref(), Some("s-9"));

        let connected = message(serde_json::json!({
            "message_id": 4,
            "chat": {"id": -100},
            "text": "welcome",
            "reply_to_message": {
                "message_id": 1,
                "chat": {"id": -100},
                "text": "Visitor xyz connected"
            }
        }));
        assert_eq!(session_from_reply(&connected).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_session_from_reply_ignores_other_messages() {
        let not_reply = message(serde_json::json!({
            "message_id": 2,
            "chat": {"id": -100},
            "text": "Visitor abc"
        }));
        assert_eq!(session_from_reply(&not_reply), None);

        let unrelated = message(serde_json::json!({
            "message_id": 2,
            "chat": {"id": -100},
            "text": "hi",
            "reply_to_message": {"message_id": 1, "chat": {"id": -100}, "text": "lunch?"}
        }));
        assert_eq!(session_from_reply(&unrelated), None);
    }

    #[test]
    fn test_admin_content_priority() {
        let document_wins = message(serde_json::json!({
            "message_id": 2,
            "chat": {"id": -100},
            "text": "see attached",
            "voice": {"file_id": "v1"},
            "document": {"file_id": "d1"}
        }));
        assert_eq!(
            AdminContent::from_message(&document_wins),
            Some(AdminContent::Document {
                file_id: "d1".to_string()
            })
        );

        let voice = message(serde_json::json!({
            "message_id": 2,
            "chat": {"id": -100},
            "voice": {"file_id": "v1"}
        }));
        assert_eq!(
            AdminContent::from_message(&voice),
            Some(AdminContent::Voice {
                file_id: "v1".to_string()
            })
        );

        let photo_only = message(serde_json::json!({
            "message_id": 2,
            "chat": {"id": -100},
            "photo": [{"file_id": "p"}]
        }));
        assert_eq!(AdminContent::from_message(&photo_only), None);
    }

    #[test]
    fn test_group_texts_escape_html() {
        assert_eq!(connected_text("a1"), "Visitor a1 connected");
        assert_eq!(visitor_text("a1", "1 < 2"), "Visitor a1\n\n1 &lt; 2");
        assert_eq!(visitor_caption("a1"), "Visitor a1");
        assert_eq!(
            serde_json::to_value(AdminPayload::Voice {
                file_path: "voice/file_1.oga".to_string()
            })
            .unwrap(),
            serde_json::json!({"type": "voice", "file_path": "voice/file_1.oga"})
        );
    }
}
