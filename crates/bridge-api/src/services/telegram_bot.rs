//! 관리자 그룹 메시지를 방문자에게 전달하는 라우터.
//!
//! [`TelegramBotHandler`](bridge_telegram::TelegramBotHandler)가 수신한 명령어와 메시지를
//! 세션/연결 상태와 연결합니다.
//!
//! - 답장: 매핑된 방문자 세션(또는 전체)으로 전달
//! - 일반 텍스트: 모든 방문자에게 전달
//! - 음성/사진/문서: 내려받아 임시 디렉토리에 저장 후 `/files/{name}` URL로 전달

use async_trait::async_trait;
use bridge_core::{Message, MessageDirection, MessageType};
use bridge_telegram::format::{escape_html, short_session};
use bridge_telegram::{
    AdminUpdateHandler, BotCommand, CommandResponse, TelegramClient, TelegramError,
    TelegramResult, TgMessage,
};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::metrics::record_bridge_message;
use crate::services::reply_map::ReplyTarget;
use crate::state::AppState;

/// `/sessions`에 표시할 최대 세션 수.
const MAX_LISTED_SESSIONS: usize = 10;

const UNMAPPED_REPLY: &str = "⚠️ Cannot identify which visitor to reply to. \
                              Please reply directly to a visitor's message.";
const BROADCAST_USAGE: &str =
    "Usage: /broadcast Your message here\nSends message to all connected visitors.";
const MEDIA_FALLBACK: &str = "📎 File/Media message";

/// 관리자 업데이트 라우터.
pub struct AdminRouter {
    state: AppState,
    client: TelegramClient,
}

/// 내려받은 관리자 첨부 파일.
struct AdminMedia {
    message_type: MessageType,
    content: String,
    metadata: Vec<(&'static str, Value)>,
}

impl AdminRouter {
    pub fn new(state: AppState, client: TelegramClient) -> Self {
        Self { state, client }
    }

    /// 답장 대상 결정. 답장이 아니거나 매핑이 없으면 `None`.
    async fn reply_target(&self, message: &TgMessage) -> Option<ReplyTarget> {
        let replied = message.reply_to_message.as_ref()?;
        self.state.reply_map.get(replied.message_id).await
    }

    /// 관리자 메시지 공통 메타데이터.
    fn admin_message(
        &self,
        message: &TgMessage,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Message {
        let mut admin = Message::admin("", content, message_type)
            .with_metadata("from_admin", message.sender_name())
            .with_metadata("telegram_message_id", message.message_id);
        if let Some(replied) = &message.reply_to_message {
            admin = admin.with_metadata("in_reply_to", replied.message_id);
        }
        admin
    }

    /// 대상에게 전달하고 받은 방문자 수를 반환합니다.
    async fn deliver(&self, target: &ReplyTarget, mut message: Message) -> usize {
        record_bridge_message(MessageDirection::AdminToVisitor, message.message_type);

        match target {
            ReplyTarget::Session(session_id) => {
                message.session_id = session_id.clone();
                if self.state.connections.send_to(session_id, message).await {
                    self.state.sessions.update_activity(session_id).await;
                    1
                } else {
                    0
                }
            }
            ReplyTarget::Broadcast => self.state.connections.broadcast(&message, None).await,
        }
    }

    /// 전달 실패 시 그룹에 알릴 문구.
    fn undelivered(target: &ReplyTarget) -> CommandResponse {
        match target {
            ReplyTarget::Session(session_id) => CommandResponse::html(format!(
                "⚠️ Visitor <code>{}</code> is no longer connected.",
                escape_html(&short_session(session_id))
            )),
            ReplyTarget::Broadcast => CommandResponse::html("⚠️ No visitors are connected."),
        }
    }

    async fn sessions_text(&self) -> String {
        let sessions = self.state.sessions.active_sessions().await;
        if sessions.is_empty() {
            return "No active visitor sessions.".to_string();
        }

        let mut text = String::from("👥 <b>Active Visitor Sessions:</b>\n\n");
        for session in sessions.iter().take(MAX_LISTED_SESSIONS) {
            text.push_str(&format!(
                "• Session: <code>{}</code>\n  Duration: {}\n  Messages: {}\n",
                escape_html(&short_session(&session.session_id)),
                session.duration,
                session.message_count
            ));
            let user_agent = &session.visitor_info.user_agent;
            if !user_agent.is_empty() {
                let browser: String = user_agent.chars().take(30).collect();
                text.push_str(&format!("  Browser: {}...\n", escape_html(&browser)));
            }
            text.push('\n');
        }

        if sessions.len() > MAX_LISTED_SESSIONS {
            text.push_str(&format!(
                "... and {} more sessions",
                sessions.len() - MAX_LISTED_SESSIONS
            ));
        }
        text
    }

    async fn stats_text(&self) -> String {
        let stats = self.state.sessions.statistics().await;
        format!(
            "📊 <b>Server Statistics:</b>\n\n\
             • Active sessions: {}\n\
             • Total sessions today: {}\n\
             • Messages today: {}\n\
             • Uptime: {}\n\
             • Memory usage: {:.1} MB\n",
            stats.active_sessions,
            stats.total_sessions_today,
            stats.messages_today,
            stats.uptime,
            stats.memory_usage_mb
        )
    }

    async fn broadcast(&self, message: &TgMessage, text: &str) -> CommandResponse {
        if text.is_empty() {
            return CommandResponse::html(BROADCAST_USAGE);
        }

        let admin = self.admin_message(
            message,
            format!("📢 Admin Broadcast: {}", text),
            MessageType::Admin,
        );
        let delivered = self.deliver(&ReplyTarget::Broadcast, admin).await;
        info!(delivered, "관리자 브로드캐스트");

        CommandResponse::html(format!(
            "Broadcast sent to {} active visitor(s).",
            delivered
        ))
    }

    /// 음성/사진/문서를 내려받아 저장합니다. 첨부가 없으면 `None`.
    async fn download_media(&self, message: &TgMessage) -> Option<TelegramResult<AdminMedia>> {
        let id = message.message_id;

        let (file_id, message_type, content, name, mut metadata) =
            if let Some(voice) = &message.voice {
                (
                    voice.file_id.clone(),
                    MessageType::Voice,
                    "🎤 Voice message from admin".to_string(),
                    format!("voice_{}.ogg", id),
                    vec![("voice_duration", Value::from(voice.duration))],
                )
            } else if let Some(photo) = message.largest_photo() {
                (
                    photo.file_id.clone(),
                    MessageType::Image,
                    "🖼️ Photo from admin".to_string(),
                    format!("photo_{}.jpg", id),
                    Vec::new(),
                )
            } else if let Some(document) = &message.document {
                let file_name = document
                    .file_name
                    .clone()
                    .unwrap_or_else(|| format!("document_{}", id));
                (
                    document.file_id.clone(),
                    MessageType::File,
                    format!("📎 {} from admin", file_name),
                    file_name.clone(),
                    vec![
                        ("file_name", Value::from(file_name)),
                        (
                            "mime_type",
                            Value::from(
                                document
                                    .mime_type
                                    .clone()
                                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                            ),
                        ),
                    ],
                )
            } else {
                return None;
            };

        let result = async {
            let (_, data) = self.client.fetch_file(&file_id).await?;
            let url = match self.state.files.save_named(&data, &name).await {
                Ok(path) => self.state.files.file_url(&path),
                Err(e) => {
                    // 저장에 실패해도 안내 메시지는 전달
                    error!("관리자 첨부 파일 저장 실패: {}", e);
                    String::new()
                }
            };

            metadata.push(("file_size", Value::from(data.len() as u64)));
            if !url.is_empty() {
                metadata.push(("file_url", Value::from(url)));
            }
            Ok::<_, TelegramError>(AdminMedia {
                message_type,
                content,
                metadata,
            })
        }
        .await;

        Some(result)
    }

    async fn handle_media(
        &self,
        message: &TgMessage,
        media: TelegramResult<AdminMedia>,
    ) -> TelegramResult<Option<CommandResponse>> {
        let media = match media {
            Ok(media) => media,
            Err(e) => {
                error!(message_id = message.message_id, "관리자 첨부 파일 다운로드 실패: {}", e);
                return Ok(Some(CommandResponse::html(
                    "⚠️ Failed to download the file from Telegram.",
                )));
            }
        };

        // 매핑이 없는 답장이나 일반 첨부는 전체 방문자에게
        let target = self
            .reply_target(message)
            .await
            .unwrap_or(ReplyTarget::Broadcast);
        self.state
            .reply_map
            .insert(message.message_id, target.clone())
            .await;

        let mut admin = self.admin_message(message, media.content, media.message_type);
        for (key, value) in media.metadata {
            admin = admin.with_metadata(key, value);
        }

        if self.deliver(&target, admin).await == 0 {
            return Ok(Some(Self::undelivered(&target)));
        }
        Ok(None)
    }

    async fn handle_reply(&self, message: &TgMessage) -> TelegramResult<Option<CommandResponse>> {
        let Some(target) = self.reply_target(message).await else {
            return Ok(Some(CommandResponse::html(UNMAPPED_REPLY)));
        };

        let content = message
            .text_or_caption()
            .unwrap_or(MEDIA_FALLBACK)
            .to_string();
        let admin = self.admin_message(message, content, MessageType::Admin);

        // 이어지는 답장도 같은 방문자에게
        self.state
            .reply_map
            .insert(message.message_id, target.clone())
            .await;

        let delivered = self.deliver(&target, admin).await;
        info!(target = ?target, delivered, "관리자 답장 전달");

        if delivered == 0 {
            return Ok(Some(Self::undelivered(&target)));
        }
        Ok(None)
    }
}

#[async_trait]
impl AdminUpdateHandler for AdminRouter {
    async fn handle_command(
        &self,
        command: BotCommand,
        message: &TgMessage,
    ) -> TelegramResult<Option<CommandResponse>> {
        let response = match command {
            BotCommand::Sessions => CommandResponse::html(self.sessions_text().await),
            BotCommand::Stats => CommandResponse::html(self.stats_text().await),
            BotCommand::Broadcast { text } => self.broadcast(message, &text).await,
            other => {
                debug!(command = ?other, "처리하지 않는 명령어");
                return Ok(None);
            }
        };
        Ok(Some(response))
    }

    async fn handle_message(&self, message: &TgMessage) -> TelegramResult<Option<CommandResponse>> {
        if let Some(media) = self.download_media(message).await {
            return self.handle_media(message, media).await;
        }

        if message.reply_to_message.is_some() {
            return self.handle_reply(message).await;
        }

        let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };

        let admin = self.admin_message(message, format!("💬 Admin: {}", text), MessageType::Admin);
        self.state
            .reply_map
            .insert(message.message_id, ReplyTarget::Broadcast)
            .await;
        let delivered = self.deliver(&ReplyTarget::Broadcast, admin).await;
        debug!(delivered, "관리자 메시지 전체 전달");

        Ok(None)
    }
}
