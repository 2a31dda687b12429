//! 관리자 그룹 봇 핸들러.
//!
//! Long polling으로 관리자 그룹의 메시지를 수신하고 처리합니다.
//! - `/start` - 봇 소개
//! - `/help` - 사용법
//! - `/sessions` - 접속 중인 방문자 세션
//! - `/stats` - 서버 통계
//! - `/broadcast <text>` - 모든 방문자에게 전송
//!
//! 명령어가 아닌 메시지(답장, 음성, 사진, 문서)는 [`AdminUpdateHandler`]로 전달됩니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::TelegramClient;
use crate::types::{TelegramError, TelegramResult, TgMessage, Update};

/// 폴링 실패 후 재시도 대기 시간.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// 봇 명령어 타입.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// 봇 소개
    Start,
    /// 도움말
    Help,
    /// 활성 세션 목록
    Sessions,
    /// 서버 통계
    Stats,
    /// 전체 방문자에게 전송
    Broadcast { text: String },
    /// 알 수 없는 명령어
    Unknown(String),
}

impl BotCommand {
    /// 텍스트에서 명령어 파싱.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        // /명령어 형식 확인
        let Some(body) = text.strip_prefix('/') else {
            return BotCommand::Unknown(text.to_string());
        };

        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };
        // 그룹에서는 `/stats@my_bot` 형태로 들어옴
        let command = head.split('@').next().unwrap_or(head).to_lowercase();

        match command.as_str() {
            "start" => BotCommand::Start,
            "help" | "h" => BotCommand::Help,
            "sessions" => BotCommand::Sessions,
            "stats" => BotCommand::Stats,
            "broadcast" => BotCommand::Broadcast {
                text: rest.to_string(),
            },
            _ => BotCommand::Unknown(text.to_string()),
        }
    }
}

/// 명령어 응답 데이터.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// 응답 텍스트 (HTML 형식)
    pub text: String,
}

impl CommandResponse {
    /// HTML 형식 응답 생성.
    pub fn html(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// 관리자 업데이트 핸들러 trait.
///
/// 명령어와 일반 메시지의 실제 처리 로직을 구현합니다.
/// 응답이 `Some`이면 원본 메시지에 답장으로 전송됩니다.
#[async_trait]
pub trait AdminUpdateHandler: Send + Sync {
    /// `/sessions`, `/stats`, `/broadcast` 처리.
    async fn handle_command(
        &self,
        command: BotCommand,
        message: &TgMessage,
    ) -> TelegramResult<Option<CommandResponse>>;

    /// 명령어가 아닌 그룹 메시지 처리.
    async fn handle_message(&self, message: &TgMessage) -> TelegramResult<Option<CommandResponse>>;
}

/// 텔레그램 봇 핸들러.
///
/// Long polling으로 업데이트를 수신하고 관리자 그룹 메시지만 처리합니다.
pub struct TelegramBotHandler<H: AdminUpdateHandler> {
    client: TelegramClient,
    handler: Arc<H>,
    last_update_id: RwLock<i64>,
    group_chat_id: i64,
    /// 허용된 관리자 ID 목록 (비어 있으면 그룹 멤버 전체)
    admin_ids: Vec<i64>,
    poll_timeout_secs: u64,
    running: Arc<AtomicBool>,
}

impl<H: AdminUpdateHandler> TelegramBotHandler<H> {
    /// 새 봇 핸들러 생성.
    pub fn new(client: TelegramClient, handler: Arc<H>) -> Self {
        let group_chat_id = client.chat_id();

        Self {
            client,
            handler,
            last_update_id: RwLock::new(0),
            group_chat_id,
            admin_ids: Vec::new(),
            poll_timeout_secs: 30,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 허용 관리자 ID 설정.
    pub fn with_admin_ids(mut self, admin_ids: Vec<i64>) -> Self {
        self.admin_ids = admin_ids;
        self
    }

    /// 외부에서 만든 동작 플래그를 사용합니다.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// 폴링 동작 여부를 공유하는 플래그.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// 봇 폴링 시작.
    ///
    /// 취소 토큰이 취소될 때까지 업데이트를 수신합니다.
    pub async fn start_polling(&self, shutdown: CancellationToken) {
        match self.client.get_me().await {
            Ok(me) => info!(
                bot = %me.display_name(),
                group_chat_id = self.group_chat_id,
                "텔레그램 봇 폴링 시작"
            ),
            Err(e) => warn!("봇 정보 조회 실패, 폴링은 계속 시도합니다: {}", e),
        }

        self.running.store(true, Ordering::SeqCst);

        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.poll_updates() => result,
            };

            match result {
                Ok(updates) => {
                    self.running.store(true, Ordering::SeqCst);
                    for update in updates {
                        if let Err(e) = self.process_update(update).await {
                            error!("업데이트 처리 실패: {}", e);
                        }
                    }
                }
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    let delay = match e {
                        TelegramError::RateLimited(secs) => Duration::from_secs(secs),
                        _ => RETRY_DELAY,
                    };
                    error!("업데이트 폴링 실패: {}", e);

                    // 에러 발생 시 잠시 대기
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("텔레그램 봇 폴링 종료");
    }

    /// 업데이트 폴링.
    async fn poll_updates(&self) -> TelegramResult<Vec<Update>> {
        let last_id = *self.last_update_id.read().await;

        let updates = self
            .client
            .get_updates(last_id + 1, self.poll_timeout_secs)
            .await?;

        // 마지막 업데이트 ID 갱신
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            *self.last_update_id.write().await = last;
        }

        Ok(updates)
    }

    /// 개별 업데이트 처리.
    pub async fn process_update(&self, update: Update) -> TelegramResult<()> {
        let Some(message) = update.message else {
            return Ok(());
        };

        let chat_id = message.chat.id;

        // 관리자 그룹만 처리
        if chat_id != self.group_chat_id {
            debug!(chat_id, "관리자 그룹이 아닌 채팅의 메시지 무시");
            return Ok(());
        }

        if let Some(from) = &message.from {
            if from.is_bot {
                return Ok(());
            }
            if !self.admin_ids.is_empty() && !self.admin_ids.contains(&from.id) {
                warn!(user_id = from.id, "허용되지 않은 사용자의 메시지 무시");
                return Ok(());
            }
        }

        let response = if message.is_command() {
            let text = message.text.as_deref().unwrap_or_default();
            debug!(chat_id, text = %text, "명령어 수신");
            self.execute_command(BotCommand::parse(text), &message)
                .await?
        } else {
            self.handler.handle_message(&message).await?
        };

        // 응답 전송
        if let Some(response) = response {
            self.client
                .reply_to(chat_id, message.message_id, &response.text)
                .await?;
        }

        Ok(())
    }

    /// 명령어 실행.
    async fn execute_command(
        &self,
        command: BotCommand,
        message: &TgMessage,
    ) -> TelegramResult<Option<CommandResponse>> {
        match command {
            BotCommand::Start => Ok(Some(start_message())),
            BotCommand::Help => Ok(Some(help_message())),
            BotCommand::Unknown(text) => {
                debug!(text = %text, "알 수 없는 명령어 무시");
                Ok(None)
            }
            other => self.handler.handle_command(other, message).await,
        }
    }
}

/// `/start` 응답.
pub fn start_message() -> CommandResponse {
    CommandResponse::html(
        "🤖 <b>Website Chat Bridge Bot</b>\n\n\
         I bridge website visitors with this Telegram group.\n\n\
         <b>Available commands:</b>\n\
         /sessions - Show active visitor sessions\n\
         /stats - Show server statistics\n\
         /broadcast - Send message to all visitors\n\
         /help - Show this help message\n\n\
         To reply to a visitor, simply reply to their message in this group.",
    )
}

/// `/help` 응답.
pub fn help_message() -> CommandResponse {
    CommandResponse::html(
        "💡 <b>How to use this bot:</b>\n\n\
         1. Visitors connect via website\n\
         2. Their messages appear here\n\
         3. Reply to any message to respond to that visitor\n\
         4. Use /broadcast to message all visitors\n\
         5. Use /sessions to see who's online\n\n\
         <b>Tip:</b> You can send text, voice notes, photos, and files!",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(BotCommand::parse("/start"), BotCommand::Start);
        assert_eq!(BotCommand::parse("/help"), BotCommand::Help);
        assert_eq!(BotCommand::parse("/h"), BotCommand::Help);
        assert_eq!(BotCommand::parse("  /sessions  "), BotCommand::Sessions);
        assert_eq!(BotCommand::parse("/STATS"), BotCommand::Stats);
    }

    #[test]
    fn test_parse_strips_bot_name() {
        assert_eq!(BotCommand::parse("/stats@bridge_bot"), BotCommand::Stats);
        assert_eq!(
            BotCommand::parse("/broadcast@bridge_bot hi all"),
            BotCommand::Broadcast {
                text: "hi all".to_string()
            }
        );
    }

    #[test]
    fn test_parse_broadcast_keeps_text() {
        assert_eq!(
            BotCommand::parse("/broadcast  We are back   online "),
            BotCommand::Broadcast {
                text: "We are back   online".to_string()
            }
        );
        assert_eq!(
            BotCommand::parse("/broadcast"),
            BotCommand::Broadcast {
                text: String::new()
            }
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert!(matches!(BotCommand::parse("/unknown"), BotCommand::Unknown(_)));
        assert!(matches!(
            BotCommand::parse("not a command"),
            BotCommand::Unknown(_)
        ));
    }

    struct Silent;

    #[async_trait]
    impl AdminUpdateHandler for Silent {
        async fn handle_command(
            &self,
            _command: BotCommand,
            _message: &TgMessage,
        ) -> TelegramResult<Option<CommandResponse>> {
            Ok(None)
        }

        async fn handle_message(
            &self,
            _message: &TgMessage,
        ) -> TelegramResult<Option<CommandResponse>> {
            Ok(None)
        }
    }

    #[test]
    fn test_running_flag_is_shared() {
        use crate::client::TelegramConfig;

        let shared = Arc::new(AtomicBool::new(false));
        let client = TelegramClient::new(TelegramConfig::new("1:t", -100));
        let handler =
            TelegramBotHandler::new(client, Arc::new(Silent)).with_running_flag(Arc::clone(&shared));

        handler.running_flag().store(true, Ordering::SeqCst);
        assert!(shared.load(Ordering::SeqCst));
    }
}
