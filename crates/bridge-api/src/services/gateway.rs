//! 방문자 메시지를 관리자에게 전달하는 게이트웨이.
//!
//! 텔레그램이 설정되어 있으면 [`TelegramGateway`], 아니면 [`LoggingGateway`]를 사용합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_core::{BridgeResult, Message, MessageType, VisitorInfo};
use bridge_telegram::format::{format_media_caption, format_visitor_joined, format_visitor_message};
use bridge_telegram::{TelegramClient, TelegramResult};
use tracing::{debug, error, info, warn};

use crate::metrics::record_telegram_error;
use crate::services::reply_map::ReplyMap;

/// 관리자 전달 게이트웨이 trait.
#[async_trait]
pub trait AdminGateway: Send + Sync {
    /// 방문자 메시지를 관리자에게 전달합니다.
    ///
    /// 전달된 텔레그램 메시지 ID가 있으면 반환합니다.
    async fn forward(&self, message: &Message) -> BridgeResult<Option<i64>>;

    /// 새 방문자 접속을 알립니다.
    async fn notify_visitor_joined(
        &self,
        session_id: &str,
        visitor: &VisitorInfo,
    ) -> BridgeResult<()>;

    /// 게이트웨이 이름 (로그/헬스 체크용).
    fn name(&self) -> &'static str;
}

/// 텔레그램 관리자 그룹으로 전달하는 게이트웨이.
///
/// 업로드는 `temp_dir` 아래에 저장된 파일만 읽습니다.
pub struct TelegramGateway {
    client: TelegramClient,
    reply_map: Arc<ReplyMap>,
    temp_dir: PathBuf,
}

impl TelegramGateway {
    pub fn new(
        client: TelegramClient,
        reply_map: Arc<ReplyMap>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            reply_map,
            temp_dir: temp_dir.into(),
        }
    }

    /// 임시 디렉토리 안의 파일이면 정규화된 경로를 반환합니다.
    async fn confined_path(&self, path: &Path) -> Option<PathBuf> {
        let root = tokio::fs::canonicalize(&self.temp_dir).await.ok()?;
        let resolved = tokio::fs::canonicalize(path).await.ok()?;
        resolved.starts_with(&root).then_some(resolved)
    }

    /// 첨부 파일을 실제 파일로 업로드합니다.
    async fn upload_media(&self, message: &Message, path: &Path) -> TelegramResult<i64> {
        let data = match self.confined_path(path).await {
            Some(resolved) => tokio::fs::read(&resolved).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "임시 디렉토리 밖의 경로",
            )),
        };
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                // 파일이 없거나 허용되지 않으면 텍스트 알림으로 대체
                warn!(path = %path.display(), "첨부 파일 읽기 실패, 텍스트로 전달: {}", e);
                return self
                    .client
                    .send_message(self.client.chat_id(), &format_visitor_message(message))
                    .await;
            }
        };

        let file_name = message
            .metadata_str("file_name")
            .map(str::to_string)
            .or_else(|| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "file.bin".to_string());
        let caption = format_media_caption(message);
        let chat_id = self.client.chat_id();

        match message.message_type {
            MessageType::Voice => {
                self.client
                    .send_voice(chat_id, data, &file_name, Some(&caption))
                    .await
            }
            MessageType::Image => {
                self.client
                    .send_photo(chat_id, data, &file_name, Some(&caption))
                    .await
            }
            _ => {
                self.client
                    .send_document(chat_id, data, &file_name, Some(&caption))
                    .await
            }
        }
    }
}

#[async_trait]
impl AdminGateway for TelegramGateway {
    async fn forward(&self, message: &Message) -> BridgeResult<Option<i64>> {
        let file_path = message
            .metadata_str("file_path")
            .filter(|_| message.message_type.is_media());

        let result = match file_path {
            Some(path) => self.upload_media(message, Path::new(path)).await,
            None => {
                self.client
                    .send_message(self.client.chat_id(), &format_visitor_message(message))
                    .await
            }
        };

        match result {
            Ok(telegram_message_id) => {
                self.reply_map
                    .insert_session(telegram_message_id, &message.session_id)
                    .await;
                debug!(
                    session_id = %message.session_id,
                    telegram_message_id,
                    message_type = %message.message_type,
                    "방문자 메시지 전달"
                );
                Ok(Some(telegram_message_id))
            }
            Err(e) => {
                record_telegram_error("forward");
                error!(session_id = %message.session_id, "텔레그램 전달 실패: {}", e);
                Err(e.into())
            }
        }
    }

    async fn notify_visitor_joined(
        &self,
        session_id: &str,
        visitor: &VisitorInfo,
    ) -> BridgeResult<()> {
        let text = format_visitor_joined(session_id, visitor);
        match self.client.send_message(self.client.chat_id(), &text).await {
            Ok(telegram_message_id) => {
                // 접속 알림에 답장해도 해당 방문자에게 전달
                self.reply_map
                    .insert_session(telegram_message_id, session_id)
                    .await;
                Ok(())
            }
            Err(e) => {
                record_telegram_error("notify_joined");
                warn!(session_id, "접속 알림 전송 실패: {}", e);
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

/// 텔레그램 없이 로그만 남기는 게이트웨이.
#[derive(Debug, Default)]
pub struct LoggingGateway;

#[async_trait]
impl AdminGateway for LoggingGateway {
    async fn forward(&self, message: &Message) -> BridgeResult<Option<i64>> {
        info!(
            session_id = %message.session_id,
            message_type = %message.message_type,
            content = %message.preview(50),
            "방문자 메시지 (텔레그램 비활성)"
        );
        Ok(None)
    }

    async fn notify_visitor_joined(
        &self,
        session_id: &str,
        visitor: &VisitorInfo,
    ) -> BridgeResult<()> {
        info!(session_id, ip = %visitor.ip_address, "새 방문자 접속 (텔레그램 비활성)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
