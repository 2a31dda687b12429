//! Telegram Bot API 클라이언트.
//!
//! reqwest로 Bot API를 직접 호출합니다. 메시지는 HTML 파싱 모드로 전송합니다.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::Settings;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::types::{ApiResponse, TelegramError, TelegramResult, TgFile, TgMessage, TgUser, Update};

/// Bot API 기본 주소.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// 일반 요청 타임아웃.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 텔레그램 연동 설정.
#[derive(Debug)]
pub struct TelegramConfig {
    /// @BotFather에서 받은 봇 토큰
    pub bot_token: SecretString,
    /// 관리자 그룹 채팅 ID
    pub chat_id: i64,
    /// Bot API 기본 주소 (테스트에서 교체)
    pub api_base: String,
    /// 전송 활성화 여부
    pub enabled: bool,
    /// 파싱 모드 (HTML 또는 MarkdownV2)
    pub parse_mode: String,
}

impl TelegramConfig {
    /// 새 텔레그램 설정을 생성합니다.
    pub fn new(bot_token: impl Into<String>, chat_id: i64) -> Self {
        Self {
            bot_token: SecretString::new(bot_token.into().into()),
            chat_id,
            api_base: TELEGRAM_API_BASE.to_string(),
            enabled: true,
            parse_mode: "HTML".to_string(),
        }
    }

    /// Bot API 기본 주소를 설정합니다.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// 브리지 설정에서 생성합니다. 토큰이 비어 있으면 `None`.
    pub fn from_settings(settings: &Settings) -> TelegramResult<Option<Self>> {
        if !settings.telegram_enabled() {
            return Ok(None);
        }

        let chat_id = settings
            .group_chat_id()
            .map_err(|e| TelegramError::InvalidConfig(e.to_string()))?;

        Ok(Some(Self::new(
            settings.telegram_bot_token.expose_secret(),
            chat_id,
        )))
    }
}

/// Telegram Bot API 클라이언트.
///
/// 내부 상태를 `Arc`로 공유하므로 복제 비용이 작습니다.
#[derive(Clone)]
pub struct TelegramClient {
    config: Arc<TelegramConfig>,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("chat_id", &self.config.chat_id)
            .field("api_base", &self.config.api_base)
            .finish()
    }
}

impl TelegramClient {
    /// 새 클라이언트를 생성합니다.
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
        }
    }

    /// 관리자 그룹 채팅 ID.
    pub fn chat_id(&self) -> i64 {
        self.config.chat_id
    }

    /// 전송 활성화 여부.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.expose_secret().is_empty()
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base,
            self.config.bot_token.expose_secret(),
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.config.api_base,
            self.config.bot_token.expose_secret(),
            file_path.trim_start_matches('/')
        )
    }

    /// JSON 본문으로 Bot API를 호출합니다.
    async fn api_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
        timeout: Duration,
    ) -> TelegramResult<T> {
        if !self.is_enabled() {
            return Err(TelegramError::Disabled);
        }

        let response = self
            .client
            .post(self.method_url(method))
            .json(params)
            .timeout(timeout)
            .send()
            .await?;

        self.parse_response(method, response).await
    }

    /// multipart 본문으로 Bot API를 호출합니다.
    async fn api_call_multipart<T: DeserializeOwned>(
        &self,
        method: &str,
        form: Form,
    ) -> TelegramResult<T> {
        if !self.is_enabled() {
            return Err(TelegramError::Disabled);
        }

        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        self.parse_response(method, response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> TelegramResult<T> {
        let status = response.status();
        let body = response.text().await?;

        let parsed: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                error!(method, status = %status, "텔레그램 API 호출 실패");
                return Err(TelegramError::Api {
                    code: i64::from(status.as_u16()),
                    description: body,
                });
            }
        };

        let code = parsed
            .error_code
            .unwrap_or_else(|| i64::from(status.as_u16()));

        if code == 429 {
            let retry_after = parsed
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(60);
            warn!(method, retry_after, "텔레그램 요청 한도 초과");
            return Err(TelegramError::RateLimited(retry_after));
        }

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            (_, _) => {
                let description = parsed
                    .description
                    .unwrap_or_else(|| "unknown error".to_string());
                error!(method, code, description = %description, "텔레그램 API 에러");
                Err(TelegramError::Api { code, description })
            }
        }
    }

    /// 봇 정보를 조회합니다 (토큰 검증).
    pub async fn get_me(&self) -> TelegramResult<TgUser> {
        self.api_call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT)
            .await
    }

    /// 텍스트 메시지를 전송하고 메시지 ID를 반환합니다.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<i64> {
        self.send_text(chat_id, text, None).await
    }

    /// 특정 메시지에 답장합니다.
    pub async fn reply_to(
        &self,
        chat_id: i64,
        reply_to_message_id: i64,
        text: &str,
    ) -> TelegramResult<i64> {
        self.send_text(chat_id, text, Some(reply_to_message_id))
            .await
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> TelegramResult<i64> {
        let mut params = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": self.config.parse_mode,
            "disable_web_page_preview": true,
        });
        if let Some(reply_to) = reply_to {
            params["reply_to_message_id"] = serde_json::json!(reply_to);
            params["allow_sending_without_reply"] = serde_json::json!(true);
        }

        let sent: TgMessage = self
            .api_call("sendMessage", &params, REQUEST_TIMEOUT)
            .await?;
        debug!(chat_id, message_id = sent.message_id, "텔레그램 메시지 전송 완료");
        Ok(sent.message_id)
    }

    /// 음성 파일을 전송합니다.
    pub async fn send_voice(
        &self,
        chat_id: i64,
        data: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> TelegramResult<i64> {
        self.send_media("sendVoice", "voice", chat_id, data, file_name, caption)
            .await
    }

    /// 사진을 전송합니다.
    pub async fn send_photo(
        &self,
        chat_id: i64,
        data: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> TelegramResult<i64> {
        self.send_media("sendPhoto", "photo", chat_id, data, file_name, caption)
            .await
    }

    /// 문서를 전송합니다.
    pub async fn send_document(
        &self,
        chat_id: i64,
        data: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> TelegramResult<i64> {
        self.send_media("sendDocument", "document", chat_id, data, file_name, caption)
            .await
    }

    async fn send_media(
        &self,
        method: &str,
        field: &'static str,
        chat_id: i64,
        data: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> TelegramResult<i64> {
        let size = data.len();
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field, Part::bytes(data).file_name(file_name.to_string()));

        if let Some(caption) = caption {
            form = form
                .text("caption", caption.to_string())
                .text("parse_mode", self.config.parse_mode.clone());
        }

        let sent: TgMessage = self.api_call_multipart(method, form).await?;
        debug!(
            chat_id,
            method,
            size,
            message_id = sent.message_id,
            "텔레그램 파일 전송 완료"
        );
        Ok(sent.message_id)
    }

    /// 파일 정보를 조회합니다.
    pub async fn get_file(&self, file_id: &str) -> TelegramResult<TgFile> {
        self.api_call(
            "getFile",
            &serde_json::json!({ "file_id": file_id }),
            REQUEST_TIMEOUT,
        )
        .await
    }

    /// `getFile`의 `file_path`로 파일 내용을 내려받습니다.
    pub async fn download_file(&self, file_path: &str) -> TelegramResult<Vec<u8>> {
        if !self.is_enabled() {
            return Err(TelegramError::Disabled);
        }

        let response = self
            .client
            .get(self.file_url(file_path))
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelegramError::Api {
                code: i64::from(status.as_u16()),
                description: format!("파일 다운로드 실패: {}", file_path),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// 파일 ID로 바로 내려받습니다.
    pub async fn fetch_file(&self, file_id: &str) -> TelegramResult<(TgFile, Vec<u8>)> {
        let file = self.get_file(file_id).await?;
        let path = file.file_path.clone().ok_or_else(|| TelegramError::Api {
            code: 400,
            description: format!("file_path 없음: {}", file_id),
        })?;
        let data = self.download_file(&path).await?;
        Ok((file, data))
    }

    /// Long polling으로 업데이트를 가져옵니다.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> TelegramResult<Vec<Update>> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });

        self.api_call(
            "getUpdates",
            &params,
            Duration::from_secs(timeout_secs + 5),
        )
        .await
    }
}
