//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! REST 핸들러, WebSocket 핸들러, 텔레그램 관리자 라우터가 같은 상태를 공유합니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_core::{BridgeResult, Settings};
use bridge_telegram::{TelegramClient, TelegramConfig};
use chrono::{DateTime, Utc};

use crate::middleware::{RateLimitConfig, RateLimiter};
use crate::services::{
    AdminGateway, FileHandler, LoggingGateway, ReplyMap, SessionManager, TelegramGateway,
};
use crate::websocket::ConnectionRegistry;

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 설정
    pub settings: Arc<Settings>,

    /// 방문자 세션 관리자
    pub sessions: Arc<SessionManager>,

    /// 접속 중인 WebSocket 연결
    pub connections: Arc<ConnectionRegistry>,

    /// 임시 파일 저장소
    pub files: Arc<FileHandler>,

    /// 관리자 전달 게이트웨이
    pub gateway: Arc<dyn AdminGateway>,

    /// 텔레그램 메시지 ID → 세션 매핑
    pub reply_map: Arc<ReplyMap>,

    /// 텔레그램 클라이언트 (비활성이면 `None`)
    pub telegram: Option<TelegramClient>,

    /// 텔레그램 폴링 동작 여부
    pub bot_running: Arc<AtomicBool>,

    /// 세션별 메시지 rate limiter
    pub message_limiter: RateLimiter<String>,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: DateTime<Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 설정과 (선택적) 텔레그램 클라이언트로 상태를 생성합니다.
    pub fn new(settings: Arc<Settings>, telegram: Option<TelegramClient>) -> Self {
        let reply_map = Arc::new(ReplyMap::default());

        let gateway: Arc<dyn AdminGateway> = match &telegram {
            Some(client) => Arc::new(TelegramGateway::new(
                client.clone(),
                Arc::clone(&reply_map),
                &settings.temp_dir,
            )),
            None => Arc::new(LoggingGateway),
        };

        Self {
            sessions: Arc::new(SessionManager::new(
                settings.session_ttl(),
                settings.max_sessions,
            )),
            connections: Arc::new(ConnectionRegistry::new()),
            files: Arc::new(FileHandler::from_settings(&settings)),
            gateway,
            reply_map,
            telegram,
            bot_running: Arc::new(AtomicBool::new(false)),
            message_limiter: RateLimiter::new(RateLimitConfig::new(settings.rate_limit)),
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings,
        }
    }

    /// 설정에 따라 텔레그램 클라이언트를 구성하여 상태를 생성합니다.
    pub fn from_settings(settings: Arc<Settings>) -> BridgeResult<Self> {
        let telegram = TelegramConfig::from_settings(&settings)?.map(TelegramClient::new);
        Ok(Self::new(settings, telegram))
    }

    /// 게이트웨이를 교체합니다 (테스트용 대역 주입).
    pub fn with_gateway(mut self, gateway: Arc<dyn AdminGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram.is_some()
    }

    pub fn is_bot_running(&self) -> bool {
        self.bot_running.load(Ordering::SeqCst)
    }

    /// 서버 업타임 (초).
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

/// 테스트용 상태 생성.
#[cfg(test)]
pub fn create_test_state() -> AppState {
    let settings = Settings {
        debug: true,
        temp_dir: std::env::temp_dir().join("bridge-api-test"),
        ..Settings::default()
    };
    AppState::new(Arc::new(settings), None)
}
