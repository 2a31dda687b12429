//! `Visitor {session}` 프로토콜의 독립 WebSocket 봇.
//!
//! `PORT`(없으면 `WS_PORT`)의 `/`에서 방문자 소켓을 받고,
//! 관리자 그룹을 long polling으로 수신합니다.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bridge_api::bot::{bot_router, WebSocketBot};
use bridge_api::shutdown::shutdown_signal;
use bridge_core::{init_logging, LogConfig, Settings};
use bridge_telegram::{TelegramBotHandler, TelegramClient, TelegramConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("설정 로드 실패")?;
    let _log_guard = init_logging(LogConfig::from_settings(&settings))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    let config = TelegramConfig::from_settings(&settings)?
        .context("websocket-bot은 TELEGRAM_BOT_TOKEN과 TELEGRAM_GROUP_ID가 필요합니다")?;
    let client = TelegramClient::new(config);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(settings.ws_port);
    let addr = SocketAddr::new(
        settings
            .host
            .parse()
            .with_context(|| format!("HOST가 올바르지 않습니다: {}", settings.host))?,
        port,
    );

    let bot = Arc::new(WebSocketBot::new(client.clone(), settings.temp_dir.clone()));
    let shutdown = CancellationToken::new();

    let handler = TelegramBotHandler::new(client, Arc::clone(&bot))
        .with_admin_ids(settings.admin_ids()?);
    let polling = {
        let token = shutdown.clone();
        tokio::spawn(async move { handler.start_polling(token).await })
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("{} 바인딩 실패", addr))?;
    info!(%addr, "WebSocket bot listening");

    axum::serve(listener, bot_router(bot))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = polling.await {
        error!("텔레그램 폴링 태스크 종료 실패: {}", e);
    }
    info!("WebSocket bot stopped");
    Ok(())
}
