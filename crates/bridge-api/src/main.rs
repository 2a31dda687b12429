//! 방문자 채팅 브리지 API 서버.
//!
//! REST, WebSocket, 텔레그램 long polling을 한 프로세스에서 실행합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    http::{header, Method, StatusCode},
    middleware, Router,
};
use bridge_core::constants::{close_code, TEMP_FILE_MAX_AGE_SECS};
use bridge_core::{init_logging, LogConfig, Settings};
use bridge_telegram::TelegramBotHandler;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use bridge_api::metrics::{metrics_router, setup_metrics_recorder};
use bridge_api::middleware::{
    metrics_layer, rate_limit_middleware, RateLimitConfig, RateLimitState,
};
use bridge_api::openapi::swagger_ui_router;
use bridge_api::routes::create_api_router;
use bridge_api::services::AdminRouter;
use bridge_api::shutdown::shutdown_signal;
use bridge_api::state::AppState;

/// HTTP rate limit 배수 (`RATE_LIMIT`는 방문자 메시지 기준).
const HTTP_RATE_MULTIPLIER: u32 = 10;

fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("설정 로드 실패")?;
    settings.validate().context("설정 검증 실패")?;

    let _log_guard = init_logging(LogConfig::from_settings(&settings))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.workers)
        .enable_all()
        .build()
        .context("tokio 런타임 생성 실패")?;

    runtime.block_on(run(Arc::new(settings)))
}

async fn run(settings: Arc<Settings>) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = settings.workers,
        "Starting Telegram WebSocket Bridge..."
    );

    let addr = settings.socket_addr()?;
    let state = AppState::from_settings(Arc::clone(&settings))?;
    if let Err(e) = state.files.ensure_dir().await {
        warn!(dir = %state.files.temp_dir().display(), "임시 디렉토리 생성 실패: {}", e);
    }

    let shutdown_token = CancellationToken::new();

    // 텔레그램 long polling
    let bot_task = match state.telegram.clone() {
        Some(client) => {
            let handler = TelegramBotHandler::new(
                client.clone(),
                Arc::new(AdminRouter::new(state.clone(), client)),
            )
            .with_admin_ids(settings.admin_ids()?)
            .with_running_flag(Arc::clone(&state.bot_running));

            let token = shutdown_token.clone();
            Some(tokio::spawn(async move {
                handler.start_polling(token).await;
            }))
        }
        None => {
            warn!("TELEGRAM_BOT_TOKEN이 설정되지 않아 텔레그램 연동이 비활성화됩니다");
            None
        }
    };

    // 백그라운드 정리 작업
    tokio::spawn(
        Arc::clone(&state.sessions).run_cleanup(settings.cleanup_period(), shutdown_token.clone()),
    );
    tokio::spawn(Arc::clone(&state.files).run_cleanup(
        settings.cleanup_period(),
        Duration::from_secs(TEMP_FILE_MAX_AGE_SECS),
        shutdown_token.clone(),
    ));
    state.message_limiter.spawn_cleanup(shutdown_token.clone());

    let http_limits = RateLimitState::new(RateLimitConfig::new(
        settings.rate_limit.saturating_mul(HTTP_RATE_MULTIPLIER),
    ));
    http_limits.limiter().spawn_cleanup(shutdown_token.clone());

    // 메트릭
    let metrics_handle = if settings.enable_metrics {
        match setup_metrics_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus 레코더 설치 실패: {}", e);
                None
            }
        }
    } else {
        None
    };

    let merged_metrics = match metrics_handle {
        Some(handle) if settings.metrics_port == settings.port => Some(handle),
        Some(handle) => {
            spawn_metrics_server(&settings, handle, shutdown_token.clone()).await;
            None
        }
        None => None,
    };

    // 종료 시 방문자 소켓을 먼저 닫음
    {
        let connections = Arc::clone(&state.connections);
        let token = shutdown_token.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            let closed = connections
                .close_all(close_code::WS_GOING_AWAY, "Server shutting down")
                .await;
            info!(closed, "WebSocket 연결 종료");
        });
    }

    let app = create_router(state.clone(), &settings, http_limits, merged_metrics);

    info!(%addr, "API server listening");
    info!("Swagger UI available at http://{}/swagger-ui", addr);
    info!("WebSocket available at ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("{} 바인딩 실패", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
    .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    let cleanup = tokio::time::timeout(Duration::from_secs(10), async {
        if let Some(task) = bot_task {
            if let Err(e) = task.await {
                error!("텔레그램 폴링 태스크 종료 실패: {}", e);
            }
        }
        state.sessions.clear().await;
    })
    .await;

    if cleanup.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// `METRICS_PORT`에서 `/metrics`만 서빙합니다.
async fn spawn_metrics_server(
    settings: &Settings,
    handle: PrometheusHandle,
    shutdown: CancellationToken,
) {
    let addr = match settings.metrics_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("메트릭 주소 설정 오류: {}", e);
            return;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(%addr, "메트릭 포트 바인딩 실패: {}", e);
            return;
        }
    };

    info!(%addr, "Metrics available at http://{}/metrics", addr);
    tokio::spawn(async move {
        let result = axum::serve(listener, metrics_router(handle))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!("메트릭 서버 오류: {}", e);
        }
    });
}

/// CORS 레이어 생성.
///
/// `ALLOWED_ORIGINS`에 `*`가 있으면 모든 origin을 허용하고 자격 증명은 허용하지 않습니다.
fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings.allowed_origins();

    let (allow_origin, credentials) = if origins.iter().any(|o| o == "*") {
        (AllowOrigin::any(), false)
    } else {
        let list: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        if list.is_empty() {
            warn!("ALLOWED_ORIGINS에 유효한 origin이 없어 모든 origin을 허용합니다");
            (AllowOrigin::any(), false)
        } else {
            info!("CORS configured with {} allowed origins", list.len());
            (AllowOrigin::list(list), true)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(credentials)
        .max_age(Duration::from_secs(3600))
}

/// 전체 라우터 생성.
fn create_router(
    state: AppState,
    settings: &Settings,
    http_limits: RateLimitState,
    metrics_handle: Option<PrometheusHandle>,
) -> Router {
    let api_router = create_api_router(&state)
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            http_limits,
            rate_limit_middleware,
        ));

    let mut router = Router::new().merge(api_router).merge(swagger_ui_router());

    if let Some(handle) = metrics_handle {
        router = router.merge(metrics_router(handle));
    }

    let router = router
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ));

    if settings.enable_cors {
        router.layer(cors_layer(settings))
    } else {
        router
    }
}
