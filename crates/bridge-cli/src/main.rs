//! 브리지 운영 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 컨테이너 HEALTHCHECK (PORT 환경 변수, 기본 8000)
//! bridge healthcheck
//!
//! # 다른 호스트/포트 점검
//! bridge healthcheck --host 10.0.0.5 --port 9000 --timeout-secs 1
//!
//! # 시크릿을 가린 설정 출력
//! bridge config
//!
//! # 관리자 그룹에 테스트 메시지 전송
//! bridge send-test --text "hello"
//! ```

use std::process::ExitCode;
use std::time::Duration;

use bridge_cli::commands::config::render_config;
use bridge_cli::commands::healthcheck::{check_port, HealthcheckConfig};
use bridge_cli::commands::send_test::{client_from_settings, default_text, send_test};
use bridge_core::Settings;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bridge")]
#[command(about = "Telegram WebSocket bridge CLI - 운영 점검 도구", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 서버 포트에 TCP 연결을 시도 (성공 0, 실패 1)
    Healthcheck {
        /// 점검 호스트
        #[arg(long, default_value = "localhost")]
        host: String,

        /// 점검 포트
        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,

        /// 연결 제한 시간 (초)
        #[arg(long, default_value_t = 3)]
        timeout_secs: u64,
    },

    /// 설정을 검증하고 시크릿을 가려 출력
    Config,

    /// 관리자 그룹에 테스트 메시지 전송
    SendTest {
        /// 메시지 본문 (기본: 시각이 포함된 테스트 문구)
        #[arg(short, long)]
        text: Option<String>,
    },
}

async fn run_send_test(text: Option<String>) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let client = client_from_settings(&settings)?;
    let text = text.unwrap_or_else(default_text);

    let message_id = send_test(&client, &text).await?;
    println!("테스트 메시지 전송 완료 (message_id={})", message_id);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // 표준 출력은 명령 결과 전용
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Healthcheck {
            host,
            port,
            timeout_secs,
        } => {
            let config = HealthcheckConfig {
                host,
                port,
                timeout: Duration::from_secs(timeout_secs),
            };
            check_port(&config).await
        }

        Commands::Config => Settings::load()
            .map_err(anyhow::Error::from)
            .and_then(|settings| render_config(&settings))
            .map(|rendered| println!("{}", rendered)),

        Commands::SendTest { text } => run_send_test(text).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
