//! tracing을 사용한 로깅 인프라.
//!
//! 이 모듈은 다양한 출력 형식을 지원하는 구조화된 로깅을 제공합니다:
//! - **pretty**: 개발용 사람이 읽기 쉬운 형식
//! - **json**: 운영환경/로그 집계용 JSON 형식
//! - **compact**: 로그 크기를 줄이기 위한 간결한 형식
//!
//! `LOG_FILE`이 지정되면 콘솔과 함께 파일에도 기록합니다.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Settings;

/// 디버그 모드에서 상세 로그를 남길 크레이트.
const BRIDGE_CRATES: &[&str] = &["bridge_core", "bridge_telegram", "bridge_api", "bridge_cli"];

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 색상이 포함된 사람이 읽기 쉬운 형식 (개발용)
    #[default]
    Pretty,
    /// 로그 집계용 JSON 형식 (운영용)
    Json,
    /// 간결한 한 줄 형식
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 로그 레벨 필터 (예: "info", "debug", "bridge_api=debug")
    pub level: String,
    /// 출력 형식
    pub format: LogFormat,
    /// 로그 파일 경로
    pub file: Option<PathBuf>,
    /// 파일명과 줄 번호 포함 여부
    pub with_file: bool,
    /// 대상(모듈 경로) 포함 여부
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// 새 로그 설정을 생성합니다.
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: normalize_level(&level.into()),
            ..Default::default()
        }
    }

    /// 로그 형식을 설정합니다.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// 브리지 설정에서 로그 설정을 만듭니다.
    ///
    /// `DEBUG=true`이면 브리지 크레이트는 최소 `debug` 레벨로 기록합니다.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut level = normalize_level(&settings.log_level);
        if settings.debug {
            for krate in BRIDGE_CRATES {
                level.push_str(&format!(",{}=debug", krate));
            }
        }

        Self {
            level,
            format: settings.log_format.parse().unwrap_or_default(),
            file: settings.log_file.clone(),
            with_file: settings.debug,
            ..Default::default()
        }
    }
}

/// 로그 레벨 이름을 tracing 필터 문법으로 변환합니다.
///
/// `WARNING` → `warn`, `CRITICAL`/`FATAL` → `error`, 나머지는 소문자로.
pub fn normalize_level(level: &str) -> String {
    match level.trim().to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "" => "info".to_string(),
        other => other.to_string(),
    }
}

/// 주어진 설정으로 로깅 시스템을 초기화합니다.
///
/// 파일 로깅을 사용하면 반환된 guard가 살아 있는 동안만 버퍼가 비워지므로
/// 호출자는 프로세스 종료 시까지 보관해야 합니다.
///
/// # 예제
///
/// ```no_run
/// use bridge_core::logging::{init_logging, LogConfig, LogFormat};
///
/// let config = LogConfig::new("debug").with_format(LogFormat::Json);
/// let _guard = init_logging(config).unwrap();
/// ```
pub fn init_logging(
    config: LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let console = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .boxed(),
    };

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .ok_or_else(|| format!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(&dir)?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.with_target)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        format = ?config.format,
        level = %config.level,
        file = ?config.file,
        "Logging initialized"
    );

    Ok(guard)
}

/// 세션 컨텍스트 필드가 포함된 span을 생성하는 매크로.
#[macro_export]
macro_rules! session_span {
    ($name:expr, $session:expr) => {
        tracing::info_span!($name, session_id = %$session)
    };
    ($name:expr, $session:expr, $kind:expr) => {
        tracing::info_span!($name, session_id = %$session, kind = %$kind)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("COMPACT".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("invalid".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("INFO"), "info");
        assert_eq!(normalize_level("WARNING"), "warn");
        assert_eq!(normalize_level("CRITICAL"), "error");
        assert_eq!(normalize_level("bridge_api=trace"), "bridge_api=trace");
    }

    #[test]
    fn test_from_settings_debug_adds_crate_directives() {
        let settings =
            Settings::from_map([("DEBUG", "true"), ("LOG_FORMAT", "json"), ("LOG_LEVEL", "WARNING")])
                .unwrap();
        let config = LogConfig::from_settings(&settings);

        assert!(config.level.starts_with("warn"));
        assert!(config.level.contains("bridge_api=debug"));
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.with_file);
    }
}
