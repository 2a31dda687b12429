//! 설정 관리.
//!
//! `.env` 파일과 프로세스 환경 변수에서 브리지 설정을 읽어옵니다.
//! 환경 변수 이름은 대문자 그대로 사용합니다 (`PORT`, `TELEGRAM_BOT_TOKEN` 등).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::{BridgeError, BridgeResult};

/// 기본 시크릿 키 (운영 환경에서는 반드시 변경).
pub const DEFAULT_SECRET_KEY: &str = "your-secret-key-here-change-in-production";

/// 브리지 설정.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 텔레그램 봇 토큰 (비어 있으면 텔레그램 연동 비활성)
    #[serde(deserialize_with = "deserialize_secret")]
    pub telegram_bot_token: SecretString,
    /// 관리자 그룹 채팅 ID
    pub telegram_group_id: String,
    /// 관리자 사용자 ID 목록 (쉼표 구분, 비어 있으면 그룹 멤버 전체)
    pub telegram_admin_ids: String,

    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    #[serde(deserialize_with = "deserialize_secret")]
    pub secret_key: SecretString,
    pub debug: bool,
    /// 런타임 워커 스레드 수
    pub workers: usize,

    /// 서버 ping 간격 (초)
    pub ws_ping_interval: u64,
    /// 수신이 없을 때 연결을 끊는 시간 (초)
    pub ws_ping_timeout: u64,
    /// 최대 프레임 크기 (바이트)
    pub ws_max_size: usize,
    /// 레거시 봇 포트
    pub ws_port: u16,

    /// 세션 타임아웃 (초)
    pub session_timeout: u64,
    /// 최대 동시 세션 수
    pub max_sessions: usize,
    /// 정리 주기 (초)
    pub cleanup_interval: u64,

    /// 업로드 최대 크기 (바이트)
    pub max_file_size: u64,
    /// 임시 파일 디렉토리
    pub temp_dir: PathBuf,
    /// 허용 확장자 (쉼표 구분)
    pub allowed_extensions: String,

    /// 허용 Origin (쉼표 구분)
    pub allowed_origins: String,
    pub enable_cors: bool,
    /// 분당 요청/메시지 한도
    pub rate_limit: u32,

    /// Redis 설정 (읽기만 하고 사용하지 않음)
    #[serde(default)]
    pub redis_url: Option<String>,
    pub redis_enabled: bool,

    /// 로그 레벨 (`INFO`, `WARNING` 등 대문자 이름 허용)
    pub log_level: String,
    /// 로그 형식 (pretty, json, compact)
    pub log_format: String,
    /// 로그 파일 경로
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    pub enable_metrics: bool,
    pub metrics_port: u16,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(SecretString::new(raw.into()))
}

/// (키, 기본값) 목록. 키는 config 크레이트가 소문자로 정규화한 이름입니다.
const DEFAULTS: &[(&str, &str)] = &[
    ("telegram_bot_token", ""),
    ("telegram_group_id", ""),
    ("telegram_admin_ids", ""),
    ("host", "0.0.0.0"),
    ("port", "8000"),
    ("secret_key", DEFAULT_SECRET_KEY),
    ("debug", "false"),
    ("workers", "2"),
    ("ws_ping_interval", "30"),
    ("ws_ping_timeout", "60"),
    ("ws_max_size", "10485760"),
    ("ws_port", "8765"),
    ("session_timeout", "86400"),
    ("max_sessions", "1000"),
    ("cleanup_interval", "300"),
    ("max_file_size", "52428800"),
    ("temp_dir", "./temp"),
    (
        "allowed_extensions",
        "jpg,jpeg,png,gif,mp3,mp4,ogg,pdf,doc,docx,txt",
    ),
    (
        "allowed_origins",
        "https://yourdomain.com,http://localhost:3000",
    ),
    ("enable_cors", "true"),
    ("rate_limit", "100"),
    ("redis_enabled", "false"),
    ("log_level", "INFO"),
    ("log_format", "pretty"),
    ("enable_metrics", "true"),
    ("metrics_port", "9090"),
];

impl Settings {
    /// `.env` 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load() -> BridgeResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), ".env 로드됨");
        }
        Self::build(config::Environment::default())
    }

    /// 주어진 키/값 맵에서 설정을 로드합니다 (프로세스 환경은 읽지 않음).
    ///
    /// 키는 환경 변수와 같은 대문자 이름을 사용합니다.
    pub fn from_map<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> BridgeResult<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::build(config::Environment::default().source(Some(map)))
    }

    fn build(env: config::Environment) -> BridgeResult<Self> {
        let mut builder = config::Config::builder();
        for (key, value) in DEFAULTS {
            builder = builder.set_default(*key, *value)?;
        }

        let settings: Settings = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        if settings.redis_enabled || settings.redis_url.is_some() {
            tracing::info!("Redis 설정이 지정되었지만 세션은 메모리에 저장됩니다");
        }

        Ok(settings)
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.port == 0 {
            return Err(BridgeError::Config("PORT는 0일 수 없습니다".to_string()));
        }
        if self.workers == 0 {
            return Err(BridgeError::Config("WORKERS는 1 이상이어야 합니다".to_string()));
        }
        if self.max_sessions == 0 {
            return Err(BridgeError::Config(
                "MAX_SESSIONS는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.telegram_enabled() {
            if self.telegram_group_id.trim().is_empty() {
                return Err(BridgeError::Config(
                    "TELEGRAM_BOT_TOKEN이 설정되면 TELEGRAM_GROUP_ID도 필요합니다".to_string(),
                ));
            }
            self.group_chat_id()?;
        }
        self.admin_ids()?;
        self.bind_ip()?;

        if self.secret_key.expose_secret() == DEFAULT_SECRET_KEY && !self.debug {
            tracing::warn!("SECRET_KEY가 기본값입니다. 운영 환경에서는 변경하세요");
        }

        Ok(())
    }

    /// 텔레그램 연동 활성화 여부.
    pub fn telegram_enabled(&self) -> bool {
        !self.telegram_bot_token.expose_secret().trim().is_empty()
    }

    /// 관리자 그룹 채팅 ID.
    pub fn group_chat_id(&self) -> BridgeResult<i64> {
        self.telegram_group_id.trim().parse().map_err(|_| {
            BridgeError::Config(format!(
                "TELEGRAM_GROUP_ID가 올바르지 않습니다: {}",
                self.telegram_group_id
            ))
        })
    }

    /// 관리자 사용자 ID 목록.
    pub fn admin_ids(&self) -> BridgeResult<Vec<i64>> {
        split_list(&self.telegram_admin_ids)
            .map(|id| {
                id.parse::<i64>().map_err(|_| {
                    BridgeError::Config(format!("TELEGRAM_ADMIN_IDS 값이 숫자가 아닙니다: {}", id))
                })
            })
            .collect()
    }

    /// 허용 Origin 목록.
    pub fn allowed_origins(&self) -> Vec<String> {
        split_list(&self.allowed_origins)
            .map(|o| o.trim_end_matches('/').to_string())
            .collect()
    }

    /// Origin 허용 여부.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins().iter().any(|o| o == "*" || o == origin)
    }

    /// 허용 확장자 목록 (소문자, 점 제외).
    pub fn allowed_extensions(&self) -> Vec<String> {
        split_list(&self.allowed_extensions)
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect()
    }

    fn bind_ip(&self) -> BridgeResult<IpAddr> {
        self.host
            .parse()
            .map_err(|_| BridgeError::Config(format!("HOST가 올바르지 않습니다: {}", self.host)))
    }

    /// API 서버 바인딩 주소.
    pub fn socket_addr(&self) -> BridgeResult<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.port))
    }

    /// 메트릭 익스포터 바인딩 주소.
    pub fn metrics_addr(&self) -> BridgeResult<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.metrics_port))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_ping_timeout.max(1))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_timeout)
    }

    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval.max(1))
    }

    /// 시크릿을 가린 설정 요약 (CLI 출력용).
    pub fn redacted(&self) -> serde_json::Value {
        let mask = |secret: &SecretString| {
            if secret.expose_secret().is_empty() {
                String::new()
            } else {
                "********".to_string()
            }
        };

        serde_json::json!({
            "TELEGRAM_BOT_TOKEN": mask(&self.telegram_bot_token),
            "TELEGRAM_GROUP_ID": self.telegram_group_id,
            "TELEGRAM_ADMIN_IDS": self.telegram_admin_ids,
            "HOST": self.host,
            "PORT": self.port,
            "SECRET_KEY": mask(&self.secret_key),
            "DEBUG": self.debug,
            "WORKERS": self.workers,
            "WS_PING_INTERVAL": self.ws_ping_interval,
            "WS_PING_TIMEOUT": self.ws_ping_timeout,
            "WS_MAX_SIZE": self.ws_max_size,
            "WS_PORT": self.ws_port,
            "SESSION_TIMEOUT": self.session_timeout,
            "MAX_SESSIONS": self.max_sessions,
            "CLEANUP_INTERVAL": self.cleanup_interval,
            "MAX_FILE_SIZE": self.max_file_size,
            "TEMP_DIR": self.temp_dir.display().to_string(),
            "ALLOWED_EXTENSIONS": self.allowed_extensions(),
            "ALLOWED_ORIGINS": self.allowed_origins(),
            "ENABLE_CORS": self.enable_cors,
            "RATE_LIMIT": self.rate_limit,
            "REDIS_ENABLED": self.redis_enabled,
            "LOG_LEVEL": self.log_level,
            "LOG_FORMAT": self.log_format,
            "LOG_FILE": self.log_file.as_ref().map(|p| p.display().to_string()),
            "ENABLE_METRICS": self.enable_metrics,
            "METRICS_PORT": self.metrics_port,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telegram_bot_token: SecretString::new(String::new().into()),
            telegram_group_id: String::new(),
            telegram_admin_ids: String::new(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            secret_key: SecretString::new(DEFAULT_SECRET_KEY.to_string().into()),
            debug: false,
            workers: 2,
            ws_ping_interval: 30,
            ws_ping_timeout: 60,
            ws_max_size: 10 * 1024 * 1024,
            ws_port: 8765,
            session_timeout: 86_400,
            max_sessions: 1000,
            cleanup_interval: 300,
            max_file_size: 50 * 1024 * 1024,
            temp_dir: PathBuf::from("./temp"),
            allowed_extensions: "jpg,jpeg,png,gif,mp3,mp4,ogg,pdf,doc,docx,txt".to_string(),
            allowed_origins: "https://yourdomain.com,http://localhost:3000".to_string(),
            enable_cors: true,
            rate_limit: 100,
            redis_url: None,
            redis_enabled: false,
            log_level: "INFO".to_string(),
            log_format: "pretty".to_string(),
            log_file: None,
            enable_metrics: true,
            metrics_port: 9090,
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    #[test]
    fn test_defaults_match_loader() {
        let loaded = Settings::from_map(empty()).unwrap();
        let default = Settings::default();

        assert_eq!(loaded.port, default.port);
        assert_eq!(loaded.host, default.host);
        assert_eq!(loaded.workers, 2);
        assert_eq!(loaded.ws_max_size, 10_485_760);
        assert_eq!(loaded.max_file_size, 52_428_800);
        assert_eq!(loaded.session_timeout, 86_400);
        assert_eq!(loaded.temp_dir, PathBuf::from("./temp"));
        assert_eq!(loaded.log_level, "INFO");
        assert!(loaded.enable_cors);
        assert!(!loaded.telegram_enabled());
        assert_eq!(loaded.allowed_extensions(), default.allowed_extensions());
    }

    #[test]
    fn test_overrides_from_upper_case_keys() {
        let settings = Settings::from_map([
            ("PORT", "9000"),
            ("DEBUG", "true"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_GROUP_ID", "-100123"),
            ("TELEGRAM_ADMIN_IDS", "1, 2"),
            ("ALLOWED_ORIGINS", "https://a.example/, http://b.example"),
        ])
        .unwrap();

        assert_eq!(settings.port, 9000);
        assert!(settings.debug);
        assert!(settings.telegram_enabled());
        assert_eq!(settings.group_chat_id().unwrap(), -100123);
        assert_eq!(settings.admin_ids().unwrap(), vec![1, 2]);
        assert!(settings.is_origin_allowed("https://a.example"));
        assert!(!settings.is_origin_allowed("https://evil.example"));
        settings.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let no_group = Settings::from_map([("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
        assert!(no_group.validate().is_err());

        let bad_admins = Settings::from_map([("TELEGRAM_ADMIN_IDS", "12,abc")]).unwrap();
        assert!(bad_admins.admin_ids().is_err());
        assert!(bad_admins.validate().is_err());

        let zero_workers = Settings::from_map([("WORKERS", "0")]).unwrap();
        assert!(zero_workers.validate().is_err());

        let zero_port = Settings::from_map([("PORT", "0")]).unwrap();
        assert!(zero_port.validate().is_err());
    }

    #[test]
    fn test_extensions_normalized() {
        let settings = Settings::from_map([("ALLOWED_EXTENSIONS", " JPG, .Png ,,txt")]).unwrap();
        assert_eq!(settings.allowed_extensions(), vec!["jpg", "png", "txt"]);
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let settings = Settings::from_map([("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
        let json = settings.redacted();
        assert_eq!(json["TELEGRAM_BOT_TOKEN"], "********");
        assert!(!json.to_string().contains("123:abc"));
        assert!(!format!("{:?}", settings).contains("123:abc"));
    }
}
