//! 브리지 에러 타입.
//!
//! 방문자 연결, 세션, 파일, 텔레그램 연동 전반에서 사용하는 에러를 정의합니다.

use thiserror::Error;

use crate::constants::close_code;

/// 핵심 브리지 에러.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 세션 에러 (만료, 미존재 등)
    #[error("세션 에러: {0}")]
    Session(String),

    /// 파일 처리 에러
    #[error("파일 에러: {0}")]
    File(String),

    /// 파일 크기 초과
    #[error("파일 크기 초과: {size} bytes (최대 {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// 허용되지 않은 파일 형식
    #[error("허용되지 않은 파일 형식: {0}")]
    InvalidFileType(String),

    /// 텔레그램 연동 에러
    #[error("텔레그램 에러: {0}")]
    Telegram(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과: {0}초 후 재시도")]
    RateLimited(u64),

    /// 잘못된 메시지
    #[error("잘못된 메시지: {0}")]
    InvalidMessage(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 브리지 작업을 위한 Result 타입.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Telegram(_) | BridgeError::RateLimited(_))
    }

    /// 방문자에게 전달할 애플리케이션 종료/에러 코드.
    pub fn close_code(&self) -> u16 {
        match self {
            BridgeError::Session(_) => close_code::SESSION_EXPIRED,
            BridgeError::RateLimited(_) => close_code::RATE_LIMITED,
            BridgeError::InvalidMessage(_) | BridgeError::Serialization(_) => {
                close_code::INVALID_MESSAGE
            }
            BridgeError::FileTooLarge { .. } => close_code::FILE_TOO_LARGE,
            BridgeError::InvalidFileType(_) => close_code::INVALID_FILE_TYPE,
            _ => close_code::WS_INTERNAL_ERROR,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::Config(err.to_string())
    }
}
