//! API 에러 응답 타입.
//!
//! 모든 REST 엔드포인트에서 같은 형식의 에러 본문을 반환합니다.

use axum::http::StatusCode;
use axum::Json;
use bridge_core::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// API 에러 응답.
///
/// # 예시
///
/// ```json
/// {
///   "code": "SESSION_NOT_FOUND",
///   "message": "Session not found or expired",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "SESSION_NOT_FOUND", "FILE_TOO_LARGE")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 시각 (Unix timestamp)
    pub timestamp: i64,
}

impl ApiErrorResponse {
    /// 현재 시각을 담은 에러 생성.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// 상세 정보를 포함한 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// 상태 코드와 에러 본문을 한 번에 만듭니다.
pub fn api_error(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiErrorResponse>) {
    (status, Json(ApiErrorResponse::new(code, message)))
}

impl From<BridgeError> for ApiErrorResponse {
    fn from(err: BridgeError) -> Self {
        let code = match &err {
            BridgeError::Config(_) => "CONFIG_ERROR",
            BridgeError::Session(_) => "SESSION_ERROR",
            BridgeError::File(_) => "FILE_ERROR",
            BridgeError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            BridgeError::InvalidFileType(_) => "INVALID_FILE_TYPE",
            BridgeError::Telegram(_) => "TELEGRAM_ERROR",
            BridgeError::RateLimited(_) => "RATE_LIMITED",
            BridgeError::InvalidMessage(_) => "INVALID_MESSAGE",
            BridgeError::NotFound(_) => "NOT_FOUND",
            BridgeError::Io(_) => "IO_ERROR",
            BridgeError::Serialization(_) => "SERIALIZATION_ERROR",
            BridgeError::Internal(_) => "INTERNAL_ERROR",
        };
        ApiErrorResponse::new(code, err.to_string())
    }
}

/// 브리지 에러를 HTTP 상태 코드와 함께 변환합니다.
pub fn bridge_error_response(err: BridgeError) -> (StatusCode, Json<ApiErrorResponse>) {
    let status = match &err {
        BridgeError::Session(_) | BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        BridgeError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        BridgeError::InvalidFileType(_)
        | BridgeError::InvalidMessage(_)
        | BridgeError::Serialization(_) => StatusCode::BAD_REQUEST,
        BridgeError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        BridgeError::Telegram(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err.into()))
}
