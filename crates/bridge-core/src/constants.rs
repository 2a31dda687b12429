//! 애플리케이션 상수.
//!
//! WebSocket 종료 코드, 파일 크기 한도, MIME 매핑, 방문자 응답 문구.

/// WebSocket 종료 코드 및 애플리케이션 에러 코드.
pub mod close_code {
    pub const WS_NORMAL_CLOSE: u16 = 1000;
    pub const WS_GOING_AWAY: u16 = 1001;
    pub const WS_PROTOCOL_ERROR: u16 = 1002;
    pub const WS_UNSUPPORTED_DATA: u16 = 1003;
    pub const WS_NO_STATUS_RECEIVED: u16 = 1005;
    pub const WS_ABNORMAL_CLOSURE: u16 = 1006;
    pub const WS_INVALID_PAYLOAD: u16 = 1007;
    pub const WS_POLICY_VIOLATION: u16 = 1008;
    pub const WS_MESSAGE_TOO_BIG: u16 = 1009;
    pub const WS_INTERNAL_ERROR: u16 = 1011;
    pub const WS_SERVICE_RESTART: u16 = 1012;
    pub const WS_TRY_AGAIN_LATER: u16 = 1013;

    pub const SESSION_EXPIRED: u16 = 4001;
    pub const RATE_LIMITED: u16 = 4002;
    pub const INVALID_MESSAGE: u16 = 4003;
    pub const FILE_TOO_LARGE: u16 = 4004;
    pub const INVALID_FILE_TYPE: u16 = 4005;
    pub const UNAUTHORIZED: u16 = 4006;
}

const MIB: u64 = 1024 * 1024;

/// 이미지 최대 크기 (10MB)
pub const IMAGE_SIZE_LIMIT: u64 = 10 * MIB;
/// 음성 최대 크기 (20MB)
pub const VOICE_SIZE_LIMIT: u64 = 20 * MIB;
/// 동영상 최대 크기 (50MB)
pub const VIDEO_SIZE_LIMIT: u64 = 50 * MIB;
/// 문서 최대 크기 (50MB)
pub const DOCUMENT_SIZE_LIMIT: u64 = 50 * MIB;

/// 파일 종류별 크기 한도.
///
/// 알 수 없는 종류는 문서 한도를 따릅니다.
pub fn file_size_limit(kind: &str) -> u64 {
    match kind {
        "image" => IMAGE_SIZE_LIMIT,
        "voice" | "audio" => VOICE_SIZE_LIMIT,
        "video" => VIDEO_SIZE_LIMIT,
        _ => DOCUMENT_SIZE_LIMIT,
    }
}

/// MIME 타입 → 확장자 매핑.
pub const MIME_TYPE_MAP: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("audio/ogg", ".ogg"),
    ("audio/mpeg", ".mp3"),
    ("video/mp4", ".mp4"),
    ("application/pdf", ".pdf"),
    ("application/msword", ".doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    ("text/plain", ".txt"),
];

/// MIME 타입에 해당하는 확장자.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    MIME_TYPE_MAP
        .iter()
        .find(|(m, _)| m.eq_ignore_ascii_case(mime))
        .map(|(_, ext)| *ext)
}

/// 임시 파일 보관 기간 (초)
pub const TEMP_FILE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// 방문자 응답 문구.
pub mod responses {
    pub const CONNECTED: &str = "Connected to chat server";
    pub const RATE_LIMITED: &str = "⚠️ You're sending messages too fast. Please wait a moment.";
    pub const RECONNECTED: &str = "✅ Reconnected successfully.";
    pub const ADMIN_OFFLINE: &str =
        "⏳ Admin is currently offline. Please try again later.";
    pub const INVALID_FORMAT: &str = "Invalid message format";
    pub const UPLOAD_OK: &str = "File uploaded successfully";
    pub const UPLOAD_FAILED: &str = "Failed to upload file";

    /// 파일 크기 초과 안내.
    pub fn file_too_large(limit_bytes: u64) -> String {
        format!(
            "⚠️ File is too large. Maximum size is {}.",
            super::human_size(limit_bytes)
        )
    }
}

/// 바이트 수를 사람이 읽기 쉬운 단위로 변환합니다.
pub fn human_size(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{}MB", bytes / MIB)
    } else if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}B", bytes)
    }
}
