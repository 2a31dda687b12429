//! 업로드/다운로드 파일 처리.
//!
//! 방문자가 보낸 바이너리 프레임과 관리자가 보낸 미디어를 `TEMP_DIR`에 저장하고,
//! 매직 넘버로 파일 종류를 판별합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bridge_core::constants::{extension_for_mime, file_size_limit};
use bridge_core::{BridgeError, BridgeResult, MessageType, Settings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

/// 정리 실패 후 재시도 대기 시간.
const CLEANUP_RETRY_DELAY: Duration = Duration::from_secs(60);

/// `/files/{name}`로 노출되는 URL 접두사.
pub const FILES_URL_PREFIX: &str = "/files";

/// 파일 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Audio,
    Video,
    Document,
    File,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Document => "document",
            FileKind::File => "file",
        }
    }

    /// 임시 저장 시 사용하는 확장자.
    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Image => ".jpg",
            FileKind::Audio => ".ogg",
            FileKind::Video => ".mp4",
            FileKind::Document => ".pdf",
            FileKind::File => ".bin",
        }
    }

    /// 방문자 메시지 타입으로 변환.
    pub fn message_type(&self) -> MessageType {
        match self {
            FileKind::Image => MessageType::Image,
            FileKind::Audio => MessageType::Voice,
            _ => MessageType::File,
        }
    }

    /// 종류별 크기 한도.
    pub fn size_limit(&self) -> u64 {
        file_size_limit(self.as_str())
    }

    /// MIME 타입에서 종류를 결정합니다.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            FileKind::Image
        } else if mime.starts_with("audio/") {
            FileKind::Audio
        } else if mime.starts_with("video/") {
            FileKind::Video
        } else if matches!(
            mime.as_str(),
            "application/pdf"
                | "application/msword"
                | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        ) {
            FileKind::Document
        } else {
            FileKind::File
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 저장된 파일 정보.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileInfo {
    #[schema(value_type = String)]
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// 소문자 확장자 (`.jpg`)
    pub extension: String,
}

/// 바이트 앞부분의 매직 넘버로 MIME 타입을 판별합니다.
pub fn detect_mime(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(2048)];

    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        "image/gif"
    } else if head.starts_with(b"RIFF") && head.get(8..12) == Some(b"WEBP".as_slice()) {
        "image/webp"
    } else if head.starts_with(b"RIFF") && head.get(8..12) == Some(b"WAVE".as_slice()) {
        "audio/wav"
    } else if head.starts_with(b"OggS") {
        "audio/ogg"
    } else if head.starts_with(b"ID3") || is_mpeg_frame(head) {
        "audio/mpeg"
    } else if head.get(4..8) == Some(b"ftyp".as_slice()) {
        match head.get(8..11) {
            Some(b"M4A") => "audio/mp4",
            _ => "video/mp4",
        }
    } else if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        "video/webm"
    } else if head.starts_with(b"%PDF") {
        "application/pdf"
    } else if head.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        "application/msword"
    } else if head.starts_with(b"PK\x03\x04") {
        if contains(head, b"word/") {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        } else {
            "application/zip"
        }
    } else {
        "application/octet-stream"
    }
}

/// 바이트 내용으로 파일 종류를 판별합니다.
pub fn detect_kind(data: &[u8]) -> FileKind {
    FileKind::from_mime(detect_mime(data))
}

fn is_mpeg_frame(head: &[u8]) -> bool {
    matches!(head, [0xFF, second, ..] if second & 0xE0 == 0xE0)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// 세션 ID를 파일 이름에 쓸 수 있도록 `[A-Za-z0-9_-]`만 남깁니다.
pub fn sanitize_session_id(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(64)
        .collect();

    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

/// 사용자가 보낸 파일 이름에서 경로를 제거하고 안전한 문자만 남깁니다.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

/// 파일 이름의 소문자 확장자 (점 제외).
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// 파일 핸들러.
#[derive(Debug, Clone)]
pub struct FileHandler {
    temp_dir: PathBuf,
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl FileHandler {
    /// 새 파일 핸들러 생성.
    pub fn new(
        temp_dir: impl Into<PathBuf>,
        max_file_size: u64,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            max_file_size,
            allowed_extensions,
        }
    }

    /// 설정에서 생성.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.temp_dir.clone(),
            settings.max_file_size,
            settings.allowed_extensions(),
        )
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// 임시 디렉토리 생성.
    pub async fn ensure_dir(&self) -> BridgeResult<()> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        Ok(())
    }

    /// 방문자 파일을 `{session}_{YYYYmmdd_HHMMSS}_{8 hex}{ext}` 이름으로 저장합니다.
    ///
    /// 확장자는 판별된 MIME 타입을 따르고, 매핑이 없으면 종류별 기본값을 씁니다.
    pub async fn save_temp_file(
        &self,
        data: &[u8],
        session_id: &str,
        kind: FileKind,
    ) -> BridgeResult<PathBuf> {
        let extension = extension_for_mime(detect_mime(data)).unwrap_or(kind.extension());
        let file_name = format!(
            "{}_{}_{}{}",
            sanitize_session_id(session_id),
            Utc::now().format("%Y%m%d_%H%M%S"),
            short_hex(),
            extension
        );
        self.write(&file_name, data).await
    }

    /// 관리자 미디어를 원래 이름을 살려 저장합니다.
    pub async fn save_named(&self, data: &[u8], name: &str) -> BridgeResult<PathBuf> {
        let file_name = format!(
            "{}_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            short_hex(),
            sanitize_file_name(name)
        );
        self.write(&file_name, data).await
    }

    async fn write(&self, file_name: &str, data: &[u8]) -> BridgeResult<PathBuf> {
        self.ensure_dir().await?;
        let path = self.temp_dir.join(file_name);
        tokio::fs::write(&path, data).await?;

        info!(path = %path.display(), size = data.len(), "임시 파일 저장");
        Ok(path)
    }

    /// 업로드 파일 이름과 크기를 검증하고 종류를 반환합니다.
    pub fn validate_upload(&self, name: &str, size: u64) -> BridgeResult<FileKind> {
        let extension = extension_of(name)
            .ok_or_else(|| BridgeError::InvalidFileType(format!("확장자 없음: {}", name)))?;

        if !self.allowed_extensions.iter().any(|e| e == &extension) {
            return Err(BridgeError::InvalidFileType(extension));
        }

        let mime = mime_guess::from_ext(&extension).first_or_octet_stream();
        let kind = FileKind::from_mime(mime.essence_str());
        self.check_size(kind, size)?;

        Ok(kind)
    }

    /// 전체 한도와 종류별 한도를 모두 확인합니다.
    pub fn check_size(&self, kind: FileKind, size: u64) -> BridgeResult<()> {
        let limit = self.max_file_size.min(kind.size_limit());
        if size > limit {
            return Err(BridgeError::FileTooLarge { size, limit });
        }
        Ok(())
    }

    /// 파일 정보 조회.
    pub async fn file_info(&self, path: &Path) -> Option<FileInfo> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return None,
            Err(e) => {
                debug!(path = %path.display(), "파일 정보 조회 실패: {}", e);
                return None;
            }
        };

        Some(FileInfo {
            path: path.to_path_buf(),
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_ascii_lowercase()))
                .unwrap_or_default(),
        })
    }

    /// 파일 읽기.
    pub async fn read_file(&self, path: &Path) -> BridgeResult<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    /// 파일 삭제. 파일이 없으면 `false`.
    pub async fn delete_file(&self, path: &Path) -> BridgeResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(path = %path.display(), "파일 삭제");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 저장된 파일의 공개 URL (`/files/{name}`).
    pub fn file_url(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        format!("{}/{}", FILES_URL_PREFIX, name)
    }

    /// 수정 시각이 `max_age`보다 오래된 파일을 삭제하고 삭제 수를 반환합니다.
    pub async fn cleanup_old_files(&self, max_age: Duration) -> BridgeResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.temp_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else {
                continue;
            };
            if modified < cutoff {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => {
                        removed += 1;
                        debug!(file = ?entry.file_name(), "오래된 파일 삭제");
                    }
                    Err(e) => error!(path = %entry.path().display(), "파일 삭제 실패: {}", e),
                }
            }
        }

        if removed > 0 {
            info!(removed, "임시 파일 정리");
        }
        Ok(removed)
    }

    /// 주기적으로 오래된 파일을 정리합니다.
    pub async fn run_cleanup(
        self: Arc<Self>,
        period: Duration,
        max_age: Duration,
        shutdown: CancellationToken,
    ) {
        loop {
            let delay = match self.cleanup_old_files(max_age).await {
                Ok(_) => period,
                Err(e) => {
                    warn!("임시 파일 정리 실패: {}", e);
                    CLEANUP_RETRY_DELAY
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(dir: &Path) -> FileHandler {
        FileHandler::new(
            dir,
            50 * 1024 * 1024,
            ["jpg", "png", "ogg", "pdf", "txt", "docx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn test_detect_kind_magic_numbers() {
        assert_eq!(detect_kind(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), FileKind::Image);
        assert_eq!(detect_kind(b"\x89PNG\r\n\x1a\n...."), FileKind::Image);
        assert_eq!(detect_kind(b"GIF89a..."), FileKind::Image);
        assert_eq!(detect_kind(b"RIFF\0\0\0\0WEBPVP8 "), FileKind::Image);
        assert_eq!(detect_kind(b"OggS\0\x02"), FileKind::Audio);
        assert_eq!(detect_kind(b"ID3\x03\0"), FileKind::Audio);
        assert_eq!(detect_kind(&[0xFF, 0xFB, 0x90, 0x00]), FileKind::Audio);
        assert_eq!(detect_kind(b"RIFF\0\0\0\0WAVEfmt "), FileKind::Audio);
        assert_eq!(detect_kind(b"\0\0\0\x20ftypisom"), FileKind::Video);
        assert_eq!(detect_kind(b"\0\0\0\x20ftypM4A "), FileKind::Audio);
        assert_eq!(detect_kind(&[0x1A, 0x45, 0xDF, 0xA3, 1]), FileKind::Video);
        assert_eq!(detect_kind(b"%PDF-1.7"), FileKind::Document);
        assert_eq!(
            detect_kind(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]),
            FileKind::Document
        );
        assert_eq!(detect_kind(b"PK\x03\x04....word/document.xml"), FileKind::Document);
        assert_eq!(detect_kind(b"PK\x03\x04....other"), FileKind::File);
        assert_eq!(detect_kind(b"hello world"), FileKind::File);
        assert_eq!(detect_kind(b""), FileKind::File);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(FileKind::Audio.message_type(), MessageType::Voice);
        assert_eq!(FileKind::Image.message_type(), MessageType::Image);
        assert_eq!(FileKind::Document.message_type(), MessageType::File);
        assert_eq!(FileKind::Audio.extension(), ".ogg");
        assert_eq!(FileKind::File.extension(), ".bin");
        assert_eq!(FileKind::Image.size_limit(), 10 * 1024 * 1024);
        assert_eq!(FileKind::Audio.size_limit(), 20 * 1024 * 1024);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_session_id("abc-123_x"), "abc-123_x");
        assert_eq!(sanitize_session_id("../../etc"), "etc");
        assert_eq!(sanitize_session_id("///"), "anonymous");

        assert_eq!(sanitize_file_name("../secret/report 1.pdf"), "report_1.pdf");
        assert_eq!(sanitize_file_name("C:\\docs\\a.txt"), "a.txt");
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
    }

    #[test]
    fn test_validate_upload() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        assert_eq!(handler.validate_upload("photo.JPG", 1024).unwrap(), FileKind::Image);
        assert_eq!(handler.validate_upload("notes.pdf", 1024).unwrap(), FileKind::Document);

        assert!(matches!(
            handler.validate_upload("virus.exe", 10),
            Err(BridgeError::InvalidFileType(_))
        ));
        assert!(matches!(
            handler.validate_upload("noext", 10),
            Err(BridgeError::InvalidFileType(_))
        ));
        // 이미지는 10MB 한도
        assert!(matches!(
            handler.validate_upload("big.png", 11 * 1024 * 1024),
            Err(BridgeError::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_temp_file_naming() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        let path = handler
            .save_temp_file(b"OggS", "sess/../1", FileKind::Audio)
            .await
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("sess1_"));
        assert!(name.ends_with(".ogg"));
        // sess1 _ YYYYmmdd _ HHMMSS _ 8hex .ogg
        assert_eq!(name.split('_').count(), 4);
        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(handler.read_file(&path).await.unwrap(), b"OggS");
        assert!(handler.file_url(&path).starts_with("/files/sess1_"));
    }

    #[tokio::test]
    async fn test_save_temp_file_uses_detected_extension() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        let png = handler
            .save_temp_file(b"\x89PNG\r\n\x1a\n", "s", FileKind::Image)
            .await
            .unwrap();
        assert_eq!(png.extension().unwrap(), "png");

        // 매핑 없는 MIME은 종류별 기본 확장자
        let webp = handler
            .save_temp_file(b"RIFF\0\0\0\0WEBPVP8 ", "s", FileKind::Image)
            .await
            .unwrap();
        assert_eq!(webp.extension().unwrap(), "jpg");
    }

    #[tokio::test]
    async fn test_save_named_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        let path = handler.save_named(b"data", "../report.pdf").await.unwrap();
        assert!(path.to_str().unwrap().ends_with("_report.pdf"));

        let info = handler.file_info(&path).await.unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.extension, ".pdf");

        assert!(handler.delete_file(&path).await.unwrap());
        assert!(!handler.delete_file(&path).await.unwrap());
        assert!(handler.file_info(&path).await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());
        handler.save_named(b"x", "a.txt").await.unwrap();

        assert_eq!(handler.cleanup_old_files(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(handler.cleanup_old_files(Duration::ZERO).await.unwrap(), 1);

        let missing = FileHandler::new(dir.path().join("missing"), 1, Vec::new());
        assert_eq!(missing.cleanup_old_files(Duration::ZERO).await.unwrap(), 0);
    }
}
