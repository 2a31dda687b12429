//! WebSocket을 쓸 수 없는 클라이언트를 위한 메시지/업로드 endpoint.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use bridge_core::{BridgeError, Message, MessageDirection, MessageType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{api_error, bridge_error_response, ApiErrorResponse, ApiResult};
use crate::metrics::record_bridge_message;
use crate::state::AppState;

/// 멀티파트 헤더 등 파일 외 본문 여유분.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// 메시지 전송 요청.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    /// 방문자 세션 ID
    #[validate(length(min = 1, max = 128, message = "session_id는 1-128자여야 합니다"))]
    pub session_id: String,
    /// 본문
    #[validate(length(max = 4096, message = "content는 4096자 이하여야 합니다"))]
    pub content: String,
    /// 메시지 타입 (기본 `text`)
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

/// 메시지 전송 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendMessageResponse {
    /// "sent"
    pub status: String,
    pub message_id: String,
}

/// 업로드 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// "uploaded"
    pub status: String,
    /// 저장된 파일 이름
    pub file_name: String,
    pub file_size: u64,
    /// image | audio | video | document | file
    pub file_type: String,
    /// 다운로드 URL (`/files/{name}`)
    pub file_url: String,
}

/// 관리자에게 전달합니다. 메시지/파일 카운터는 호출자가 올립니다.
async fn forward_visitor_message(state: &AppState, message: &Message) -> ApiResult<()> {
    state.sessions.update_activity(&message.session_id).await;
    record_bridge_message(MessageDirection::VisitorToAdmin, message.message_type);

    state
        .gateway
        .forward(message)
        .await
        .map(|_| ())
        .map_err(bridge_error_response)
}

async fn require_session(state: &AppState, session_id: &str) -> ApiResult<()> {
    if state.sessions.validate_session(session_id).await {
        Ok(())
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            "SESSION_NOT_FOUND",
            "Session not found",
        ))
    }
}

/// 메시지 전송 (HTTP 폴백).
///
/// POST /message
#[utoipa::path(
    post,
    path = "/message",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "전달 완료", body = SendMessageResponse),
        (status = 400, description = "잘못된 요청", body = ApiErrorResponse),
        (status = 404, description = "세션 없음 또는 만료", body = ApiErrorResponse),
        (status = 502, description = "텔레그램 전달 실패", body = ApiErrorResponse)
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    if let Err(errors) = request.validate() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            errors.to_string(),
        ));
    }
    if request.message_type.is_control() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_MESSAGE",
            format!("'{}' 타입은 전달할 수 없습니다", request.message_type),
        ));
    }

    require_session(&state, &request.session_id).await?;

    let message = Message::new(&request.session_id, request.content, request.message_type)
        .with_client_metadata(request.metadata);

    state
        .sessions
        .increment_message_count(&message.session_id)
        .await;
    forward_visitor_message(&state, &message).await?;
    info!(session_id = %message.session_id, message_id = %message.id, "HTTP 메시지 전달");

    Ok(Json(SendMessageResponse {
        status: "sent".to_string(),
        message_id: message.id,
    }))
}

/// 업로드 폼 (`session_id`, `file`).
struct UploadForm {
    session_id: String,
    file_name: String,
    data: Vec<u8>,
}

async fn read_upload_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let bad_request =
        |message: String| api_error(StatusCode::BAD_REQUEST, "INVALID_UPLOAD", message);

    let mut session_id = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        match field.name() {
            Some("session_id") => {
                session_id = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                let data = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
                file = Some((file_name, data.to_vec()));
            }
            _ => {}
        }
    }

    let session_id = session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("session_id 필드가 없습니다".to_string()))?;
    let (file_name, data) = file.ok_or_else(|| bad_request("file 필드가 없습니다".to_string()))?;

    Ok(UploadForm {
        session_id,
        file_name,
        data,
    })
}

/// 파일 업로드 (HTTP 폴백).
///
/// POST /upload
#[utoipa::path(
    post,
    path = "/upload",
    tag = "messages",
    request_body(content_type = "multipart/form-data", description = "session_id, file"),
    responses(
        (status = 200, description = "업로드 완료", body = UploadResponse),
        (status = 400, description = "허용되지 않은 형식", body = ApiErrorResponse),
        (status = 404, description = "세션 없음 또는 만료", body = ApiErrorResponse),
        (status = 413, description = "파일 크기 초과", body = ApiErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let form = read_upload_form(multipart).await?;
    let size = form.data.len() as u64;

    let kind = state
        .files
        .validate_upload(&form.file_name, size)
        .map_err(bridge_error_response)?;
    require_session(&state, &form.session_id).await?;

    let path = state
        .files
        .save_temp_file(&form.data, &form.session_id, kind)
        .await
        .map_err(bridge_error_response)?;
    let file_url = state.files.file_url(&path);
    let saved_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| bridge_error_response(BridgeError::File("잘못된 파일 경로".to_string())))?;
    let path_str = path.to_string_lossy().to_string();

    state.sessions.increment_file_count(&form.session_id).await;

    let message = Message::new(
        &form.session_id,
        format!("File upload: {}", kind.as_str()),
        kind.message_type(),
    )
    .with_metadata("file_path", path_str)
    .with_metadata("file_type", kind.as_str())
    .with_metadata("file_size", size)
    .with_metadata("file_name", form.file_name.clone())
    .with_metadata("file_url", file_url.clone());

    if let Err(e) = forward_visitor_message(&state, &message).await {
        warn!(session_id = %form.session_id, "업로드 파일 전달 실패");
        return Err(e);
    }

    Ok(Json(UploadResponse {
        status: "uploaded".to_string(),
        file_name: saved_name,
        file_size: size,
        file_type: kind.as_str().to_string(),
        file_url,
    }))
}

/// 메시지/업로드 라우터.
///
/// 업로드 본문 한도는 `MAX_FILE_SIZE`에 맞춥니다.
pub fn messages_router(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/message", post(send_message))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{body::Body, http::Request};
    use bridge_core::VisitorInfo;
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        messages_router(state.settings.max_file_size).with_state(state)
    }

    fn json_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/message")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_request(session_id: &str, file_name: &str, data: &[u8]) -> Request<Body> {
        let boundary = "XBOUNDARY";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{s}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                s = session_id,
                f = file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_to_unknown_session() {
        let response = app(create_test_state())
            .oneshot(json_request(
                serde_json::json!({"session_id": "nope", "content": "hi"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Session not found");
    }

    #[tokio::test]
    async fn test_send_message_success() {
        let state = create_test_state();
        state
            .sessions
            .create_session("s1", VisitorInfo::default())
            .await;

        let response = app(state.clone())
            .oneshot(json_request(
                serde_json::json!({"session_id": "s1", "content": "hi", "type": "text"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "sent");
        assert!(!json["message_id"].as_str().unwrap().is_empty());

        let session = state.sessions.get_session("s1").await.unwrap();
        assert_eq!(session.message_count, 1);
    }

    /// 전달된 메시지를 보관하는 게이트웨이.
    #[derive(Default)]
    struct CapturingGateway {
        forwarded: tokio::sync::Mutex<Vec<Message>>,
    }

    #[async_trait::async_trait]
    impl crate::services::AdminGateway for CapturingGateway {
        async fn forward(&self, message: &Message) -> bridge_core::BridgeResult<Option<i64>> {
            self.forwarded.lock().await.push(message.clone());
            Ok(None)
        }

        async fn notify_visitor_joined(
            &self,
            _session_id: &str,
            _visitor: &VisitorInfo,
        ) -> bridge_core::BridgeResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "capturing"
        }
    }

    #[tokio::test]
    async fn test_send_message_drops_server_metadata() {
        let gateway = std::sync::Arc::new(CapturingGateway::default());
        let state = create_test_state().with_gateway(gateway.clone());
        state
            .sessions
            .create_session("s1", VisitorInfo::default())
            .await;

        let response = app(state)
            .oneshot(json_request(serde_json::json!({
                "session_id": "s1",
                "content": "x",
                "type": "file",
                "metadata": {"file_path": "/proc/self/environ", "file_url": "/files/x", "page": "/help"}
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let forwarded = gateway.forwarded.lock().await;
        assert_eq!(forwarded.len(), 1);
        assert!(forwarded[0].metadata_str("file_path").is_none());
        assert!(forwarded[0].metadata_str("file_url").is_none());
        assert_eq!(forwarded[0].metadata_str("page"), Some("/help"));
    }

    #[tokio::test]
    async fn test_send_message_validation() {
        let response = app(create_test_state())
            .oneshot(json_request(
                serde_json::json!({"session_id": "", "content": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_upload_success() {
        let dir = tempfile::tempdir().unwrap();
        let settings = bridge_core::Settings {
            temp_dir: dir.path().to_path_buf(),
            ..bridge_core::Settings::default()
        };
        let state = AppState::new(std::sync::Arc::new(settings), None);
        state
            .sessions
            .create_session("s1", VisitorInfo::default())
            .await;

        let response = app(state.clone())
            .oneshot(multipart_request("s1", "photo.png", b"\x89PNG\r\n\x1a\nrest"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "uploaded");
        assert_eq!(json["file_type"], "image");
        assert_eq!(json["file_size"], 12);

        let saved = dir.path().join(json["file_name"].as_str().unwrap());
        assert!(saved.exists());
        let session = state.sessions.get_session("s1").await.unwrap();
        assert_eq!(session.file_count, 1);
        assert_eq!(session.message_count, 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_extension() {
        let state = create_test_state();
        state
            .sessions
            .create_session("s1", VisitorInfo::default())
            .await;

        let response = app(state)
            .oneshot(multipart_request("s1", "run.exe", b"MZ"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_FILE_TYPE");
    }

    #[tokio::test]
    async fn test_upload_requires_fields() {
        let response = app(create_test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .header("content-type", "multipart/form-data; boundary=X")
                    .body(Body::from("--X--\r\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
