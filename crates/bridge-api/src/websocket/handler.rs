//! 방문자 WebSocket 연결 handler.
//!
//! Axum WebSocket 엔드포인트 및 방문자 메시지 처리.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, FromRequestParts, Path, State,
    },
    http::{header, request::Parts, HeaderMap},
    response::IntoResponse,
    routing::get,
    Router,
};
use bridge_core::constants::{close_code, responses};
use bridge_core::{session_span, BridgeError, Message, MessageDirection, SessionStatus, VisitorInfo};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn, Instrument};

use super::connections::FrameReceiver;
use super::messages::{ClientMessage, ServerFrame};
use crate::metrics::{
    decrement_websocket_connections, increment_websocket_connections, record_bridge_message,
    set_active_sessions,
};
use crate::middleware::{extract_client_ip, RateLimitResult};
use crate::services::file_handler::{detect_kind, detect_mime};
use crate::state::AppState;

/// 연결 주소 (ConnectInfo가 없으면 `None`).
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PeerAddr(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

/// 업그레이드 직후 연결을 거절할 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rejection {
    code: u16,
    reason: &'static str,
}

/// 새 세션 ID로 접속.
///
/// # 엔드포인트
///
/// `GET /ws`
pub async fn websocket_new_session_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();
    upgrade(ws, state, session_id, peer, headers)
}

/// 지정한 세션 ID로 접속 (재접속 포함).
///
/// # 엔드포인트
///
/// `GET /ws/{session_id}`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
) -> impl IntoResponse {
    upgrade(ws, state, session_id, peer, headers)
}

fn upgrade(
    ws: WebSocketUpgrade,
    state: AppState,
    session_id: String,
    peer: Option<SocketAddr>,
    headers: HeaderMap,
) -> axum::response::Response {
    let rejection = check_origin(&state, &headers);
    let visitor = visitor_info(&headers, peer);

    ws.max_message_size(state.settings.ws_max_size)
        .max_frame_size(state.settings.ws_max_size)
        .on_upgrade(move |socket| async move {
            match rejection {
                Some(rejection) => reject(socket, &session_id, rejection).await,
                None => handle_socket(socket, state, session_id, visitor).await,
            }
        })
}

/// 운영 모드에서 Origin 헤더가 허용 목록에 없으면 거절합니다.
fn check_origin(state: &AppState, headers: &HeaderMap) -> Option<Rejection> {
    if state.settings.debug {
        return None;
    }

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if state.settings.is_origin_allowed(origin) {
        None
    } else {
        warn!(origin, "허용되지 않은 Origin의 WebSocket 접속 거절");
        Some(Rejection {
            code: close_code::WS_POLICY_VIOLATION,
            reason: "Origin not allowed",
        })
    }
}

/// 요청 헤더에서 방문자 정보 추출.
fn visitor_info(headers: &HeaderMap, peer: Option<SocketAddr>) -> VisitorInfo {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let mut visitor = VisitorInfo::new(
        header_str(header::USER_AGENT).unwrap_or_default(),
        extract_client_ip(headers, peer).to_string(),
    );
    if let Some(referrer) = header_str(header::REFERER) {
        visitor.referrer = referrer;
    }
    // "ko-KR,ko;q=0.9" → "ko-KR"
    if let Some(language) = header_str(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.split([',', ';']).next().map(|l| l.trim().to_string()))
        .filter(|l| !l.is_empty())
    {
        visitor.language = language;
    }
    visitor
}

async fn reject(mut socket: WebSocket, session_id: &str, rejection: Rejection) {
    debug!(session_id, code = rejection.code, "WebSocket 연결 거절");
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame {
            code: rejection.code,
            reason: rejection.reason.into(),
        })))
        .await;
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: AppState, session_id: String, visitor: VisitorInfo) {
    let span = session_span!("visitor_ws", session_id);
    async move {
        // 재접속이 아닌 새 세션은 용량을 확인
        let reconnecting = state
            .sessions
            .get_session(&session_id)
            .await
            .is_some_and(|s| s.status == SessionStatus::Active);
        if !reconnecting && !state.sessions.can_accept().await {
            warn!("최대 세션 수 도달, 접속 거절");
            reject(
                socket,
                &session_id,
                Rejection {
                    code: close_code::WS_TRY_AGAIN_LATER,
                    reason: "Server at capacity",
                },
            )
            .await;
            return;
        }

        let registration = state.connections.register(&session_id).await;
        increment_websocket_connections();

        state.sessions.create_session(&session_id, visitor.clone()).await;
        set_active_sessions(state.sessions.active_count().await);
        info!(ip = %visitor.ip_address, "방문자 연결");

        let (sink, mut stream) = socket.split();
        let writer = tokio::spawn(write_frames(
            sink,
            registration.receiver,
            ping_period(state.settings.ping_interval()),
        ));

        let conn = VisitorConnection {
            state: state.clone(),
            session_id: session_id.clone(),
            sender: registration.sender,
        };

        let greeting = if reconnecting {
            responses::RECONNECTED
        } else {
            responses::CONNECTED
        };
        conn.send(Message::system(&session_id, greeting));

        // 관리자 알림은 수신 루프를 막지 않도록 별도 태스크에서 전송
        {
            let gateway = state.gateway.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.notify_visitor_joined(&session_id, &visitor).await {
                    debug!(session_id = %session_id, "접속 알림 실패: {}", e);
                }
            });
        }

        let idle_timeout = ping_period(state.settings.ping_timeout());
        loop {
            let frame = match tokio::time::timeout(idle_timeout, stream.next()).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => {
                    debug!("WebSocket 수신 에러: {}", e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    info!(timeout_secs = idle_timeout.as_secs(), "수신 없음, 연결 종료");
                    conn.close(close_code::WS_GOING_AWAY, "Ping timeout");
                    break;
                }
            };

            if !conn.handle_frame(frame).await {
                break;
            }
        }

        // 세션 정리
        drop(conn);
        if state.connections.unregister(&session_id, registration.id).await {
            state.sessions.end_session(&session_id).await;
            state.message_limiter.remove(session_id.as_str()).await;
        }
        set_active_sessions(state.sessions.active_count().await);
        decrement_websocket_connections();

        // writer가 종료 프레임을 보낼 시간을 잠시 줌
        if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
            debug!("writer 태스크 종료 대기 시간 초과");
        }

        info!("방문자 연결 종료");
    }
    .instrument(span)
    .await
}

/// 0초 설정으로 interval이 패닉하지 않도록 최소 1초.
fn ping_period(period: Duration) -> Duration {
    period.max(Duration::from_secs(1))
}

/// 송신 태스크.
///
/// 채널의 프레임을 소켓에 쓰고, 주기적으로 ping을 보냅니다.
async fn write_frames(
    mut sink: futures::stream::SplitSink<WebSocket, WsMessage>,
    mut frames: FrameReceiver,
    ping_interval: Duration,
) {
    let mut ticker = tokio::time::interval(ping_interval);
    // 첫 tick은 즉시 발생
    ticker.tick().await;

    loop {
        let outgoing = tokio::select! {
            frame = frames.recv() => match frame {
                Some(ServerFrame::Close { code, reason }) => {
                    let _ = sink
                        .send(WsMessage::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
                Some(frame) => match frame.to_json() {
                    Ok(Some(json)) => WsMessage::Text(json.into()),
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("프레임 직렬화 실패: {}", e);
                        continue;
                    }
                },
                None => break,
            },
            _ = ticker.tick() => WsMessage::Ping(Bytes::new()),
        };

        if sink.send(outgoing).await.is_err() {
            break;
        }
    }

    let _ = sink.close().await;
}

/// 한 방문자 연결의 수신 처리기.
struct VisitorConnection {
    state: AppState,
    session_id: String,
    sender: UnboundedSender<ServerFrame>,
}

impl VisitorConnection {
    fn send(&self, message: Message) {
        let _ = self.sender.send(ServerFrame::message(message));
    }

    fn send_error(&self, text: impl Into<String>, code: u16) {
        self.send(Message::error_with_code(&self.session_id, text, code));
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.sender.send(ServerFrame::close(code, reason));
    }

    /// 수신 프레임 처리.
    ///
    /// # Returns
    ///
    /// `true`면 연결 유지, `false`면 연결 종료
    async fn handle_frame(&self, frame: WsMessage) -> bool {
        match frame {
            WsMessage::Text(text) => {
                self.handle_text(text.as_str()).await;
                true
            }
            WsMessage::Binary(data) => {
                self.handle_binary(&data).await;
                true
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => true,
            WsMessage::Close(_) => {
                debug!("방문자가 연결 종료 요청");
                false
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let parsed = match ClientMessage::from_json(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("잘못된 메시지: {}", e);
                self.send_error(responses::INVALID_FORMAT, close_code::INVALID_MESSAGE);
                return;
            }
        };

        match parsed {
            ClientMessage::Ping => {
                self.state.sessions.update_activity(&self.session_id).await;
                let _ = self.sender.send(ServerFrame::pong());
            }
            ClientMessage::Activity(kind) => {
                debug!(kind = %kind, "활동 신호");
                self.state.sessions.update_activity(&self.session_id).await;
            }
            chat @ ClientMessage::Chat { .. } => {
                if !self.check_rate_limit().await {
                    return;
                }
                if let Some(message) = chat.into_message(&self.session_id) {
                    self.state
                        .sessions
                        .increment_message_count(&self.session_id)
                        .await;
                    if !self.forward(message).await {
                        self.send(Message::system(&self.session_id, responses::ADMIN_OFFLINE));
                    }
                }
            }
        }
    }

    async fn handle_binary(&self, data: &[u8]) {
        if !self.check_rate_limit().await {
            return;
        }

        match self.store_upload(data).await {
            Ok(message) => {
                self.state.sessions.increment_file_count(&self.session_id).await;
                if self.forward(message).await {
                    self.send(Message::system(&self.session_id, responses::UPLOAD_OK));
                } else {
                    self.send_error(responses::UPLOAD_FAILED, close_code::WS_INTERNAL_ERROR);
                }
            }
            Err(e @ BridgeError::FileTooLarge { limit, .. }) => {
                warn!("업로드 크기 초과: {}", e);
                self.send_error(responses::file_too_large(limit), e.close_code());
            }
            Err(e) => {
                warn!("업로드 저장 실패: {}", e);
                self.send_error(responses::UPLOAD_FAILED, e.close_code());
            }
        }
    }

    /// 바이너리 업로드를 검사하고 임시 파일로 저장한 뒤 파일 메시지를 만듭니다.
    async fn store_upload(&self, data: &[u8]) -> Result<Message, BridgeError> {
        let size = data.len() as u64;
        let kind = detect_kind(data);
        self.state.files.check_size(kind, size)?;

        let path = self
            .state
            .files
            .save_temp_file(data, &self.session_id, kind)
            .await?;
        let path_str = path
            .to_str()
            .ok_or_else(|| BridgeError::File(format!("잘못된 경로: {}", path.display())))?
            .to_string();

        Ok(Message::new(
            &self.session_id,
            format!("File upload: {}", kind.as_str()),
            kind.message_type(),
        )
        .with_metadata("file_path", path_str)
        .with_metadata("file_type", kind.as_str())
        .with_metadata("file_size", size)
        .with_metadata("mime_type", detect_mime(data))
        .with_metadata("file_url", self.state.files.file_url(&path)))
    }

    /// 세션별 메시지 한도 확인. 초과 시 에러 메시지를 보내고 `false`.
    async fn check_rate_limit(&self) -> bool {
        match self
            .state
            .message_limiter
            .check(self.session_id.clone())
            .await
        {
            RateLimitResult::Allowed => true,
            RateLimitResult::Limited { retry_after } => {
                warn!(retry_after, "메시지 한도 초과");
                self.send_error(responses::RATE_LIMITED, close_code::RATE_LIMITED);
                false
            }
        }
    }

    /// 관리자에게 전달. 텔레그램 실패는 연결을 끊지 않습니다.
    ///
    /// 메시지/파일 카운터는 호출자가 올립니다.
    async fn forward(&self, message: Message) -> bool {
        self.state.sessions.update_activity(&self.session_id).await;
        record_bridge_message(MessageDirection::VisitorToAdmin, message.message_type);

        debug!(message_type = %message.message_type, content = %message.preview(50), "방문자 메시지");

        match self.state.gateway.forward(&message).await {
            Ok(_) => true,
            Err(e) => {
                warn!(gateway = self.state.gateway.name(), "관리자 전달 실패: {}", e);
                false
            }
        }
    }
}

/// WebSocket 라우터 생성.
pub fn websocket_router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket_new_session_handler))
        .route("/ws/{session_id}", get(websocket_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::http::HeaderValue;
    use bridge_core::Settings;
    use std::sync::Arc;

    #[test]
    fn test_visitor_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9"),
        );
        headers.insert(header::REFERER, HeaderValue::from_static("https://site/a"));

        let visitor = visitor_info(&headers, None);
        assert_eq!(visitor.user_agent, "Mozilla/5.0");
        assert_eq!(visitor.ip_address, "203.0.113.9");
        assert_eq!(visitor.language, "ko-KR");
        assert_eq!(visitor.referrer, "https://site/a");
    }

    #[test]
    fn test_origin_allowed_in_debug() {
        let state = create_test_state();
        assert!(check_origin(&state, &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_origin_rejected_in_production() {
        let settings = Settings {
            debug: false,
            allowed_origins: "https://site.example".to_string(),
            ..Settings::default()
        };
        let state = AppState::new(Arc::new(settings), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        assert_eq!(
            check_origin(&state, &headers),
            Some(Rejection {
                code: 1008,
                reason: "Origin not allowed"
            })
        );

        headers.insert(header::ORIGIN, HeaderValue::from_static("https://site.example"));
        assert!(check_origin(&state, &headers).is_none());
        assert!(check_origin(&state, &HeaderMap::new()).is_some());
    }

    #[test]
    fn test_ping_period_floor() {
        assert_eq!(ping_period(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(ping_period(Duration::from_secs(30)), Duration::from_secs(30));
    }
}
