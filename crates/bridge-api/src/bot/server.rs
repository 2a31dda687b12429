//! 독립 WebSocket 봇.
//!
//! 방문자는 `/`로 접속해 `{"session": id}`를 먼저 보내고, 이후 프레임은
//! `Visitor {session}` 머리글과 함께 그룹에 게시됩니다.
//! 관리자가 그 메시지에 답장하면 해당 방문자 소켓으로 전달됩니다.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use bridge_core::{session_span, BridgeError, BridgeResult};
use bridge_telegram::{
    AdminUpdateHandler, BotCommand, CommandResponse, TelegramClient, TelegramError,
    TelegramResult, TgMessage,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn, Instrument};

use super::protocol::{
    connected_text, session_from_reply, visitor_caption, visitor_text, AdminContent, AdminPayload,
    Hello, VisitorFrame,
};
use crate::services::file_handler::{sanitize_file_name, sanitize_session_id};

/// 첫 프레임 대기 시간.
const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

struct Visitor {
    id: u64,
    sender: mpsc::UnboundedSender<AdminPayload>,
}

/// 방문자 소켓과 관리자 그룹을 잇는 봇.
pub struct WebSocketBot {
    client: TelegramClient,
    tmp_dir: PathBuf,
    visitors: RwLock<HashMap<String, Visitor>>,
    next_id: AtomicU64,
}

impl WebSocketBot {
    pub fn new(client: TelegramClient, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            tmp_dir: tmp_dir.into(),
            visitors: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 방문자를 등록합니다. 같은 세션의 이전 연결은 대체됩니다.
    pub async fn register(&self, session: &str) -> (u64, mpsc::UnboundedReceiver<AdminPayload>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.visitors
            .write()
            .await
            .insert(session.to_string(), Visitor { id, sender });
        (id, receiver)
    }

    /// 등록 ID가 같을 때만 제거합니다.
    pub async fn unregister(&self, session: &str, id: u64) {
        let mut visitors = self.visitors.write().await;
        if visitors.get(session).is_some_and(|v| v.id == id) {
            visitors.remove(session);
        }
    }

    pub async fn visitor_count(&self) -> usize {
        self.visitors.read().await.len()
    }

    /// 방문자 소켓으로 전송합니다. 접속 중이 아니면 `false`.
    pub async fn send_to_visitor(&self, session: &str, payload: AdminPayload) -> bool {
        match self.visitors.read().await.get(session) {
            Some(visitor) => visitor.sender.send(payload).is_ok(),
            None => false,
        }
    }

    /// 방문자 프레임을 그룹에 게시합니다.
    pub async fn forward_visitor_frame(&self, session: &str, frame: VisitorFrame) -> BridgeResult<()> {
        let chat_id = self.client.chat_id();

        match frame {
            VisitorFrame::Text { text } => {
                self.client
                    .send_message(chat_id, &visitor_text(session, &text))
                    .await?;
            }
            VisitorFrame::Voice { file } => {
                let name = format!("{}.ogg", sanitize_session_id(session));
                self.store(&name, &file).await?;
                self.client
                    .send_voice(chat_id, file, &name, Some(&visitor_caption(session)))
                    .await?;
            }
            VisitorFrame::File { name, file } => {
                let name = sanitize_file_name(&name);
                self.store(&name, &file).await?;
                self.client
                    .send_document(chat_id, file, &name, Some(&visitor_caption(session)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn store(&self, name: &str, data: &[u8]) -> BridgeResult<()> {
        tokio::fs::create_dir_all(&self.tmp_dir).await?;
        let path = self.tmp_dir.join(name);
        tokio::fs::write(&path, data).await?;
        debug!(path = %path.display(), size = data.len(), "방문자 파일 저장");
        Ok(())
    }

    /// 관리자 답장을 방문자에게 보낼 프레임으로 변환합니다.
    async fn resolve(&self, content: AdminContent) -> TelegramResult<AdminPayload> {
        let file_path = |file: bridge_telegram::TgFile, file_id: &str| {
            file.file_path.ok_or_else(|| TelegramError::Api {
                code: 400,
                description: format!("file_path 없음: {}", file_id),
            })
        };

        Ok(match content {
            AdminContent::Text(text) => AdminPayload::Text { text },
            AdminContent::Voice { file_id } => AdminPayload::Voice {
                file_path: file_path(self.client.get_file(&file_id).await?, &file_id)?,
            },
            AdminContent::Document { file_id } => AdminPayload::File {
                file_path: file_path(self.client.get_file(&file_id).await?, &file_id)?,
            },
        })
    }

    /// 방문자 소켓 처리.
    pub async fn serve_visitor(self: Arc<Self>, socket: WebSocket) {
        let (mut sink, mut stream) = socket.split();

        let first = match tokio::time::timeout(HELLO_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(WsMessage::Text(text)))) => Hello::session_from(text.as_str()),
            _ => None,
        };
        let Some(session) = first else {
            debug!("세션 없는 연결 종료");
            let _ = sink.send(WsMessage::Close(None)).await;
            return;
        };

        let span = session_span!("legacy_ws", session);
        async move {
            let (id, mut payloads) = self.register(&session).await;
            info!("방문자 접속");

            if let Err(e) = self
                .client
                .send_message(self.client.chat_id(), &connected_text(&session))
                .await
            {
                warn!("접속 알림 전송 실패: {}", e);
            }

            let writer = tokio::spawn(async move {
                while let Some(payload) = payloads.recv().await {
                    let json = match serde_json::to_string(&payload) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("프레임 직렬화 실패: {}", e);
                            continue;
                        }
                    };
                    if sink.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            });

            while let Some(Ok(message)) = stream.next().await {
                let text = match message {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(_) => break,
                    _ => continue,
                };

                let result = match serde_json::from_str::<VisitorFrame>(text.as_str()) {
                    Ok(frame) => self.forward_visitor_frame(&session, frame).await,
                    Err(e) => Err(BridgeError::InvalidMessage(e.to_string())),
                };
                if let Err(e) = result {
                    error!("세션 처리 오류: {}", e);
                    break;
                }
            }

            self.unregister(&session, id).await;
            writer.abort();
            info!("방문자 접속 종료");
        }
        .instrument(span)
        .await;
    }
}

#[async_trait]
impl AdminUpdateHandler for WebSocketBot {
    async fn handle_command(
        &self,
        _command: BotCommand,
        _message: &TgMessage,
    ) -> TelegramResult<Option<CommandResponse>> {
        Ok(None)
    }

    async fn handle_message(&self, message: &TgMessage) -> TelegramResult<Option<CommandResponse>> {
        let Some(session) = session_from_reply(message) else {
            return Ok(None);
        };
        let Some(content) = AdminContent::from_message(message) else {
            return Ok(None);
        };

        let payload = self.resolve(content).await?;
        if !self.send_to_visitor(&session, payload).await {
            debug!(session_id = %session, "접속 중이 아닌 방문자에 대한 답장");
        }
        Ok(None)
    }
}

async fn bot_ws_handler(ws: WebSocketUpgrade, State(bot): State<Arc<WebSocketBot>>) -> Response {
    ws.on_upgrade(move |socket| bot.serve_visitor(socket))
}

/// `/` 하나만 가진 봇 라우터.
pub fn bot_router(bot: Arc<WebSocketBot>) -> Router {
    Router::new()
        .route("/", get(bot_ws_handler))
        .with_state(bot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_telegram::TelegramConfig;

    fn bot(server_url: &str, dir: &std::path::Path) -> WebSocketBot {
        let client =
            TelegramClient::new(TelegramConfig::new("1:t", -100).with_api_base(server_url));
        WebSocketBot::new(client, dir)
    }

    fn reply(json: serde_json::Value) -> TgMessage {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn test_register_replaces_and_unregister_checks_id() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot("http://127.0.0.1:9", dir.path());

        let (first, _rx1) = bot.register("s1").await;
        let (second, mut rx2) = bot.register("s1").await;
        assert_eq!(bot.visitor_count().await, 1);

        bot.unregister("s1", first).await;
        assert_eq!(bot.visitor_count().await, 1);

        assert!(
            bot.send_to_visitor(
                "s1",
                AdminPayload::Text {
                    text: "hi".to_string()
                }
            )
            .await
        );
        assert_eq!(
            rx2.recv().await,
            Some(AdminPayload::Text {
                text: "hi".to_string()
            })
        );

        bot.unregister("s1", second).await;
        assert_eq!(bot.visitor_count().await, 0);
    }

    #[tokio::test]
    async fn test_text_reply_routed_to_visitor() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot("http://127.0.0.1:9", dir.path());
        let (_id, mut rx) = bot.register("abc").await;

        let message = reply(serde_json::json!({
            "message_id": 10,
            "chat": {"id": -100},
            "text": "Hello from support",
            "reply_to_message": {"message_id": 1, "chat": {"id": -100}, "text": "Visitor abc\n\nhelp"}
        }));
        assert_eq!(bot.handle_message(&message).await.unwrap(), None);
        assert_eq!(
            rx.recv().await,
            Some(AdminPayload::Text {
                text: "Hello from support".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_voice_reply_resolves_file_path() {
        let mut server = mockito::Server::new_async().await;
        let get_file = server
            .mock("POST", "/bot1:t/getFile")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":true,"result":{"file_id":"v1","file_path":"voice/file_7.oga"}}"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let bot = bot(&server.url(), dir.path());
        let (_id, mut rx) = bot.register("abc").await;

        let message = reply(serde_json::json!({
            "message_id": 11,
            "chat": {"id": -100},
            "voice": {"file_id": "v1", "duration": 3},
            "reply_to_message": {"message_id": 1, "chat": {"id": -100}, "caption": "Visitor abc"}
        }));
        bot.handle_message(&message).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(AdminPayload::Voice {
                file_path: "voice/file_7.oga".to_string()
            })
        );
        get_file.assert_async().await;
    }

    #[tokio::test]
    async fn test_visitor_text_posted_to_group() {
        let mut server = mockito::Server::new_async().await;
        let send = server
            .mock("POST", "/bot1:t/sendMessage")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "chat_id": -100,
                "text": "Visitor abc\n\nhi &amp; bye"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":5,"chat":{"id":-100}}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let bot = bot(&server.url(), dir.path());
        bot.forward_visitor_frame(
            "abc",
            VisitorFrame::Text {
                text: "hi & bye".to_string(),
            },
        )
        .await
        .unwrap();

        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_visitor_file_saved_with_sanitized_name() {
        let mut server = mockito::Server::new_async().await;
        let send = server
            .mock("POST", "/bot1:t/sendDocument")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":6,"chat":{"id":-100}}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let bot = bot(&server.url(), dir.path());
        bot.forward_visitor_frame(
            "abc",
            VisitorFrame::File {
                name: "../../etc/report.pdf".to_string(),
                file: b"%PDF-1.4".to_vec(),
            },
        )
        .await
        .unwrap();

        send.assert_async().await;
        let saved = dir.path().join("report.pdf");
        assert_eq!(std::fs::read(saved).unwrap(), b"%PDF-1.4");
    }
}
