//! 방문자 WebSocket 연결 레지스트리.
//!
//! 세션 ID별로 송신 채널을 보관하고, 관리자 답장과 브로드캐스트를 전달합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bridge_core::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use utoipa::ToSchema;

use super::messages::ServerFrame;

/// 연결 송신 채널.
pub type FrameSender = mpsc::UnboundedSender<ServerFrame>;
/// 연결 수신 채널 (writer 태스크 소유).
pub type FrameReceiver = mpsc::UnboundedReceiver<ServerFrame>;

#[derive(Debug)]
struct Connection {
    /// 같은 세션 ID로 재접속했을 때 이전 연결과 구분하기 위한 번호
    id: u64,
    sender: FrameSender,
    connected_at: DateTime<Utc>,
}

/// 연결 통계.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub sessions: Vec<String>,
    /// 가장 오래된 연결 시각
    pub active_since: Option<DateTime<Utc>>,
}

/// 연결 등록 결과.
#[derive(Debug)]
pub struct Registration {
    /// [`ConnectionRegistry::unregister`]에 넘길 연결 번호
    pub id: u64,
    /// 이 연결 전용 송신 채널
    pub sender: FrameSender,
    pub receiver: FrameReceiver,
}

/// 접속 중인 방문자 연결 목록.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Connection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 연결 등록.
    ///
    /// 같은 세션의 기존 연결은 목록에서 빠지고 새 연결로 대체됩니다.
    pub async fn register(&self, session_id: &str) -> Registration {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self.connections.write().await.insert(
            session_id.to_string(),
            Connection {
                id,
                sender: tx.clone(),
                connected_at: Utc::now(),
            },
        );
        if previous.is_some() {
            debug!(session_id, "기존 연결을 새 연결로 대체");
        }

        Registration {
            id,
            sender: tx,
            receiver: rx,
        }
    }

    /// 연결 해제. 이미 새 연결로 대체되었으면 아무것도 하지 않습니다.
    pub async fn unregister(&self, session_id: &str, connection_id: u64) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(session_id) {
            Some(conn) if conn.id == connection_id => {
                connections.remove(session_id);
                true
            }
            _ => false,
        }
    }

    /// 특정 세션에 프레임 전송.
    pub async fn send_frame(&self, session_id: &str, frame: ServerFrame) -> bool {
        match self.current_sender(session_id).await {
            Some(target) => self.deliver(session_id, target, frame).await,
            None => false,
        }
    }

    /// 현재 연결의 번호와 송신 채널.
    async fn current_sender(&self, session_id: &str) -> Option<(u64, FrameSender)> {
        self.connections
            .read()
            .await
            .get(session_id)
            .map(|conn| (conn.id, conn.sender.clone()))
    }

    /// 전송 실패 시 그 연결만 목록에서 뺍니다. 그 사이 재접속한 연결은 유지됩니다.
    async fn deliver(
        &self,
        session_id: &str,
        (connection_id, sender): (u64, FrameSender),
        frame: ServerFrame,
    ) -> bool {
        if sender.send(frame).is_ok() {
            return true;
        }
        // writer가 이미 종료된 연결
        self.unregister(session_id, connection_id).await;
        false
    }

    /// 특정 세션에 메시지 전송.
    pub async fn send_to(&self, session_id: &str, message: Message) -> bool {
        self.send_frame(session_id, ServerFrame::message(message))
            .await
    }

    /// 모든 연결에 메시지 전송.
    ///
    /// 각 방문자에게는 자신의 세션 ID가 담긴 사본이 전달됩니다.
    /// 전송에 성공한 연결 수를 반환합니다.
    pub async fn broadcast(&self, message: &Message, exclude: Option<&str>) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let connections = self.connections.read().await;
            for (session_id, conn) in connections.iter() {
                if exclude == Some(session_id.as_str()) {
                    continue;
                }

                let mut copy = message.clone();
                copy.session_id = session_id.clone();
                if conn.sender.send(ServerFrame::message(copy)).is_ok() {
                    delivered += 1;
                } else {
                    closed.push((session_id.clone(), conn.id));
                }
            }
        }

        if !closed.is_empty() {
            let mut connections = self.connections.write().await;
            for (session_id, id) in closed {
                if connections.get(&session_id).is_some_and(|conn| conn.id == id) {
                    connections.remove(&session_id);
                }
            }
        }

        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_connected(&self, session_id: &str) -> bool {
        self.connections.read().await.contains_key(session_id)
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 연결 통계.
    pub async fn stats(&self) -> ConnectionStats {
        let connections = self.connections.read().await;
        let mut sessions: Vec<String> = connections.keys().cloned().collect();
        sessions.sort();

        ConnectionStats {
            total_connections: connections.len(),
            sessions,
            active_since: connections.values().map(|c| c.connected_at).min(),
        }
    }

    /// 모든 연결에 종료 프레임을 보내고 목록을 비웁니다.
    pub async fn close_all(&self, code: u16, reason: &str) -> usize {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        for (_, conn) in connections.drain() {
            let _ = conn.sender.send(ServerFrame::close(code, reason));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::MessageType;

    fn admin_text(text: &str) -> Message {
        Message::admin("", text, MessageType::Admin)
    }

    #[tokio::test]
    async fn test_register_and_send() {
        let registry = ConnectionRegistry::new();
        let mut rx = registry.register("s1").await.receiver;

        assert!(registry.send_to("s1", admin_text("hi")).await);
        assert!(!registry.send_to("unknown", admin_text("hi")).await);

        match rx.recv().await.unwrap() {
            ServerFrame::Message(msg) => assert_eq!(msg.content, "hi"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_with_exclude() {
        let registry = ConnectionRegistry::new();
        let mut rx1 = registry.register("s1").await.receiver;
        let mut rx2 = registry.register("s2").await.receiver;

        assert_eq!(registry.broadcast(&admin_text("all"), None).await, 2);
        assert_eq!(registry.broadcast(&admin_text("some"), Some("s1")).await, 1);

        match rx1.recv().await.unwrap() {
            ServerFrame::Message(msg) => assert_eq!(msg.session_id, "s1"),
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(rx2.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reconnect_keeps_newest() {
        let registry = ConnectionRegistry::new();
        let old = registry.register("s1").await;
        let new = registry.register("s1").await;

        assert!(!registry.unregister("s1", old.id).await);
        assert!(registry.is_connected("s1").await);
        assert!(registry.unregister("s1", new.id).await);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_newer_connection() {
        let registry = ConnectionRegistry::new();
        let old = registry.register("s1").await;
        let stale = registry.current_sender("s1").await.unwrap();
        drop(old.receiver);

        // 전송 실패 전에 같은 세션으로 재접속
        let mut new = registry.register("s1").await;
        assert!(!registry.deliver("s1", stale, ServerFrame::pong()).await);

        assert!(registry.is_connected("s1").await);
        assert!(registry.send_to("s1", admin_text("still here")).await);
        match new.receiver.recv().await.unwrap() {
            ServerFrame::Message(msg) => assert_eq!(msg.content, "still here"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_to_closed_connection_prunes_it() {
        let registry = ConnectionRegistry::new();
        let registration = registry.register("s1").await;
        drop(registration.receiver);

        assert!(!registry.send_to("s1", admin_text("x")).await);
        assert!(!registry.is_connected("s1").await);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let registry = ConnectionRegistry::new();
        let registration = registry.register("s1").await;
        drop(registration.receiver);

        assert_eq!(registry.broadcast(&admin_text("x"), None).await, 0);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_stats_and_close_all() {
        let registry = ConnectionRegistry::new();
        let stats = registry.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert!(stats.active_since.is_none());

        let mut rx = registry.register("b").await.receiver;
        let _other = registry.register("a").await;

        let stats = registry.stats().await;
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.sessions, vec!["a".to_string(), "b".to_string()]);
        assert!(stats.active_since.is_some());

        assert_eq!(registry.close_all(1001, "Server shutdown").await, 2);
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerFrame::close(1001, "Server shutdown")
        );
        assert!(registry.session_ids().await.is_empty());
    }
}
