//! 텔레그램 메시지 ID → 방문자 세션 매핑.
//!
//! 관리자가 그룹에서 답장한 메시지가 어느 방문자에게 가야 하는지 결정합니다.
//! 용량을 넘으면 가장 오래된 항목부터 제거합니다.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

/// 기본 용량.
pub const DEFAULT_REPLY_MAP_CAPACITY: usize = 10_000;

/// 답장 대상.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    /// 특정 방문자 세션
    Session(String),
    /// 모든 방문자
    Broadcast,
}

#[derive(Debug, Default)]
struct Inner {
    targets: HashMap<i64, ReplyTarget>,
    order: VecDeque<i64>,
}

/// 용량 제한이 있는 답장 매핑.
#[derive(Debug)]
pub struct ReplyMap {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl Default for ReplyMap {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY_MAP_CAPACITY)
    }
}

impl ReplyMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// 매핑 추가.
    pub async fn insert(&self, telegram_message_id: i64, target: ReplyTarget) {
        let mut inner = self.inner.write().await;

        if inner.targets.insert(telegram_message_id, target).is_none() {
            inner.order.push_back(telegram_message_id);
        }

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.targets.remove(&oldest);
            }
        }
    }

    /// 세션 매핑 추가.
    pub async fn insert_session(&self, telegram_message_id: i64, session_id: &str) {
        self.insert(telegram_message_id, ReplyTarget::Session(session_id.to_string()))
            .await;
    }

    /// 답장 대상 조회.
    pub async fn get(&self, telegram_message_id: i64) -> Option<ReplyTarget> {
        self.inner
            .read()
            .await
            .targets
            .get(&telegram_message_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.targets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
