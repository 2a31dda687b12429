//! 방문자 세션 관리.
//!
//! 세션 생성/조회/종료, 활동 시각 갱신, 일별 통계와 주기적 정리를 담당합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_core::{
    format_session_duration, format_uptime, Session, SessionStats, SessionStatus, VisitorInfo,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::metrics::set_active_sessions;

/// 활성 세션 요약 (`GET /sessions`, `/sessions` 명령어).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub visitor_info: VisitorInfo,
    pub message_count: u64,
    pub file_count: u64,
    /// 지속 시간 (`1h 2m 3s`)
    pub duration: String,
    pub duration_secs: u64,
    /// 마지막 활동 이후 경과 시간 (`2m 5s`)
    pub inactive_for: String,
    pub inactive_for_secs: u64,
}

impl SessionSummary {
    fn from_session(session: &Session, now: DateTime<Utc>) -> Self {
        let duration = session.duration(now);
        let inactive = session.idle_for(now);

        Self {
            session_id: session.session_id.clone(),
            status: session.status,
            created_at: session.created_at,
            last_activity: session.last_activity,
            visitor_info: session.visitor_info.clone(),
            message_count: session.message_count,
            file_count: session.file_count,
            duration: format_session_duration(duration),
            duration_secs: duration.as_secs(),
            inactive_for: format_session_duration(inactive),
            inactive_for_secs: inactive.as_secs(),
        }
    }
}

/// 서버 통계.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServerStats {
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub total_sessions_today: u64,
    pub messages_today: u64,
    pub files_today: u64,
    pub peak_concurrent: usize,
    /// 업타임 (`H:MM:SS`, 하루 이상이면 `N days, ` 접두)
    pub uptime: String,
    pub uptime_secs: u64,
    /// 프로세스 RSS (MB)
    pub memory_usage_mb: f64,
    pub start_time: DateTime<Utc>,
}

/// 하루 단위로 초기화되는 카운터.
#[derive(Debug, Clone)]
struct DailyCounters {
    day: NaiveDate,
    sessions_created: u64,
    sessions_ended: u64,
    messages: u64,
    files: u64,
    peak_concurrent: usize,
}

impl DailyCounters {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            sessions_created: 0,
            sessions_ended: 0,
            messages: 0,
            files: 0,
            peak_concurrent: 0,
        }
    }
}

/// 세션 매니저.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    daily: RwLock<DailyCounters>,
    started_at: DateTime<Utc>,
    timeout: Duration,
    max_sessions: usize,
}

impl SessionManager {
    /// 새 세션 매니저 생성.
    pub fn new(timeout: Duration, max_sessions: usize) -> Self {
        let now = Utc::now();
        Self {
            sessions: RwLock::new(HashMap::new()),
            daily: RwLock::new(DailyCounters::new(now.date_naive())),
            started_at: now,
            timeout,
            max_sessions,
        }
    }

    /// 세션 타임아웃.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 세션을 생성합니다.
    ///
    /// 같은 ID가 이미 있으면 생성 시각과 카운터를 유지한 채 다시 활성화합니다.
    pub async fn create_session(&self, session_id: &str, visitor_info: VisitorInfo) -> Session {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let session = match sessions.get_mut(session_id) {
            Some(existing) => {
                existing.status = SessionStatus::Active;
                existing.visitor_info = visitor_info;
                existing.touch_at(now);
                debug!(session_id, "기존 세션 재활성화");
                existing.clone()
            }
            None => {
                let session = Session::new_at(session_id, visitor_info, now);
                sessions.insert(session_id.to_string(), session.clone());
                info!(session_id, "세션 생성");
                session
            }
        };

        let active = count_active(&sessions, self.timeout, now);
        drop(sessions);

        let mut daily = self.daily.write().await;
        daily.sessions_created += 1;
        daily.peak_concurrent = daily.peak_concurrent.max(active);
        set_active_sessions(active);

        session
    }

    /// 세션 조회.
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// 마지막 활동 시각 갱신.
    pub async fn update_activity(&self, session_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.touch();
        }
    }

    /// 메시지 카운터 증가.
    pub async fn increment_message_count(&self, session_id: &str) {
        let found = match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.message_count += 1;
                true
            }
            None => false,
        };
        if found {
            self.daily.write().await.messages += 1;
        }
    }

    /// 파일 카운터 증가.
    pub async fn increment_file_count(&self, session_id: &str) {
        let found = match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.file_count += 1;
                true
            }
            None => false,
        };
        if found {
            self.daily.write().await.files += 1;
        }
    }

    /// 세션 종료 (비활성으로 표시).
    pub async fn end_session(&self, session_id: &str) {
        let ended = match self.sessions.write().await.get_mut(session_id) {
            Some(session) if session.status == SessionStatus::Active => {
                session.status = SessionStatus::Inactive;
                true
            }
            _ => false,
        };

        if ended {
            self.daily.write().await.sessions_ended += 1;
            info!(session_id, "세션 종료");
        }
    }

    /// 세션이 존재하고 활성 상태인지 확인합니다.
    ///
    /// 타임아웃이 지난 세션은 비활성으로 표시합니다.
    pub async fn validate_session(&self, session_id: &str) -> bool {
        self.validate_session_at(session_id, Utc::now()).await
    }

    pub async fn validate_session_at(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };

        if session.is_timed_out(self.timeout, now) {
            session.status = SessionStatus::Inactive;
            return false;
        }

        session.status == SessionStatus::Active
    }

    /// 활성 세션 목록 (생성 시각 순).
    pub async fn active_sessions(&self) -> Vec<SessionSummary> {
        self.active_sessions_at(Utc::now()).await
    }

    pub async fn active_sessions_at(&self, now: DateTime<Utc>) -> Vec<SessionSummary> {
        let mut sessions = self.sessions.write().await;
        let mut active = Vec::new();

        for session in sessions.values_mut() {
            if session.is_timed_out(self.timeout, now) {
                session.status = SessionStatus::Inactive;
                continue;
            }
            if session.status == SessionStatus::Active {
                active.push(SessionSummary::from_session(session, now));
            }
        }

        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        active
    }

    /// 활성 세션 수.
    pub async fn active_count(&self) -> usize {
        count_active(&*self.sessions.read().await, self.timeout, Utc::now())
    }

    /// 새 세션을 받을 수 있는지 확인합니다.
    pub async fn can_accept(&self) -> bool {
        self.active_count().await < self.max_sessions
    }

    /// 세션 지속 시간 텍스트.
    pub async fn session_duration_text(&self, session_id: &str) -> String {
        match self.sessions.read().await.get(session_id) {
            Some(session) => format_session_duration(session.duration(Utc::now())),
            None => "Session not found".to_string(),
        }
    }

    /// 서버 통계.
    pub async fn statistics(&self) -> ServerStats {
        let now = Utc::now();
        let (active, total) = {
            let sessions = self.sessions.read().await;
            (count_active(&sessions, self.timeout, now), sessions.len())
        };
        let daily = self.daily.read().await.clone();
        let uptime = (now - self.started_at).to_std().unwrap_or_default();

        ServerStats {
            active_sessions: active,
            total_sessions: total,
            total_sessions_today: daily.sessions_created,
            messages_today: daily.messages,
            files_today: daily.files,
            peak_concurrent: daily.peak_concurrent.max(active),
            uptime: format_uptime(uptime),
            uptime_secs: uptime.as_secs(),
            memory_usage_mb: memory_usage_mb(),
            start_time: self.started_at,
        }
    }

    /// 세션 통계 (평균 지속 시간 포함).
    pub async fn session_stats(&self) -> SessionStats {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        let daily = self.daily.read().await;

        let total_secs: f64 = sessions
            .values()
            .map(|s| s.duration(now).as_secs_f64())
            .sum();
        let avg_session_duration = if sessions.is_empty() {
            0.0
        } else {
            total_secs / sessions.len() as f64
        };
        let active = count_active(&sessions, self.timeout, now);

        SessionStats {
            total_sessions: sessions.len(),
            active_sessions: active,
            messages_today: daily.messages,
            files_today: daily.files,
            avg_session_duration,
            peak_concurrent: daily.peak_concurrent.max(active),
        }
    }

    /// 비활성/타임아웃 세션을 제거하고, 날짜가 바뀌었으면 일별 카운터를 초기화합니다.
    ///
    /// 제거한 세션 수를 반환합니다.
    pub async fn perform_cleanup(&self, now: DateTime<Utc>) -> usize {
        let (removed, active) = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, s| {
                s.status == SessionStatus::Active && !s.is_timed_out(self.timeout, now)
            });
            (before - sessions.len(), sessions.len())
        };

        {
            let mut daily = self.daily.write().await;
            let today = now.date_naive();
            if daily.day != today {
                info!(previous = %daily.day, "일별 통계 초기화");
                *daily = DailyCounters::new(today);
                daily.peak_concurrent = active;
            }
        }

        set_active_sessions(active);
        if removed > 0 {
            info!(removed, "오래된 세션 정리");
        }
        removed
    }

    /// 주기적으로 세션을 정리합니다.
    pub async fn run_cleanup(self: Arc<Self>, period: Duration, shutdown: CancellationToken) {
        info!(period_secs = period.as_secs(), "세션 정리 태스크 시작");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {
                    self.perform_cleanup(Utc::now()).await;
                }
            }
        }

        info!("세션 정리 태스크 종료");
    }

    /// 모든 세션 제거 (종료 시).
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
        set_active_sessions(0);
        info!("모든 세션 정리됨");
    }
}

fn count_active(sessions: &HashMap<String, Session>, timeout: Duration, now: DateTime<Utc>) -> usize {
    sessions
        .values()
        .filter(|s| s.is_active_at(timeout, now))
        .count()
}

/// 프로세스 메모리 사용량 (MB). 읽을 수 없으면 0.
pub fn memory_usage_mb() -> f64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0.0;
    };

    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<f64>().ok())
        .map(|kb| (kb / 1024.0 * 100.0).round() / 100.0)
        .unwrap_or(0.0)
}
