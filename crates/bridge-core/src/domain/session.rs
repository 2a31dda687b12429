//! 방문자 세션 모델.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 세션 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Inactive,
    Expired,
    Banned,
}

/// 방문자 정보.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct VisitorInfo {
    pub user_agent: String,
    pub ip_address: String,
    pub language: String,
    pub timezone: String,
    pub referrer: String,
    pub page_url: String,
}

impl Default for VisitorInfo {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            ip_address: String::new(),
            language: "en".to_string(),
            timezone: "UTC".to_string(),
            referrer: String::new(),
            page_url: String::new(),
        }
    }
}

impl VisitorInfo {
    /// User-Agent와 IP로 방문자 정보를 생성합니다.
    pub fn new(user_agent: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip_address: ip_address.into(),
            ..Default::default()
        }
    }
}

/// 방문자 세션.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub visitor_info: VisitorInfo,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    #[cfg_attr(feature = "utoipa-support", schema(value_type = Object))]
    pub metadata: Map<String, Value>,
}

impl Session {
    /// 새 활성 세션을 생성합니다.
    pub fn new(session_id: impl Into<String>, visitor_info: VisitorInfo) -> Self {
        Self::new_at(session_id, visitor_info, Utc::now())
    }

    /// 지정한 시각 기준으로 세션을 생성합니다.
    pub fn new_at(
        session_id: impl Into<String>,
        visitor_info: VisitorInfo,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Active,
            created_at: now,
            last_activity: now,
            visitor_info,
            message_count: 0,
            file_count: 0,
            metadata: Map::new(),
        }
    }

    /// 마지막 활동 시각을 갱신하고 세션을 다시 활성화합니다.
    pub fn touch(&mut self) {
        self.touch_at(Utc::now());
    }

    pub fn touch_at(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
        if self.status == SessionStatus::Inactive {
            self.status = SessionStatus::Active;
        }
    }

    /// 마지막 활동 이후 경과 시간.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity).to_std().unwrap_or_default()
    }

    /// 타임아웃이 지났는지.
    pub fn is_timed_out(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        self.idle_for(now) > timeout
    }

    /// 활성 상태이면서 타임아웃 이내인지.
    pub fn is_active_at(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_timed_out(timeout, now)
    }

    /// 세션 지속 시간.
    ///
    /// 활성 세션은 현재까지, 종료된 세션은 마지막 활동까지 계산합니다.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        let end = if self.status == SessionStatus::Active {
            now
        } else {
            self.last_activity
        };
        (end - self.created_at).to_std().unwrap_or_default()
    }
}

/// 세션 통계.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub messages_today: u64,
    pub files_today: u64,
    /// 평균 세션 지속 시간 (초)
    pub avg_session_duration: f64,
    pub peak_concurrent: usize,
}

/// 세션 지속 시간을 `1h 2m 3s` 형식으로 표시합니다.
pub fn format_session_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// 업타임을 `H:MM:SS` 형식으로 표시합니다 (하루 이상이면 `N day(s), ` 접두).
pub fn format_uptime(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let rem = total % 86_400;
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);

    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_session_activity_window() {
        let now = Utc::now();
        let mut session = Session::new_at("s1", VisitorInfo::default(), now);
        let timeout = Duration::from_secs(60);

        assert!(session.is_active_at(timeout, now + ChronoDuration::seconds(60)));
        assert!(!session.is_active_at(timeout, now + ChronoDuration::seconds(61)));

        session.touch_at(now + ChronoDuration::seconds(50));
        assert!(session.is_active_at(timeout, now + ChronoDuration::seconds(100)));
    }

    #[test]
    fn test_inactive_session_never_active() {
        let now = Utc::now();
        let mut session = Session::new_at("s1", VisitorInfo::default(), now);
        session.status = SessionStatus::Banned;
        assert!(!session.is_active_at(Duration::from_secs(3600), now));
    }

    #[test]
    fn test_duration_uses_last_activity_when_ended() {
        let now = Utc::now();
        let mut session = Session::new_at("s1", VisitorInfo::default(), now);
        session.touch_at(now + ChronoDuration::seconds(30));
        session.status = SessionStatus::Inactive;

        let later = now + ChronoDuration::seconds(500);
        assert_eq!(session.duration(later), Duration::from_secs(30));
    }

    #[test]
    fn test_format_session_duration() {
        assert_eq!(format_session_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_session_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_session_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(303)), "0:05:03");
        assert_eq!(format_uptime(Duration::from_secs(86_400)), "1 day, 0:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 3661)),
            "2 days, 1:01:01"
        );
    }

    #[test]
    fn test_visitor_info_defaults() {
        let info: VisitorInfo = serde_json::from_str(r#"{"user_agent":"curl"}"#).unwrap();
        assert_eq!(info.user_agent, "curl");
        assert_eq!(info.language, "en");
        assert_eq!(info.timezone, "UTC");
    }
}
