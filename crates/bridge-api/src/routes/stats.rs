//! 서버 통계와 세션 목록 endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::{ServerStats, SessionSummary};
use crate::state::AppState;
use crate::websocket::ConnectionStats;

/// `GET /stats` 응답.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub server: ServerStats,
    /// WebSocket 연결 통계
    pub connections: ConnectionStats,
}

/// 서버 통계.
///
/// GET /stats
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    responses(
        (status = 200, description = "서버 통계", body = StatsResponse)
    )
)]
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        server: state.sessions.statistics().await,
        connections: state.connections.stats().await,
    })
}

/// 활성 세션 목록.
///
/// GET /sessions
#[utoipa::path(
    get,
    path = "/sessions",
    tag = "stats",
    responses(
        (status = 200, description = "활성 세션 목록", body = [SessionSummary])
    )
)]
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.sessions.active_sessions().await)
}

pub fn stats_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/sessions", get(list_sessions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use bridge_core::VisitorInfo;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_stats_includes_connections() {
        let state = create_test_state();
        state
            .sessions
            .create_session("s1", VisitorInfo::new("UA", "10.0.0.1"))
            .await;
        let _conn = state.connections.register("s1").await;
        let app = stats_router().with_state(state);

        let json = get_json(app, "/stats").await;
        assert_eq!(json["active_sessions"], 1);
        assert_eq!(json["total_sessions_today"], 1);
        assert_eq!(json["connections"]["total_connections"], 1);
        assert_eq!(json["connections"]["sessions"][0], "s1");
        assert!(json["uptime"].is_string());
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let state = create_test_state();
        state
            .sessions
            .create_session("a", VisitorInfo::new("Firefox", "10.0.0.1"))
            .await;
        state
            .sessions
            .create_session("b", VisitorInfo::new("Chrome", "10.0.0.2"))
            .await;
        state.sessions.end_session("b").await;
        let app = stats_router().with_state(state);

        let json = get_json(app, "/sessions").await;
        let sessions = json.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["session_id"], "a");
        assert_eq!(sessions[0]["visitor_info"]["user_agent"], "Firefox");
    }
}
