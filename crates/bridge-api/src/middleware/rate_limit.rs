//! Rate limiting.
//!
//! Token Bucket 알고리즘 기반 rate limiting을 제공합니다.
//! HTTP 요청은 클라이언트 IP별로, WebSocket 메시지는 세션 ID별로 제한합니다.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use std::collections::HashMap;
use std::hash::Hash;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ApiErrorResponse;

/// Rate Limiter 설정.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 분당 최대 요청 수
    pub requests_per_minute: u32,
    /// 버스트 허용량 (순간적으로 허용되는 추가 요청)
    pub burst_size: u32,
    /// 버킷 정리 간격
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 1000,
            burst_size: 100,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// 새 설정 생성 (10% 버스트).
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size: requests_per_minute / 10,
            ..Default::default()
        }
    }

    /// 엄격한 설정 (버스트 없음).
    pub fn strict(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size: 0,
            ..Default::default()
        }
    }
}

/// Token Bucket 구조체.
#[derive(Debug)]
struct TokenBucket {
    /// 현재 토큰 수
    tokens: f64,
    /// 마지막 리필 시간
    last_refill: Instant,
    /// 최대 토큰 수 (버킷 용량)
    max_tokens: f64,
    /// 초당 리필되는 토큰 수
    refill_rate: f64,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let refill_rate = f64::from(config.requests_per_minute) / 60.0;
        // 분당 한도가 60 미만이어도 최소 한 번은 허용
        let max_tokens = (refill_rate + f64::from(config.burst_size)).max(1.0);

        Self {
            tokens: max_tokens,
            last_refill: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// 토큰 소비 시도.
    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// 다음 토큰까지 대기 시간 (초).
    fn time_until_next_token(&self) -> f64 {
        if self.tokens >= 1.0 {
            0.0
        } else if self.refill_rate <= 0.0 {
            60.0
        } else {
            (1.0 - self.tokens) / self.refill_rate
        }
    }
}

/// Rate Limit 확인 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// 요청 허용됨
    Allowed,
    /// Rate limit 초과
    Limited {
        /// 재시도까지 대기 시간 (초)
        retry_after: u64,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// Rate Limiter.
///
/// 키(IP 주소, 세션 ID 등)별로 버킷을 유지합니다.
pub struct RateLimiter<K = IpAddr> {
    config: RateLimitConfig,
    buckets: Arc<RwLock<HashMap<K, TokenBucket>>>,
}

impl<K> Clone for RateLimiter<K> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            buckets: Arc::clone(&self.buckets),
        }
    }
}

impl<K> RateLimiter<K>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    /// 새 Rate Limiter 생성.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 요청 허용 여부 확인.
    pub async fn check(&self, key: K) -> RateLimitResult {
        let mut buckets = self.buckets.write().await;

        let bucket = buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(&self.config));

        if bucket.try_acquire() {
            RateLimitResult::Allowed
        } else {
            let retry_after = bucket.time_until_next_token().ceil() as u64;
            RateLimitResult::Limited {
                retry_after: retry_after.max(1),
            }
        }
    }

    /// 키의 버킷을 제거합니다 (연결 종료 시).
    pub async fn remove<Q>(&self, key: &Q)
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.buckets.write().await.remove(key);
    }

    /// 오래 사용되지 않은 버킷 정리.
    pub async fn cleanup(&self) -> usize {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        let now = Instant::now();
        let idle = self.config.cleanup_interval;

        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) <= idle);
        before - buckets.len()
    }

    /// 현재 추적 중인 키 수.
    pub async fn tracked_keys(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// 주기적으로 버킷을 정리하는 백그라운드 태스크를 시작합니다.
    pub fn spawn_cleanup(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        let period = limiter.config.cleanup_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // 첫 tick은 즉시 발생
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = limiter.cleanup().await;
                        if removed > 0 {
                            debug!(removed, "rate limit 버킷 정리");
                        }
                    }
                }
            }
        })
    }
}

/// Rate Limit 미들웨어 상태.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: RateLimiter<IpAddr>,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config),
        }
    }

    pub fn limiter(&self) -> &RateLimiter<IpAddr> {
        &self.limiter
    }
}

/// Rate Limiting 미들웨어 함수.
///
/// 클라이언트 IP별로 Rate Limiting을 적용합니다.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = extract_client_ip(request.headers(), peer);

    match state.limiter.check(ip).await {
        RateLimitResult::Allowed => {
            counter!("rate_limit_requests_total", "status" => "allowed").increment(1);
            next.run(request).await
        }
        RateLimitResult::Limited { retry_after } => {
            counter!("rate_limit_requests_total", "status" => "limited").increment(1);

            warn!(client_ip = %ip, retry_after, "Rate limit exceeded");

            let body = ApiErrorResponse::with_details(
                "RATE_LIMITED",
                "Rate limit exceeded. Please try again later.",
                serde_json::json!({ "retry_after": retry_after }),
            );
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));

            response
        }
    }
}

/// 요청에서 클라이언트 IP 추출.
///
/// 프록시 뒤에 있을 경우를 위해 X-Forwarded-For, X-Real-IP 헤더를 우선 확인하고,
/// 없으면 연결 주소, 그것도 없으면 루프백 주소를 사용합니다.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok());
    if let Some(ip) = real_ip {
        return ip;
    }

    peer.map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
