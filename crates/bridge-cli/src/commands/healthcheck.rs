//! 포트 TCP 접속 점검.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;
use tracing::debug;

/// 점검 대상.
#[derive(Debug, Clone)]
pub struct HealthcheckConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

/// `host:port`에 TCP 연결을 시도합니다.
///
/// 제한 시간 안에 연결되면 `Ok`를 반환합니다.
pub async fn check_port(config: &HealthcheckConfig) -> Result<()> {
    let target = format!("{}:{}", config.host, config.port);

    let connect = tokio::time::timeout(config.timeout, TcpStream::connect(&target)).await;
    match connect {
        Ok(Ok(_stream)) => {
            debug!(%target, "포트 응답 확인");
            Ok(())
        }
        Ok(Err(e)) => Err(e).with_context(|| format!("{} 연결 실패", target)),
        Err(_) => bail!(
            "{} 연결 시간 초과 ({}초)",
            target,
            config.timeout.as_secs_f32()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> HealthcheckConfig {
        HealthcheckConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn test_listening_port_is_healthy() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(check_port(&config(port)).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_port_is_unhealthy() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = check_port(&config(port)).await.unwrap_err();
        assert!(err.to_string().contains("연결 실패"));
    }
}
