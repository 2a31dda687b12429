//! # Bridge Core
//!
//! 웹사이트 방문자와 텔레그램 관리자 그룹을 잇는 브리지의 핵심 타입.
//!
//! 이 크레이트는 브리지 전반에서 사용되는 기본 요소를 제공합니다:
//! - 메시지 및 세션 도메인 모델
//! - 설정 관리 (`.env` + 환경 변수)
//! - 에러 타입과 WebSocket 종료 코드
//! - 로깅 인프라
//! - 방문자 응답 문구 등 상수

pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
