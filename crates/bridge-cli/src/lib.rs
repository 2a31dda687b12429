//! 브리지 운영용 CLI 도구 모음.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 컨테이너 HEALTHCHECK용 TCP 점검
//! - 시크릿을 가린 설정 출력
//! - 관리자 그룹 테스트 메시지 전송

pub mod commands;
