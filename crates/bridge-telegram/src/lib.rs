//! # Bridge Telegram
//!
//! 관리자 그룹과의 텔레그램 연동.
//!
//! - [`TelegramClient`]: Bot API 호출 (메시지, 음성/사진/문서 업로드, 파일 다운로드)
//! - [`TelegramBotHandler`]: 관리자 그룹 long polling 및 명령어 처리
//! - [`format`]: 방문자 메시지를 그룹 게시용 HTML로 변환
//!
//! # 봇 명령어
//!
//! - `/start`, `/help` - 소개와 사용법
//! - `/sessions` - 접속 중인 방문자
//! - `/stats` - 서버 통계
//! - `/broadcast` - 모든 방문자에게 전송

pub mod bot_handler;
pub mod client;
pub mod format;
pub mod types;

pub use bot_handler::*;
pub use client::*;
pub use types::*;
