//! 관리자 그룹에 게시할 메시지 포맷.

use bridge_core::{Message, MessageType, VisitorInfo};

/// 텔레그램 메시지 최대 길이.
pub const MAX_MESSAGE_LEN: usize = 4096;
/// 캡션 최대 길이.
pub const MAX_CAPTION_LEN: usize = 1024;

/// HTML 파싱 모드용 이스케이프.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// 세션 ID 앞 8자 + "...".
pub fn short_session(session_id: &str) -> String {
    let short: String = session_id.chars().take(8).collect();
    format!("{}...", short)
}

/// 글자 수 기준으로 자릅니다.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn footer(message: &Message) -> String {
    format!(
        "<b>Session:</b> <code>{}</code>\n<b>Time:</b> {}",
        escape_html(&short_session(&message.session_id)),
        message.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// 방문자 메시지를 관리자 그룹용 텍스트로 변환합니다.
pub fn format_visitor_message(message: &Message) -> String {
    // 푸터와 태그 여유분을 남기고 본문을 자름
    let content = escape_html(&truncate_chars(&message.content, MAX_MESSAGE_LEN - 256));

    match message.message_type {
        MessageType::Voice => format!("🎤 <b>Visitor Voice Message</b>\n\n{}", footer(message)),
        MessageType::Image => format!("🖼️ <b>Visitor Image</b>\n\n{}", footer(message)),
        MessageType::File => format!(
            "📎 <b>Visitor File</b>\n\n<code>{}</code>\n\n{}",
            content,
            footer(message)
        ),
        _ => format!(
            "👤 <b>Visitor Message</b>\n\n<code>{}</code>\n\n{}",
            content,
            footer(message)
        ),
    }
}

/// 첨부 파일 전송 시 사용할 캡션.
pub fn format_media_caption(message: &Message) -> String {
    let heading = match message.message_type {
        MessageType::Voice => "🎤 <b>Visitor Voice Message</b>",
        MessageType::Image => "🖼️ <b>Visitor Image</b>",
        _ => "📎 <b>Visitor File</b>",
    };

    let caption = format!("{}\n\n{}", heading, footer(message));
    if caption.chars().count() > MAX_CAPTION_LEN {
        truncate_chars(&caption, MAX_CAPTION_LEN)
    } else {
        caption
    }
}

/// 새 방문자 접속 알림.
pub fn format_visitor_joined(session_id: &str, visitor: &VisitorInfo) -> String {
    let mut text = format!(
        "🟢 <b>New visitor connected</b>\n\n<b>Session:</b> <code>{}</code>",
        escape_html(&short_session(session_id))
    );
    if !visitor.user_agent.is_empty() {
        text.push_str(&format!(
            "\n<b>Browser:</b> {}",
            escape_html(&truncate_chars(&visitor.user_agent, 60))
        ));
    }
    if !visitor.ip_address.is_empty() {
        text.push_str(&format!("\n<b>IP:</b> {}", escape_html(&visitor.ip_address)));
    }
    text
}
