//! 설정 검증 및 출력.

use anyhow::{Context, Result};
use bridge_core::Settings;

/// 설정을 검증하고 시크릿을 가린 JSON으로 렌더링합니다.
pub fn render_config(settings: &Settings) -> Result<String> {
    settings.validate().context("설정 검증 실패")?;
    serde_json::to_string_pretty(&settings.redacted()).context("설정 직렬화 실패")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_masked() {
        let settings = Settings::from_map([
            ("TELEGRAM_BOT_TOKEN", "123:secret-token"),
            ("TELEGRAM_GROUP_ID", "-100123"),
            ("SECRET_KEY", "very-secret"),
        ])
        .unwrap();

        let rendered = render_config(&settings).unwrap();
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("********"));
        assert!(rendered.contains("-100123"));
    }

    #[test]
    fn test_invalid_settings_fail() {
        let settings = Settings::from_map([
            ("TELEGRAM_BOT_TOKEN", "123:secret-token"),
            ("TELEGRAM_GROUP_ID", "not-a-number"),
        ])
        .unwrap();

        let err = render_config(&settings).unwrap_err();
        assert!(format!("{:#}", err).contains("TELEGRAM_GROUP_ID"));
    }
}
