//! Reply texts for the registration dialogue and fortune-request parsing.

use super::model::ProfileField;

/// Leading tag that turns a message into a fortune request.
pub const FORTUNE_MARKER: &str = "占い";

/// Topic used when the request carries no text after the marker.
pub const DEFAULT_TOPIC: &str = "総合運";

/// Sent once the fourth field is stored.
pub const COMPLETION_NOTICE: &str = "ご登録ありがとうございます！プロフィールの登録が完了しました。\n\
「占い 恋愛運」のように、「占い」に続けて知りたいテーマを送ってください。";

/// Sent to registered users whose message is not a fortune request.
pub const USAGE_GUIDANCE: &str = "占いをご希望の場合は「占い」に続けてテーマを送ってください。\n\
例: 「占い 仕事運」「占い 恋愛運」「占い」（総合運）";

/// Question asking for `field`.
pub fn field_prompt(field: ProfileField) -> &'static str {
    match field {
        ProfileField::BirthDate => "生年月日を「YYYY-MM-DD」の形式で教えてください（例: 1990-01-23）",
        ProfileField::BirthTime => "出生時刻を「HH:MM」の形式で教えてください（例: 14:30）",
        ProfileField::BirthPlace => "出生地（都道府県や市区町村）を教えてください",
        ProfileField::FullName => "最後に、お名前（フルネーム）を教えてください",
    }
}

/// First reply to a brand new user.
pub fn welcome_prompt() -> String {
    format!(
        "はじめまして！占いBotです。\nあなたに合わせた占いのために、いくつか質問させてください。\n\n{}",
        field_prompt(ProfileField::BirthDate)
    )
}

/// Reply after `stored` was accepted, asking for whatever is still missing.
pub fn accepted_prompt(stored: ProfileField, next: Option<ProfileField>) -> String {
    match next {
        Some(next) => format!("{}を登録しました。\n\n{}", stored.label(), field_prompt(next)),
        None => COMPLETION_NOTICE.to_string(),
    }
}

/// If `text` starts with [`FORTUNE_MARKER`], return the requested topic.
pub fn parse_fortune_request(text: &str) -> Option<String> {
    let rest = text.trim().strip_prefix(FORTUNE_MARKER)?;
    let topic = rest
        .trim_start_matches(|c: char| c == ':' || c == '：' || c.is_whitespace())
        .trim();
    if topic.is_empty() {
        Some(DEFAULT_TOPIC.to_string())
    } else {
        Some(topic.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_has_a_prompt() {
        let prompts: std::collections::HashSet<&str> =
            ProfileField::ORDER.into_iter().map(field_prompt).collect();
        assert_eq!(prompts.len(), ProfileField::ORDER.len());
        assert!(field_prompt(ProfileField::BirthPlace).contains("出生地"));
        assert!(field_prompt(ProfileField::FullName).contains("お名前"));
    }

    #[test]
    fn welcome_asks_for_date() {
        assert!(welcome_prompt().contains("YYYY-MM-DD"));
    }

    #[test]
    fn accepted_prompt_asks_next_or_completes() {
        let reply = accepted_prompt(ProfileField::BirthDate, Some(ProfileField::BirthTime));
        assert!(reply.contains("生年月日を登録しました"));
        assert!(reply.contains("HH:MM"));
        assert_eq!(accepted_prompt(ProfileField::FullName, None), COMPLETION_NOTICE);
    }

    #[test]
    fn parse_fortune_variants() {
        assert_eq!(parse_fortune_request("占い 恋愛運").as_deref(), Some("恋愛運"));
        assert_eq!(parse_fortune_request("占い：仕事運").as_deref(), Some("仕事運"));
        assert_eq!(parse_fortune_request("占い:金運").as_deref(), Some("金運"));
        assert_eq!(parse_fortune_request("  占い　健康運 ").as_deref(), Some("健康運"));
        assert_eq!(parse_fortune_request("占い").as_deref(), Some(DEFAULT_TOPIC));
        assert_eq!(parse_fortune_request("占い   ").as_deref(), Some(DEFAULT_TOPIC));
    }

    #[test]
    fn non_fortune_messages() {
        assert!(parse_fortune_request("こんにちは").is_none());
        assert!(parse_fortune_request("今日の占い").is_none());
        assert!(parse_fortune_request("").is_none());
    }
}
