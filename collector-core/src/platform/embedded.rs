use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{CollectError, CollectResult};
use crate::locator::cached_regex;

static STATE_BEFORE_SCRIPT_END: OnceLock<Regex> = OnceLock::new();
static STATE_BEFORE_SEMICOLON: OnceLock<Regex> = OnceLock::new();
static JS_ONLY_LITERAL: OnceLock<Regex> = OnceLock::new();

/// Extracts `window.__INITIAL_STATE__` from a server-rendered page. The
/// JavaScript-only literals the page embeds are rewritten to `null` first.
pub fn parse_initial_state(html: &str) -> CollectResult<Value> {
    let captured = cached_regex(
        &STATE_BEFORE_SCRIPT_END,
        r"(?s)window\.__INITIAL_STATE__\s*=\s*(\{.+\})\s*</script>",
    )
    .captures(html)
    .or_else(|| {
        cached_regex(
            &STATE_BEFORE_SEMICOLON,
            r"(?s)window\.__INITIAL_STATE__\s*=\s*(\{.*?\});",
        )
        .captures(html)
    })
    .and_then(|caps| caps.get(1))
    .ok_or_else(|| {
        CollectError::UpstreamFormatChanged(
            "page has no __INITIAL_STATE__, the cookie may have expired".to_string(),
        )
    })?;

    let json = cached_regex(&JS_ONLY_LITERAL, r"\b(?:undefined|NaN|Infinity)\b")
        .replace_all(captured.as_str(), "null");
    serde_json::from_str(&json).map_err(|err| {
        CollectError::UpstreamFormatChanged(format!("__INITIAL_STATE__ is not JSON: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_before_script_end() {
        let html = r#"<html><script>window.__INITIAL_STATE__={"user":{"loggedIn":undefined,"score":NaN},"ok":true}</script></html>"#;
        let state = parse_initial_state(html).unwrap();
        assert!(state["user"]["loggedIn"].is_null());
        assert!(state["user"]["score"].is_null());
        assert_eq!(state["ok"], true);
    }

    #[test]
    fn parses_state_terminated_by_semicolon() {
        let html = "<script>window.__INITIAL_STATE__ = {\"search\":{\"feeds\":[]}};var x=1;";
        let state = parse_initial_state(html).unwrap();
        assert!(state["search"]["feeds"].is_array());
    }

    #[test]
    fn missing_or_broken_state_is_a_format_change() {
        assert!(matches!(
            parse_initial_state("<html>login</html>"),
            Err(CollectError::UpstreamFormatChanged(_))
        ));
        assert!(matches!(
            parse_initial_state("<script>window.__INITIAL_STATE__={broken}</script>"),
            Err(CollectError::UpstreamFormatChanged(_))
        ));
    }
}
