//! Client classification consumed by the interaction adapter.
//!
//! The adapter only depends on [`ClientClassifier`]; [`HeuristicClassifier`]
//! is the default, string-matching implementation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

static BOT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)bot|crawl|spider|slurp|headless|curl/|wget/|python-requests|go-http-client|httpclient|phantomjs|selenium|puppeteer|playwright",
    )
    .expect("static regex")
});

/// Coarse device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Bot,
    Unknown,
}

/// Result of user-agent parsing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedUserAgent {
    pub browser: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,
    pub os: String,
    pub device_type: DeviceType,
}

/// Fingerprint fields the bot scorer looks at
#[derive(Debug, Clone, Copy)]
pub struct FingerprintSignals<'a> {
    pub hash: &'a str,
    pub components: &'a Map<String, Value>,
    pub confidence: f64,
}

/// Bot likelihood in `[0, 1]` with the signals that contributed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotAssessment {
    pub score: f64,
    pub is_bot: bool,
    pub signals: Vec<String>,
}

/// Pure user-agent parsing and bot scoring
pub trait ClientClassifier: Send + Sync + std::fmt::Debug {
    fn parse_user_agent(&self, user_agent: &str) -> ParsedUserAgent;

    fn bot_score(
        &self,
        parsed: &ParsedUserAgent,
        user_agent: &str,
        fingerprint: &FingerprintSignals<'_>,
    ) -> BotAssessment;
}

/// Score at or above which a client is flagged as a bot
pub const BOT_THRESHOLD: f64 = 0.5;

/// Substring-based classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

/// Digits and dots following `token`, e.g. `Chrome/` -> `124.0.1`
fn version_after(user_agent: &str, token: &str) -> Option<String> {
    let start = user_agent.find(token)? + token.len();
    let version: String = user_agent[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    (!version.is_empty()).then_some(version)
}

impl ClientClassifier for HeuristicClassifier {
    fn parse_user_agent(&self, user_agent: &str) -> ParsedUserAgent {
        // Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari.
        let (browser, version) = if let Some(v) = version_after(user_agent, "Edg/") {
            ("Edge", Some(v))
        } else if let Some(v) = version_after(user_agent, "OPR/") {
            ("Opera", Some(v))
        } else if let Some(v) = version_after(user_agent, "Firefox/") {
            ("Firefox", Some(v))
        } else if let Some(v) = version_after(user_agent, "Chrome/") {
            ("Chrome", Some(v))
        } else if user_agent.contains("Safari/") {
            ("Safari", version_after(user_agent, "Version/"))
        } else {
            ("Other", None)
        };

        let os = if user_agent.contains("Windows NT") {
            "Windows"
        } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
            "iOS"
        } else if user_agent.contains("Mac OS X") {
            "macOS"
        } else if user_agent.contains("Android") {
            "Android"
        } else if user_agent.contains("CrOS") {
            "ChromeOS"
        } else if user_agent.contains("Linux") {
            "Linux"
        } else {
            "Other"
        };

        let device_type = if user_agent.trim().is_empty() {
            DeviceType::Unknown
        } else if BOT_PATTERN.is_match(user_agent) {
            DeviceType::Bot
        } else if user_agent.contains("iPad") || user_agent.contains("Tablet") {
            DeviceType::Tablet
        } else if user_agent.contains("Mobi")
            || user_agent.contains("iPhone")
            || user_agent.contains("Android")
        {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        };

        ParsedUserAgent {
            browser: browser.to_string(),
            browser_version: version,
            os: os.to_string(),
            device_type,
        }
    }

    fn bot_score(
        &self,
        parsed: &ParsedUserAgent,
        user_agent: &str,
        fingerprint: &FingerprintSignals<'_>,
    ) -> BotAssessment {
        let mut score = 0.0_f64;
        let mut signals = Vec::new();

        if parsed.device_type == DeviceType::Bot {
            score += 0.6;
            signals.push("ua_bot_pattern".to_string());
        }
        if user_agent.trim().len() < 20 {
            score += 0.2;
            signals.push("ua_too_short".to_string());
        }
        if parsed.browser == "Other" {
            score += 0.1;
            signals.push("unknown_browser".to_string());
        }
        if fingerprint.confidence < 0.3 {
            score += 0.2;
            signals.push("low_fingerprint_confidence".to_string());
        }
        if fingerprint.components.is_empty() {
            score += 0.1;
            signals.push("empty_fingerprint".to_string());
        }
        if fingerprint.components.get("webdriver") == Some(&Value::Bool(true)) {
            score += 0.4;
            signals.push("webdriver".to_string());
        }

        let score = score.min(1.0);
        BotAssessment {
            score,
            is_bot: score >= BOT_THRESHOLD,
            signals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.91 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    fn components() -> Map<String, Value> {
        json!({ "screen": "1920x1080", "timezone": "UTC" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_parse_chrome_desktop() {
        let parsed = HeuristicClassifier.parse_user_agent(CHROME_MAC);
        assert_eq!(parsed.browser, "Chrome");
        assert_eq!(parsed.browser_version.as_deref(), Some("124.0.6367.91"));
        assert_eq!(parsed.os, "macOS");
        assert_eq!(parsed.device_type, DeviceType::Desktop);
    }

    #[test]
    fn test_parse_safari_mobile() {
        let parsed = HeuristicClassifier.parse_user_agent(SAFARI_IPHONE);
        assert_eq!(parsed.browser, "Safari");
        assert_eq!(parsed.browser_version.as_deref(), Some("17.4"));
        assert_eq!(parsed.os, "iOS");
        assert_eq!(parsed.device_type, DeviceType::Mobile);
    }

    #[test]
    fn test_human_scores_low() {
        let parsed = HeuristicClassifier.parse_user_agent(CHROME_MAC);
        let components = components();
        let fp = FingerprintSignals {
            hash: "abc",
            components: &components,
            confidence: 0.9,
        };
        let assessment = HeuristicClassifier.bot_score(&parsed, CHROME_MAC, &fp);
        assert!(!assessment.is_bot);
        assert!(assessment.signals.is_empty());
    }

    #[test]
    fn test_crawler_scores_high() {
        let parsed = HeuristicClassifier.parse_user_agent(GOOGLEBOT);
        assert_eq!(parsed.device_type, DeviceType::Bot);
        let components = Map::new();
        let fp = FingerprintSignals {
            hash: "abc",
            components: &components,
            confidence: 0.1,
        };
        let assessment = HeuristicClassifier.bot_score(&parsed, GOOGLEBOT, &fp);
        assert!(assessment.is_bot);
        assert!(assessment.score <= 1.0);
        assert!(assessment.signals.contains(&"ua_bot_pattern".to_string()));
    }

    #[test]
    fn test_webdriver_flag() {
        let parsed = HeuristicClassifier.parse_user_agent(CHROME_MAC);
        let mut components = components();
        components.insert("webdriver".to_string(), json!(true));
        let fp = FingerprintSignals {
            hash: "abc",
            components: &components,
            confidence: 0.2,
        };
        let assessment = HeuristicClassifier.bot_score(&parsed, CHROME_MAC, &fp);
        assert!(assessment.is_bot);
    }
}
