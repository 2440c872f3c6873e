//! First-party interaction events (pageviews, clicks, custom events).
//!
//! The adapter delegates user-agent parsing and bot scoring to a
//! [`ClientClassifier`] and folds both results into the blob.
//! `doubles` = `[1.0, bot_score, fingerprint_confidence]`.

use std::sync::Arc;

use beacon_core::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    has_any_key, json_record, non_empty, parse_as, AdapterKind, FormatAdapter, InvalidFormat,
    TransformContext,
};
use crate::useragent::{BotAssessment, ClientClassifier, FingerprintSignals, ParsedUserAgent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum EventType {
    Pageview,
    Click,
    Custom,
}

#[derive(Debug, Deserialize)]
struct Fingerprint {
    hash: String,
    components: Map<String, Value>,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct InteractionEvent {
    event_type: EventType,
    timestamp: u64,
    url: String,
    user_agent: String,
    fingerprint: Fingerprint,
    #[serde(default)]
    referrer: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    event_name: Option<String>,
    #[serde(default)]
    element: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

impl InteractionEvent {
    fn is_valid(&self) -> bool {
        non_empty(&self.url)
            && non_empty(&self.fingerprint.hash)
            && (0.0..=1.0).contains(&self.fingerprint.confidence)
    }
}

#[derive(Debug, Serialize)]
struct InteractionBlob<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    event_type: EventType,
    timestamp: u64,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    referrer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    element: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<&'a Map<String, Value>>,
    user_agent: &'a str,
    fingerprint_hash: &'a str,
    fingerprint_confidence: f64,
    client: ParsedUserAgent,
    bot: BotAssessment,
}

/// Adapter for first-party interaction events
#[derive(Debug, Clone)]
pub struct InteractionAdapter {
    classifier: Arc<dyn ClientClassifier>,
}

impl InteractionAdapter {
    pub fn new(classifier: Arc<dyn ClientClassifier>) -> Self {
        Self { classifier }
    }

    fn parse(payload: &Value) -> Option<InteractionEvent> {
        parse_as::<InteractionEvent>(payload).filter(InteractionEvent::is_valid)
    }
}

impl FormatAdapter for InteractionAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Interaction
    }

    fn matches(&self, payload: &Value) -> bool {
        has_any_key(payload, &["event_type"]) && has_any_key(payload, &["fingerprint"])
    }

    fn validate(&self, payload: &Value) -> bool {
        Self::parse(payload).is_some()
    }

    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat> {
        let event = Self::parse(payload).ok_or(InvalidFormat)?;

        let client = self.classifier.parse_user_agent(&event.user_agent);
        let signals = FingerprintSignals {
            hash: &event.fingerprint.hash,
            components: &event.fingerprint.components,
            confidence: event.fingerprint.confidence,
        };
        let bot = self.classifier.bot_score(&client, &event.user_agent, &signals);
        let doubles = vec![1.0, bot.score, event.fingerprint.confidence];

        let blob = InteractionBlob {
            kind: "interaction",
            event_type: event.event_type,
            timestamp: event.timestamp,
            url: &event.url,
            referrer: event.referrer.as_deref(),
            session_id: event.session_id.as_deref(),
            event_name: event.event_name.as_deref(),
            element: event.element.as_ref(),
            properties: event.properties.as_ref(),
            user_agent: &event.user_agent,
            fingerprint_hash: &event.fingerprint.hash,
            fingerprint_confidence: event.fingerprint.confidence,
            client,
            bot,
        };
        json_record(ctx, doubles, &blob)
    }
}
