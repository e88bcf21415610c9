//! Raw inbound events.
//!
//! A `RawEvent` is one capture from a source channel (SMS text, app
//! notification, structured app data) before any classification has run.
//! Events are transient: they are classified on arrival and never stored
//! as rows of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sms,
    Notice,
    AppData,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Notice => "notice",
            Self::AppData => "app_data",
        }
    }
}

impl TryFrom<&str> for EventKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "sms" => Ok(Self::Sms),
            "notice" => Ok(Self::Notice),
            "app_data" => Ok(Self::AppData),
            other => Err(EngineError::Parse(format!("invalid event kind: {other}"))),
        }
    }
}

/// One captured event, exactly as it arrived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    /// Package or sender identifier of the producing app.
    pub source_app: String,
    /// JSON object payload, kept verbatim for retest snapshots.
    pub payload: String,
    pub captured_at: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(
        kind: EventKind,
        source_app: impl Into<String>,
        payload: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            source_app: source_app.into(),
            payload: payload.into(),
            captured_at,
        }
    }

    /// Parses the JSON payload into addressable fields.
    ///
    /// SMS payloads must carry `sender` and `body`, notification payloads
    /// `title` and `text`. App data payloads only need to be a JSON object.
    pub fn parse_payload(&self) -> ResultEngine<Payload> {
        let value: Value = serde_json::from_str(&self.payload)
            .map_err(|err| EngineError::Parse(format!("payload is not valid JSON: {err}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| EngineError::Parse("payload must be a JSON object".to_string()))?;

        let mut fields = Vec::with_capacity(object.len());
        for (key, value) in object {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            fields.push((key.clone(), text));
        }
        let payload = Payload { fields };

        let required: &[&str] = match self.kind {
            EventKind::Sms => &["sender", "body"],
            EventKind::Notice => &["title", "text"],
            EventKind::AppData => &[],
        };
        for name in required {
            if payload.field(name).is_none() {
                return Err(EngineError::Parse(format!(
                    "{} payload missing field: {name}",
                    self.kind.as_str()
                )));
            }
        }

        Ok(payload)
    }

    /// Timestamp to record the bill under: the payload `t` field (epoch
    /// milliseconds) when present, otherwise the capture time.
    pub fn occurred_at(&self, payload: &Payload) -> DateTime<Utc> {
        payload.occurred_hint().unwrap_or(self.captured_at)
    }
}

/// Flattened view of an event payload: scalar JSON fields by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Payload {
    fields: Vec<(String, String)>,
}

impl Payload {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Event timestamp from the conventional `t` field, epoch milliseconds.
    pub fn occurred_hint(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.field("t")?.parse().ok()?;
        DateTime::from_timestamp_millis(millis)
    }
}
