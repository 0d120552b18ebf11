//! Judgment: one analyzer's scored analysis of a stimulus.
//!
//! A judgment is immutable once built: fields are private and only exposed
//! through accessors. Arbitration reads `priority` and `content`; `raw` is
//! kept for audit and never consulted.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::AnalyzerError;

/// Lowest valid priority.
pub const PRIORITY_MIN: i64 = 0;

/// Highest valid priority.
pub const PRIORITY_MAX: i64 = 10;

/// Keys of a model response that map onto judgment fields rather than details.
const RESERVED_KEYS: &[&str] = &["priority", "analysis", "content", "module_name", "source"];

/// Structured, scored analysis produced by one analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    source: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    priority: i64,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

impl Judgment {
    /// Build a judgment stamped with the current time.
    pub fn new(source: impl Into<String>, content: impl Into<String>, priority: i64) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            details: None,
            priority,
            timestamp: Utc::now(),
            raw: None,
        }
    }

    /// Attach structured substructure (entities, claims, ...).
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach the untransformed remote payload.
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// Override the creation timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Check the judgment is eligible for arbitration.
    pub fn validate(&self) -> Result<(), InvalidJudgment> {
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&self.priority) {
            return Err(InvalidJudgment::PriorityOutOfRange(self.priority));
        }
        if self.content.trim().is_empty() {
            return Err(InvalidJudgment::EmptyContent);
        }
        Ok(())
    }

    /// Build a judgment from a model's JSON object.
    ///
    /// The object must carry a `priority` coercible to an integer and an
    /// `analysis` (or `content`) field. Remaining keys other than the
    /// reserved ones become `details`. The priority is not range-checked
    /// here; [`Judgment::validate`] does that.
    pub fn from_response(
        source: &str,
        object: &Map<String, Value>,
        raw: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, AnalyzerError> {
        let priority = match object.get("priority") {
            Some(value) => coerce_priority(value).ok_or_else(|| {
                AnalyzerError::malformed(source, format!("priority is not an integer: {}", value))
            })?,
            None => return Err(AnalyzerError::malformed(source, "missing 'priority'")),
        };

        let content = match object.get("analysis").or_else(|| object.get("content")) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => {
                return Err(AnalyzerError::malformed(source, "missing 'analysis'"))
            }
            Some(other) => other.to_string(),
        };

        let extra: Map<String, Value> = object
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            source: source.to_string(),
            content,
            details: (!extra.is_empty()).then_some(Value::Object(extra)),
            priority,
            timestamp,
            raw,
        })
    }
}

/// Reason a judgment was discarded before arbitration.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvalidJudgment {
    #[error("priority {0} outside [0, 10]")]
    PriorityOutOfRange(i64),
    #[error("empty content")]
    EmptyContent,
}

/// Coerce a JSON priority into an integer.
///
/// Accepts integers, integral floats (`8.0`) and numeric strings (`"8"`).
pub fn coerce_priority(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

/// Per-analyzer clock yielding strictly increasing timestamps.
///
/// Wall-clock reads can repeat (coarse clocks, fast successive calls) or
/// step backwards; each tick is forced at least one microsecond past the
/// previous one.
#[derive(Debug, Default)]
pub struct JudgmentClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl JudgmentClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp for this analyzer.
    pub fn tick(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_validate_range() {
        assert!(Judgment::new("a", "x", 0).validate().is_ok());
        assert!(Judgment::new("a", "x", 10).validate().is_ok());
        assert_eq!(
            Judgment::new("a", "x", 11).validate(),
            Err(InvalidJudgment::PriorityOutOfRange(11))
        );
        assert_eq!(
            Judgment::new("a", "x", -1).validate(),
            Err(InvalidJudgment::PriorityOutOfRange(-1))
        );
    }

    #[test]
    fn test_validate_empty_content() {
        assert_eq!(
            Judgment::new("a", "   ", 5).validate(),
            Err(InvalidJudgment::EmptyContent)
        );
    }

    #[test]
    fn test_coerce_priority() {
        assert_eq!(coerce_priority(&json!(7)), Some(7));
        assert_eq!(coerce_priority(&json!(7.0)), Some(7));
        assert_eq!(coerce_priority(&json!(" 9 ")), Some(9));
        assert_eq!(coerce_priority(&json!("4.0")), Some(4));
        assert_eq!(coerce_priority(&json!(7.5)), None);
        assert_eq!(coerce_priority(&json!("high")), None);
        assert_eq!(coerce_priority(&json!(null)), None);
        assert_eq!(coerce_priority(&json!(true)), None);
    }

    #[test]
    fn test_from_response_collects_details() {
        let obj = object(json!({
            "priority": 8,
            "analysis": "The mat is under the cat.",
            "module_name": "Geometry",
            "entities": ["cat", "mat"]
        }));
        let j = Judgment::from_response("geometry", &obj, Some("{...}".into()), Utc::now()).unwrap();
        assert_eq!(j.source(), "geometry");
        assert_eq!(j.priority(), 8);
        assert_eq!(j.content(), "The mat is under the cat.");
        assert_eq!(j.details(), Some(&json!({"entities": ["cat", "mat"]})));
        assert_eq!(j.raw(), Some("{...}"));
    }

    #[test]
    fn test_from_response_keeps_out_of_range_priority() {
        let obj = object(json!({"priority": 11, "analysis": "loud"}));
        let j = Judgment::from_response("social", &obj, None, Utc::now()).unwrap();
        assert_eq!(j.priority(), 11);
        assert!(j.validate().is_err());
    }

    #[test]
    fn test_from_response_missing_fields() {
        let err = Judgment::from_response("x", &object(json!({"analysis": "a"})), None, Utc::now())
            .unwrap_err();
        assert!(err.is_malformed());

        let err = Judgment::from_response("x", &object(json!({"priority": 3})), None, Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("missing 'analysis'"));
    }

    #[test]
    fn test_from_response_structured_analysis() {
        let obj = object(json!({"priority": 2, "analysis": {"claims": ["x"]}}));
        let j = Judgment::from_response("x", &obj, None, Utc::now()).unwrap();
        assert_eq!(j.content(), r#"{"claims":["x"]}"#);
    }

    #[test]
    fn test_clock_strictly_increasing() {
        let clock = JudgmentClock::new();
        let mut previous = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > previous);
            previous = next;
        }
    }
}
