use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Start and end of one remotely tracked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimes {
    pub created_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SessionTimes {
    pub fn duration(&self) -> Duration {
        self.end_time - self.created_at
    }
}

/// Response shape shared by every endpoint of the time tracking service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub data: Option<SessionData>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The subset of session data the daemon consumes. Timestamps stay raw strings so a
/// malformed value can be reported instead of failing the whole envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ApiEnvelope {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

pub fn parse_timestamp(
    field: &'static str,
    raw: Option<&str>,
) -> Result<DateTime<Utc>, TimestampError> {
    let raw = raw.ok_or(TimestampError::Missing(field))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TimestampError::Invalid {
            field,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("failed to parse {field} '{value}': {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl SessionData {
    pub fn end_time(&self) -> Result<DateTime<Utc>, TimestampError> {
        parse_timestamp("endTime", self.end_time.as_deref())
    }

    pub fn created_at(&self) -> Result<DateTime<Utc>, TimestampError> {
        parse_timestamp("createdAt", self.created_at.as_deref())
    }

    pub fn times(&self) -> Result<SessionTimes, TimestampError> {
        Ok(SessionTimes {
            created_at: self.created_at()?,
            end_time: self.end_time()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_envelope_with_offsets() {
        let env = ApiEnvelope::parse(
            r#"{"ok":true,"data":{"id":"x","createdAt":"2024-06-01T12:00:00.000Z","endTime":"2024-06-01T14:00:00+01:00","goal":"No Goal"}}"#,
        )
        .unwrap();
        assert!(env.ok);
        let times = env.data.unwrap().times().unwrap();
        assert_eq!(times.created_at, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(times.end_time, Utc.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).unwrap());
        assert_eq!(times.duration(), Duration::hours(1));
    }

    #[test]
    fn test_error_envelope() {
        let env = ApiEnvelope::parse(r#"{"ok":false,"error":"Unauthorized"}"#).unwrap();
        assert!(!env.ok);
        assert!(env.data.is_none());
        assert_eq!(env.error.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_bad_timestamp_is_reported() {
        let data = SessionData {
            end_time: Some("tomorrow".into()),
            created_at: Some("2024-06-01T12:00:00Z".into()),
        };
        let err = data.times().unwrap_err();
        assert!(matches!(err, TimestampError::Invalid { field: "endTime", .. }));

        let err = SessionData::default().times().unwrap_err();
        assert_eq!(err, TimestampError::Missing("createdAt"));
    }
}
