use serde::{Deserialize, Deserializer, Serializer, de};
use std::time::Duration;

/// Custom deserializer for Duration from milliseconds
pub fn deserialize_duration_from_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}

/// Custom deserializer for Duration from seconds
pub fn deserialize_duration_from_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

/// Custom serializer for Duration to milliseconds
pub fn serialize_duration_to_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Custom serializer for Duration to seconds
pub fn serialize_duration_to_seconds<S>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

/// Deserializes a chat identifier that may be written either as a number
/// (`-1001234567890`) or as a string (`"@alerts_channel"`). Empty strings are
/// treated as absent so that an unset environment variable does not count as
/// a configured destination.
pub fn deserialize_chat_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawChatId {
        Number(i64),
        Text(String),
    }

    match Option::<RawChatId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawChatId::Number(n)) => Ok(Some(n.to_string())),
        Some(RawChatId::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else if trimmed.chars().any(char::is_whitespace) {
                Err(de::Error::custom(format!("invalid chat id: '{trimmed}'")))
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
    }
}
