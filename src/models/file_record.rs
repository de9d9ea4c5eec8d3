use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type FileId = i64;

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    #[serde(rename = "original_filename")]
    pub filename: String,
    #[serde(default = "default_category", deserialize_with = "deserialize_category")]
    pub category: String,
    #[serde(rename = "file_size_bytes")]
    pub size_bytes: u64,
    #[serde(rename = "upload_date", deserialize_with = "deserialize_timestamp")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_summary")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
}

fn default_category() -> String {
    UNCATEGORIZED.to_string()
}

fn deserialize_category<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|label| !label.is_empty())
        .unwrap_or_else(default_category))
}

fn deserialize_summary<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default())
}

/// Accepts RFC 3339 as well as the naive ISO-8601 form the server emits for
/// `upload_date`; naive values are taken as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}
