//! Scheduling calendar types and data structures.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Point-in-time view of the courier's scheduling calendar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSnapshot {
    #[serde(default)]
    pub days: Vec<Day>,
}

/// One calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    #[serde(default)]
    pub status: DayStatus,
    #[serde(default)]
    pub zones_schedule: Vec<Zone>,
}

/// Day availability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayStatus {
    Available,
    Unavailable,
    #[default]
    #[serde(other)]
    Other,
}

/// Schedule of one delivery zone within a day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    #[serde(default)]
    pub slots: Vec<Slot>,
}

/// A bookable working interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    /// UTC epoch milliseconds
    pub start_time: i64,
    /// UTC epoch milliseconds
    pub end_time: i64,
    #[serde(default)]
    pub status: SlotStatus,
    #[serde(default)]
    pub tags: SlotTags,
}

/// Slot availability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Booked,
    #[default]
    #[serde(other)]
    Other,
}

/// Display tags attached to a slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotTags {
    /// Pay multiplier label, e.g. "x1.5"
    #[serde(default)]
    pub label: Option<String>,
}

impl Slot {
    pub fn start_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.start_time).single()
    }

    pub fn end_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.end_time).single()
    }

    pub fn is_available(&self) -> bool {
        self.status == SlotStatus::Available
    }

    /// Multiplier label, empty when the provider sent none.
    pub fn label(&self) -> &str {
        self.tags.label.as_deref().unwrap_or_default()
    }
}

/// Answer to a reservation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    /// A 2xx answer without this flag counts as success
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, alias = "message")]
    pub error_message: Option<String>,
}

fn default_success() -> bool {
    true
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
