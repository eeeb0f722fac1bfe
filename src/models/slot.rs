use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingSlot {
    pub id: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub timezone: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub booking_type: Option<String>,
}

impl BookingSlot {
    pub fn dedup_key(&self) -> (DateTime<Utc>, Option<DateTime<Utc>>, Option<&str>, &str) {
        (
            self.start,
            self.end,
            self.booking_type.as_deref(),
            self.timezone.as_str(),
        )
    }

    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.start.format("%a, %b %-d, %H:%M UTC").to_string())
    }
}
