use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::BookingSlot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    PendingConfirmation,
    Confirmed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::PendingConfirmation => "pending_confirmation",
            AppointmentStatus::Confirmed => "confirmed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub conversation_key: String,
    pub booking_type: String,
    pub slot: BookingSlot,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentConfirmation {
    #[serde(
        default,
        alias = "id",
        alias = "booking_id",
        alias = "bookingId",
        deserialize_with = "string_or_number"
    )]
    pub reference: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentSummary {
    pub status: AppointmentStatus,
    pub booking_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<BookingSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference(body: Value) -> Option<String> {
        serde_json::from_value::<AppointmentConfirmation>(body)
            .unwrap()
            .reference
    }

    #[test]
    fn test_reference_accepts_strings_and_numbers() {
        assert_eq!(reference(json!({"reference": "APT-7"})).as_deref(), Some("APT-7"));
        assert_eq!(reference(json!({"id": 981})).as_deref(), Some("981"));
        assert_eq!(reference(json!({"bookingId": "b-1"})).as_deref(), Some("b-1"));
    }

    #[test]
    fn test_missing_or_blank_reference_is_none() {
        assert_eq!(reference(json!({"status": "ok"})), None);
        assert_eq!(reference(json!({"id": null})), None);
        assert_eq!(reference(json!({"id": ""})), None);
    }
}
