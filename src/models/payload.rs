use serde::{Deserialize, Serialize};

use crate::models::{AppointmentSummary, BookingSlot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    Offer,
    Slots,
    CollectTime,
    Confirm,
    Confirmed,
    AwaitingName,
    AwaitingPhone,
    Declined,
    NotAvailable,
}

impl PayloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadMode::Offer => "offer",
            PayloadMode::Slots => "slots",
            PayloadMode::CollectTime => "collect_time",
            PayloadMode::Confirm => "confirm",
            PayloadMode::Confirmed => "confirmed",
            PayloadMode::AwaitingName => "awaiting_name",
            PayloadMode::AwaitingPhone => "awaiting_phone",
            PayloadMode::Declined => "declined",
            PayloadMode::NotAvailable => "not_available",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuickActionKind {
    ShowSlots,
    ProposeTime,
    Confirm,
    NotNow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuickAction {
    pub id: QuickActionKind,
    pub label: String,
    pub message: String,
}

impl QuickAction {
    pub fn new(kind: QuickActionKind) -> Self {
        let (label, message) = match kind {
            QuickActionKind::ShowSlots => ("Show available slots", "Show available slots"),
            QuickActionKind::ProposeTime => ("Propose a time", "I'd like to propose a time"),
            QuickActionKind::Confirm => ("Yes, book it", "Yes, book it"),
            QuickActionKind::NotNow => ("Not now", "Not now"),
        };
        Self {
            id: kind,
            label: label.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingPayload {
    pub mode: PayloadMode,
    #[serde(rename = "type")]
    pub booking_type: String,
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<BookingSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_slot: Option<BookingSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<AppointmentSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<QuickAction>,
}

impl BookingPayload {
    pub fn new(mode: PayloadMode, booking_type: &str, timezone: &str) -> Self {
        Self {
            mode,
            booking_type: booking_type.to_string(),
            timezone: timezone.to_string(),
            slots: Vec::new(),
            selected_slot: None,
            appointment: None,
            actions: Vec::new(),
        }
    }

    pub fn with_slots(mut self, slots: Vec<BookingSlot>) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_selected(mut self, slot: BookingSlot) -> Self {
        self.selected_slot = Some(slot);
        self
    }

    pub fn with_appointment(mut self, appointment: AppointmentSummary) -> Self {
        self.appointment = Some(appointment);
        self
    }

    pub fn with_actions(mut self, kinds: &[QuickActionKind]) -> Self {
        self.actions = kinds.iter().copied().map(QuickAction::new).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_omits_empty_fields() {
        let payload = BookingPayload::new(PayloadMode::Declined, "call", "UTC");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["mode"], "declined");
        assert!(json.get("slots").is_none());
        assert!(json.get("actions").is_none());
        assert!(json.get("appointment").is_none());
    }

    #[test]
    fn test_quick_actions_carry_reentry_message() {
        let payload = BookingPayload::new(PayloadMode::Offer, "call", "UTC")
            .with_actions(&[QuickActionKind::ShowSlots, QuickActionKind::NotNow]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["actions"][0]["id"], "show_slots");
        assert_eq!(json["actions"][0]["message"], "Show available slots");
        assert_eq!(json["actions"][1]["id"], "not_now");
    }

    #[test]
    fn test_mode_as_str_matches_serde() {
        for mode in [
            PayloadMode::Offer,
            PayloadMode::CollectTime,
            PayloadMode::NotAvailable,
            PayloadMode::AwaitingPhone,
        ] {
            let json = serde_json::to_value(mode).unwrap();
            assert_eq!(json, mode.as_str());
        }
    }
}
