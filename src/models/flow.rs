use serde::{Deserialize, Serialize};

use crate::models::{BookingSlot, SchedulingSettings};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    #[default]
    Idle,
    AwaitingBookingConfirmation,
    AwaitingName,
    AwaitingPhone,
    AwaitingSlotChoice,
    AwaitingCustomTime,
    Completed,
    Declined,
}

impl FlowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStage::Idle => "idle",
            FlowStage::AwaitingBookingConfirmation => "awaiting_booking_confirmation",
            FlowStage::AwaitingName => "awaiting_name",
            FlowStage::AwaitingPhone => "awaiting_phone",
            FlowStage::AwaitingSlotChoice => "awaiting_slot_choice",
            FlowStage::AwaitingCustomTime => "awaiting_custom_time",
            FlowStage::Completed => "completed",
            FlowStage::Declined => "declined",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingFlowState {
    pub active: bool,
    pub stage: FlowStage,
    pub required_name: bool,
    pub required_phone: bool,
    pub name_collected: bool,
    pub phone_collected: bool,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub requested_type: String,
    pub selected_slot: Option<BookingSlot>,
    pub proposed_custom_time: Option<String>,
    pub last_offered_slots: Vec<BookingSlot>,
    pub completed: bool,
    pub offer_shown: bool,
}

impl BookingFlowState {
    pub fn start(settings: &SchedulingSettings, requested_type: String) -> Self {
        Self {
            active: true,
            stage: FlowStage::Idle,
            required_name: settings.require_name,
            required_phone: settings.require_phone,
            requested_type,
            ..Default::default()
        }
    }

    pub fn is_settled(&self) -> bool {
        self.completed || self.stage == FlowStage::Declined
    }

    pub fn needs_name(&self) -> bool {
        self.required_name && !self.name_collected
    }

    pub fn needs_phone(&self) -> bool {
        self.required_phone && !self.phone_collected
    }

    pub fn finish(&mut self, stage: FlowStage) {
        self.stage = stage;
        self.active = false;
        self.completed = stage == FlowStage::Completed;
    }
}
