pub mod booking;
pub mod flow;
pub mod payload;
pub mod reply;
pub mod settings;
pub mod slot;

pub use booking::{AppointmentConfirmation, AppointmentStatus, AppointmentSummary, BookingRequest};
pub use flow::{BookingFlowState, FlowStage};
pub use payload::{BookingPayload, PayloadMode, QuickAction, QuickActionKind};
pub use reply::{AiReply, AugmentedReply};
pub use settings::{BookingMode, SchedulingSettings, TimeRange, WorkingDay, WorkingHours};
pub use slot::BookingSlot;
