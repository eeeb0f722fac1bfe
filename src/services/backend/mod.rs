pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{AppointmentConfirmation, BookingRequest};

#[async_trait]
pub trait SchedulingBackend: Send + Sync {
    async fn fetch_scheduling_settings(&self) -> anyhow::Result<Value>;

    async fn fetch_available_slots(
        &self,
        booking_type: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Value>>;

    async fn confirm_booking(&self, request: &BookingRequest) -> anyhow::Result<AppointmentConfirmation>;
}
