use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::SchedulingBackend;
use crate::models::{AppointmentConfirmation, BookingRequest};

pub struct HttpSchedulingBackend {
    base_url: String,
    api_token: String,
    client: reqwest::Client,
}

impl HttpSchedulingBackend {
    pub fn new(base_url: String, api_token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if self.api_token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_token)
        }
    }
}

fn unwrap_envelope(body: Value, key: &str) -> Value {
    match body {
        Value::Object(mut map) => {
            if let Some(inner) = map.remove("data").or_else(|| map.remove(key)) {
                match inner {
                    Value::Object(_) | Value::Array(_) => inner,
                    _ => Value::Object(map),
                }
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

#[async_trait]
impl SchedulingBackend for HttpSchedulingBackend {
    async fn fetch_scheduling_settings(&self) -> anyhow::Result<Value> {
        let body: Value = self
            .request(reqwest::Method::GET, "/scheduling/settings")
            .send()
            .await
            .context("failed to call scheduling settings API")?
            .error_for_status()
            .context("scheduling settings API returned error")?
            .json()
            .await
            .context("failed to parse scheduling settings response")?;

        Ok(unwrap_envelope(body, "settings"))
    }

    async fn fetch_available_slots(
        &self,
        booking_type: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Value>> {
        let from = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let to = to.to_rfc3339_opts(SecondsFormat::Secs, true);
        let body: Value = self
            .request(reqwest::Method::GET, "/scheduling/slots")
            .query(&[("type", booking_type), ("from", from.as_str()), ("to", to.as_str())])
            .send()
            .await
            .context("failed to call available slots API")?
            .error_for_status()
            .context("available slots API returned error")?
            .json()
            .await
            .context("failed to parse available slots response")?;

        match unwrap_envelope(body, "slots") {
            Value::Array(slots) => Ok(slots),
            other => anyhow::bail!("unexpected available slots payload: {other}"),
        }
    }

    async fn confirm_booking(&self, request: &BookingRequest) -> anyhow::Result<AppointmentConfirmation> {
        let body: Value = self
            .request(reqwest::Method::POST, "/scheduling/bookings")
            .json(request)
            .send()
            .await
            .context("failed to call booking API")?
            .error_for_status()
            .context("booking API returned error")?
            .json()
            .await
            .context("failed to parse booking response")?;

        serde_json::from_value(unwrap_envelope(body, "booking"))
            .context("unexpected booking confirmation payload")
    }
}
