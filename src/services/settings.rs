use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::models::settings::{parse_end_hhmm, parse_hhmm, DAY_NAMES};
use crate::models::{BookingMode, SchedulingSettings, TimeRange, WorkingDay, WorkingHours};
use crate::services::backend::SchedulingBackend;

const NESTED_KEYS: [&str; 2] = ["chatbot_booking", "chatbotBooking"];

const ENABLED: &[&str] = &["enabled", "is_enabled", "isEnabled", "scheduling_enabled", "schedulingEnabled"];
const OFFER_BOOKING: &[&str] = &["chatbot_offer_booking", "chatbotOfferBooking", "offer_booking", "offerBooking"];
const ASK_AFTER_QUOTE: &[&str] = &["ask_after_quote", "askAfterQuote"];
const REQUIRE_NAME: &[&str] = &["require_name", "requireName"];
const REQUIRE_PHONE: &[&str] = &["require_phone", "requirePhone"];
const REQUIRED_FIELDS: &[&str] = &["required_fields", "requiredFields"];
const BOOKING_MODE: &[&str] = &["booking_mode", "bookingMode", "mode"];
const BOOKING_TYPE: &[&str] = &["default_booking_type", "defaultBookingType", "booking_type", "bookingType"];
const SHOW_SLOTS: &[&str] = &["show_available_slots", "showAvailableSlots", "show_slots", "showSlots"];
const CUSTOM_TIME: &[&str] = &["allow_custom_time", "allowCustomTime"];
const TIMEZONE: &[&str] = &["timezone", "time_zone", "timeZone", "tz"];
const SLOT_DURATION: &[&str] = &["slot_duration_minutes", "slotDurationMinutes", "slot_duration", "slotDuration"];
const MIN_NOTICE: &[&str] = &["minimum_notice_hours", "minimumNoticeHours", "min_notice_hours", "minNoticeHours"];
const MAX_DAYS: &[&str] = &["max_days_ahead", "maxDaysAhead", "booking_window_days", "bookingWindowDays"];
const WORKING_HOURS: &[&str] = &["working_hours", "workingHours", "availability", "business_hours", "businessHours"];

const DAY_KEYS: &[&str] = &["day", "name", "weekday", "day_of_week", "dayOfWeek"];
const DAY_ENABLED: &[&str] = &["enabled", "is_enabled", "isEnabled", "active", "open", "is_open", "isOpen"];
const DAY_RANGES: &[&str] = &["ranges", "slots", "hours", "intervals", "times"];
const RANGE_START: &[&str] = &["start", "from", "open", "start_time", "startTime"];
const RANGE_END: &[&str] = &["end", "to", "close", "end_time", "endTime"];

struct RawSettings<'a> {
    scopes: Vec<&'a Map<String, Value>>,
}

impl<'a> RawSettings<'a> {
    fn new(raw: &'a Value) -> Self {
        let mut scopes = Vec::new();
        if let Some(root) = raw.as_object() {
            scopes.extend(
                NESTED_KEYS
                    .iter()
                    .filter_map(|k| root.get(*k).and_then(Value::as_object)),
            );
            scopes.push(root);
        }
        Self { scopes }
    }

    fn value(&self, keys: &[&str]) -> Option<&'a Value> {
        self.scopes
            .iter()
            .copied()
            .find_map(|scope| keys.iter().find_map(|k| scope.get(*k).filter(|v| !v.is_null())))
    }

    fn flag(&self, keys: &[&str]) -> Option<bool> {
        self.value(keys).and_then(coerce_bool)
    }

    fn int(&self, keys: &[&str]) -> Option<i64> {
        self.value(keys).and_then(coerce_int)
    }

    fn text(&self, keys: &[&str]) -> Option<&'a str> {
        self.value(keys)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub fn normalize(raw: &Value) -> SchedulingSettings {
    let defaults = SchedulingSettings::default();
    let raw = RawSettings::new(raw);

    let required_fields: Vec<String> = raw
        .value(REQUIRED_FIELDS)
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(|f| f.trim().to_lowercase())
                .collect()
        })
        .unwrap_or_default();
    let field_required = |name: &str| required_fields.iter().any(|f| f == name);

    SchedulingSettings {
        enabled: raw.flag(ENABLED).unwrap_or(defaults.enabled),
        chatbot_offer_booking: raw.flag(OFFER_BOOKING).unwrap_or(defaults.chatbot_offer_booking),
        ask_after_quote: raw.flag(ASK_AFTER_QUOTE).unwrap_or(defaults.ask_after_quote),
        require_name: raw
            .flag(REQUIRE_NAME)
            .unwrap_or_else(|| field_required("name") || defaults.require_name),
        require_phone: raw
            .flag(REQUIRE_PHONE)
            .unwrap_or_else(|| field_required("phone") || defaults.require_phone),
        booking_mode: raw
            .text(BOOKING_MODE)
            .and_then(BookingMode::parse)
            .unwrap_or(defaults.booking_mode),
        default_booking_type: raw
            .text(BOOKING_TYPE)
            .map(str::to_lowercase)
            .unwrap_or(defaults.default_booking_type),
        show_available_slots: raw.flag(SHOW_SLOTS).unwrap_or(defaults.show_available_slots),
        allow_custom_time: raw.flag(CUSTOM_TIME).unwrap_or(defaults.allow_custom_time),
        timezone: raw
            .text(TIMEZONE)
            .filter(|tz| tz.parse::<Tz>().is_ok())
            .map(str::to_string)
            .unwrap_or(defaults.timezone),
        slot_duration_minutes: positive(raw.int(SLOT_DURATION), 24 * 60)
            .unwrap_or(defaults.slot_duration_minutes),
        minimum_notice_hours: raw
            .int(MIN_NOTICE)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(defaults.minimum_notice_hours),
        max_days_ahead: positive(raw.int(MAX_DAYS), 366).unwrap_or(defaults.max_days_ahead),
        working_hours: raw
            .value(WORKING_HOURS)
            .map(normalize_working_hours)
            .unwrap_or_default(),
    }
}

fn positive(value: Option<i64>, max: i64) -> Option<u32> {
    value
        .filter(|n| *n > 0 && *n <= max)
        .and_then(|n| u32::try_from(n).ok())
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" | "enabled" => Some(true),
            "false" | "no" | "0" | "off" | "disabled" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn day_index(name: &str) -> Option<usize> {
    let name = name.trim().to_lowercase();
    if name.len() < 3 {
        return None;
    }
    DAY_NAMES
        .iter()
        .position(|d| *d == name || (name.len() == 3 && d.starts_with(name.as_str())))
}

pub fn normalize_working_hours(raw: &Value) -> WorkingHours {
    let mut hours = WorkingHours::default();

    let entries: Vec<(usize, &Value)> = match raw {
        Value::Array(days) => days
            .iter()
            .filter_map(|record| {
                let name = DAY_KEYS
                    .iter()
                    .find_map(|k| record.get(*k).and_then(Value::as_str))?;
                Some((day_index(name)?, record))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, record)| Some((day_index(name)?, record)))
            .collect(),
        _ => Vec::new(),
    };

    for (index, record) in entries {
        hours.0[index] = normalize_day(DAY_NAMES[index], record);
    }
    hours
}

fn normalize_day(day: &str, record: &Value) -> WorkingDay {
    let ranges: Vec<TimeRange> = match record {
        Value::Array(ranges) => ranges.iter().filter_map(normalize_range).collect(),
        Value::Object(map) => match DAY_RANGES.iter().find_map(|k| map.get(*k)) {
            Some(Value::Array(ranges)) => ranges.iter().filter_map(normalize_range).collect(),
            Some(single @ Value::Object(_)) => normalize_range(single).into_iter().collect(),
            _ => normalize_range(record).into_iter().collect(),
        },
        _ => Vec::new(),
    };

    let enabled = record
        .as_object()
        .and_then(|map| DAY_ENABLED.iter().find_map(|k| map.get(*k)))
        .and_then(coerce_bool)
        .unwrap_or(!ranges.is_empty());

    WorkingDay {
        day: day.to_string(),
        enabled,
        ranges,
    }
}

fn normalize_range(raw: &Value) -> Option<TimeRange> {
    let field = |keys: &[&str]| keys.iter().find_map(|k| raw.get(*k).and_then(Value::as_str));
    let range = TimeRange {
        start: field(RANGE_START).and_then(parse_hhmm)?,
        end: field(RANGE_END).and_then(parse_end_hhmm)?,
    };
    range.is_valid().then_some(range)
}

struct CachedSettings {
    fetched_at: Instant,
    settings: Arc<SchedulingSettings>,
}

pub struct SettingsCache {
    ttl: Duration,
    cached: Mutex<Option<CachedSettings>>,
}

impl SettingsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    fn fresh(&self) -> Option<Arc<SchedulingSettings>> {
        let cached = self.cached.lock().unwrap();
        cached
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| Arc::clone(&c.settings))
    }

    fn stale(&self) -> Option<Arc<SchedulingSettings>> {
        let cached = self.cached.lock().unwrap();
        cached.as_ref().map(|c| Arc::clone(&c.settings))
    }

    // Fetch errors reuse a stale value if there is one, otherwise defaults
    // (which are not cached, so the next turn retries).
    pub async fn get(&self, backend: &dyn SchedulingBackend) -> Arc<SchedulingSettings> {
        if let Some(settings) = self.fresh() {
            return settings;
        }

        match backend.fetch_scheduling_settings().await {
            Ok(raw) => {
                let settings = Arc::new(normalize(&raw));
                tracing::debug!(
                    enabled = settings.enabled,
                    offer_booking = settings.chatbot_offer_booking,
                    timezone = %settings.timezone,
                    "scheduling settings refreshed"
                );
                *self.cached.lock().unwrap() = Some(CachedSettings {
                    fetched_at: Instant::now(),
                    settings: Arc::clone(&settings),
                });
                settings
            }
            Err(e) => match self.stale() {
                Some(settings) => {
                    tracing::warn!(error = %e, "settings fetch failed, reusing cached settings");
                    settings
                }
                None => {
                    tracing::warn!(error = %e, "settings fetch failed, using defaults");
                    Arc::new(SchedulingSettings::default())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentConfirmation, BookingRequest};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_null_and_garbage_yield_defaults() {
        for raw in [json!(null), json!(42), json!("settings"), json!([1, 2, 3]), json!({})] {
            assert_eq!(normalize(&raw), SchedulingSettings::default(), "{raw}");
        }
    }

    #[test]
    fn test_snake_and_camel_case_keys() {
        let snake = normalize(&json!({
            "enabled": true,
            "chatbot_offer_booking": true,
            "slot_duration_minutes": 45,
            "booking_mode": "direct_booking",
        }));
        let camel = normalize(&json!({
            "enabled": true,
            "chatbotOfferBooking": true,
            "slotDurationMinutes": 45,
            "bookingMode": "direct_booking",
        }));
        assert_eq!(snake, camel);
        assert!(snake.chatbot_offer_booking);
        assert_eq!(snake.slot_duration_minutes, 45);
        assert_eq!(snake.booking_mode, BookingMode::DirectBooking);
    }

    #[test]
    fn test_nested_object_takes_precedence_over_root() {
        let settings = normalize(&json!({
            "enabled": true,
            "timezone": "Europe/Berlin",
            "chatbot_booking": {
                "chatbotOfferBooking": true,
                "timezone": "America/New_York",
                "requireName": "yes",
            }
        }));
        assert!(settings.enabled);
        assert!(settings.chatbot_offer_booking);
        assert!(settings.require_name);
        assert_eq!(settings.timezone, "America/New_York");
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let settings = normalize(&json!({
            "timezone": "Mars/Olympus",
            "slotDurationMinutes": 0,
            "minimumNoticeHours": -3,
            "maxDaysAhead": "soon",
            "bookingMode": "teleport",
            "enabled": "maybe",
        }));
        assert_eq!(settings.timezone, "UTC");
        assert_eq!(settings.slot_duration_minutes, 30);
        assert_eq!(settings.minimum_notice_hours, 1);
        assert_eq!(settings.max_days_ahead, 30);
        assert_eq!(settings.booking_mode, BookingMode::ManualRequest);
        assert!(!settings.enabled);
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let settings = normalize(&json!({"slot_duration_minutes": "60", "minimum_notice_hours": "0"}));
        assert_eq!(settings.slot_duration_minutes, 60);
        assert_eq!(settings.minimum_notice_hours, 0);
    }

    #[test]
    fn test_required_fields_array() {
        let settings = normalize(&json!({"required_fields": ["Name", "phone"]}));
        assert!(settings.require_name);
        assert!(settings.require_phone);

        let explicit = normalize(&json!({"required_fields": ["name"], "requireName": false}));
        assert!(!explicit.require_name);
    }

    #[test]
    fn test_working_hours_array_and_map_agree() {
        let from_array = normalize_working_hours(&json!([
            {"day": "Monday", "enabled": true, "ranges": [{"start": "09:00", "end": "12:00"}, {"start": "13:00", "end": "17:00"}]},
            {"day": "sat", "enabled": false, "ranges": []},
        ]));
        let from_map = normalize_working_hours(&json!({
            "MONDAY": {"enabled": true, "slots": [{"start": "09:00", "end": "12:00"}, {"start": "13:00", "end": "17:00"}]},
            "saturday": {"enabled": false},
        }));
        assert_eq!(from_array, from_map);
        assert_eq!(from_array.0.len(), 7);
        assert_eq!(from_array.0[0].day, "monday");
        assert!(from_array.0[0].enabled);
        assert_eq!(from_array.0[0].ranges.len(), 2);
        assert!(!from_array.0[5].enabled);
    }

    #[test]
    fn test_ranges_open_until_midnight() {
        let hours = normalize_working_hours(&json!({
            "fri": [{"start": "18:00", "end": "24:00"}],
            "sat": [{"start": "20:00", "end": "00:00"}],
            "sun": [{"start": "17:00", "end": "09:00"}],
        }));
        assert!(hours.0[4].enabled);
        assert!(hours.0[4].ranges[0].ends_at_midnight());
        assert!(hours.0[5].ranges[0].ends_at_midnight());
        assert!(hours.0[6].ranges.is_empty());
        assert!(!hours.0[6].enabled);
        assert_eq!(hours.to_human_readable(), "Fri: 18:00-24:00; Sat: 20:00-24:00");
    }

    #[test]
    fn test_working_hours_map_of_range_lists() {
        let hours = normalize_working_hours(&json!({
            "tue": [{"start": "14:00", "end": "18:00"}, {"start": "08:00", "end": "10:00"}],
            "wed": {"start": "10:00", "end": "16:00"},
        }));
        assert!(hours.0[1].enabled);
        assert_eq!(hours.0[1].ranges.len(), 2);
        assert!(hours.0[2].enabled);
        assert_eq!(hours.0[2].ranges.len(), 1);
        assert!(!hours.0[0].enabled);
    }

    #[test]
    fn test_invalid_ranges_and_days_are_dropped() {
        let hours = normalize_working_hours(&json!([
            {"day": "monday", "ranges": [{"start": "17:00", "end": "09:00"}, {"start": "25:00", "end": "26:00"}, {"start": "09:00", "end": "10:00"}]},
            {"day": "funday", "ranges": [{"start": "09:00", "end": "10:00"}]},
            {"ranges": [{"start": "09:00", "end": "10:00"}]},
        ]));
        assert_eq!(hours.0[0].ranges.len(), 1);
        assert!(hours.0[0].enabled);
        assert_eq!(hours.0.iter().filter(|d| d.enabled).count(), 1);
    }

    #[test]
    fn test_day_disabled_flag_wins_over_ranges() {
        let hours = normalize_working_hours(&json!({
            "friday": {"enabled": false, "ranges": [{"start": "09:00", "end": "17:00"}]},
        }));
        assert!(!hours.0[4].enabled);
        assert!(!hours.0[4].is_open());
    }

    #[test]
    fn test_day_index_accepts_full_and_short_names() {
        assert_eq!(day_index("Sunday"), Some(6));
        assert_eq!(day_index("thu"), Some(3));
        assert_eq!(day_index("th"), None);
        assert_eq!(day_index("thursdayish"), None);
    }

    struct ScriptedBackend {
        responses: Mutex<VecDeque<Option<Value>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Option<Value>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SchedulingBackend for ScriptedBackend {
        async fn fetch_scheduling_settings(&self) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front().flatten();
            match next {
                Some(body) => Ok(body),
                None => anyhow::bail!("settings service down"),
            }
        }

        async fn fetch_available_slots(
            &self,
            _booking_type: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> anyhow::Result<Vec<Value>> {
            anyhow::bail!("not used")
        }

        async fn confirm_booking(&self, _request: &BookingRequest) -> anyhow::Result<AppointmentConfirmation> {
            anyhow::bail!("not used")
        }
    }

    fn enabled() -> Value {
        json!({"enabled": true, "chatbotOfferBooking": true, "timezone": "Europe/Paris"})
    }

    #[tokio::test]
    async fn test_cache_serves_fresh_value_within_ttl() {
        let backend = ScriptedBackend::new(vec![Some(enabled()), Some(json!({}))]);
        let cache = SettingsCache::new(Duration::from_secs(60));

        assert!(cache.get(&backend).await.offers_booking());
        assert!(cache.get(&backend).await.offers_booking());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_reuses_stale_value_when_refresh_fails() {
        let backend = ScriptedBackend::new(vec![Some(enabled()), None]);
        let cache = SettingsCache::new(Duration::ZERO);

        assert_eq!(cache.get(&backend).await.timezone, "Europe/Paris");
        let stale = cache.get(&backend).await;
        assert!(stale.offers_booking());
        assert_eq!(stale.timezone, "Europe/Paris");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cold_failure_returns_uncached_defaults() {
        let backend = ScriptedBackend::new(vec![None, Some(enabled())]);
        let cache = SettingsCache::new(Duration::from_secs(60));

        assert_eq!(*cache.get(&backend).await, SchedulingSettings::default());
        // defaults are not cached, so the next call retries
        assert!(cache.get(&backend).await.offers_booking());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
