use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const DAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingMode {
    ManualRequest,
    DirectBooking,
}

impl BookingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingMode::ManualRequest => "manual_request",
            BookingMode::DirectBooking => "direct_booking",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "manual_request" | "manual" | "request" => Some(BookingMode::ManualRequest),
            "direct_booking" | "direct" | "instant" => Some(BookingMode::DirectBooking),
            _ => None,
        }
    }
}

// An `end` of 00:00 closes the window at midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm_end")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn ends_at_midnight(&self) -> bool {
        self.end == NaiveTime::MIN
    }

    pub fn is_valid(&self) -> bool {
        self.ends_at_midnight() || self.start < self.end
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && (self.ends_at_midnight() || time < self.end)
    }

    pub fn end_on(&self, date: NaiveDate) -> NaiveDateTime {
        if self.ends_at_midnight() {
            date.and_time(NaiveTime::MIN) + Duration::days(1)
        } else {
            date.and_time(self.end)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingDay {
    pub day: String,
    pub enabled: bool,
    pub ranges: Vec<TimeRange>,
}

impl WorkingDay {
    pub fn closed(day: &str) -> Self {
        Self {
            day: day.to_string(),
            enabled: false,
            ranges: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.enabled && !self.ranges.is_empty()
    }

    pub fn next_start_after(&self, time: NaiveTime) -> Option<NaiveTime> {
        self.ranges
            .iter()
            .map(|r| r.start)
            .filter(|start| *start > time)
            .min()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct WorkingHours(pub Vec<WorkingDay>);

impl Default for WorkingHours {
    fn default() -> Self {
        Self(DAY_NAMES.iter().map(|d| WorkingDay::closed(d)).collect())
    }
}

impl WorkingHours {
    pub fn day(&self, weekday: Weekday) -> Option<&WorkingDay> {
        self.0.get(weekday.num_days_from_monday() as usize)
    }

    pub fn has_open_day(&self) -> bool {
        self.0.iter().any(WorkingDay::is_open)
    }

    pub fn to_human_readable(&self) -> String {
        self.0
            .iter()
            .filter(|d| d.is_open())
            .map(|d| {
                let mut ranges = d.ranges.clone();
                ranges.sort_by_key(|r| r.start);
                let hours = ranges
                    .iter()
                    .map(|r| format!("{}-{}", r.start.format("%H:%M"), format_end(r.end)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let short: String = d.day.chars().take(3).collect();
                format!("{}: {hours}", capitalize(&short))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulingSettings {
    pub enabled: bool,
    pub chatbot_offer_booking: bool,
    pub ask_after_quote: bool,
    pub require_name: bool,
    pub require_phone: bool,
    pub booking_mode: BookingMode,
    pub default_booking_type: String,
    pub show_available_slots: bool,
    pub allow_custom_time: bool,
    pub timezone: String,
    pub slot_duration_minutes: u32,
    pub minimum_notice_hours: u32,
    pub max_days_ahead: u32,
    pub working_hours: WorkingHours,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            chatbot_offer_booking: false,
            ask_after_quote: false,
            require_name: false,
            require_phone: false,
            booking_mode: BookingMode::ManualRequest,
            default_booking_type: "call".to_string(),
            show_available_slots: true,
            allow_custom_time: true,
            timezone: "UTC".to_string(),
            slot_duration_minutes: 30,
            minimum_notice_hours: 1,
            max_days_ahead: 30,
            working_hours: WorkingHours::default(),
        }
    }
}

impl SchedulingSettings {
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn offers_booking(&self) -> bool {
        self.enabled && self.chatbot_offer_booking
    }
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

pub fn parse_end_hhmm(s: &str) -> Option<NaiveTime> {
    match s.trim() {
        "24:00" | "24:00:00" => Some(NaiveTime::MIN),
        other => parse_hhmm(other),
    }
}

fn format_end(end: NaiveTime) -> String {
    if end == NaiveTime::MIN {
        "24:00".to_string()
    } else {
        end.format("%H:%M").to_string()
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time: {raw}")))
    }
}

mod hhmm_end {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_end(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_end_hhmm(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time: {raw}")))
    }
}
