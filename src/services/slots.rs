use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::models::{BookingSlot, SchedulingSettings};

// Hard ceiling on scan steps so closed calendars terminate.
pub const MAX_SCAN_STEPS: usize = 500;

const START_KEYS: [&str; 7] = ["start", "start_time", "startTime", "starts_at", "startsAt", "datetime", "date_time"];
const END_KEYS: [&str; 5] = ["end", "end_time", "endTime", "ends_at", "endsAt"];

pub fn synthesize(
    settings: &SchedulingSettings,
    booking_type: &str,
    now: DateTime<Utc>,
    count: usize,
) -> Vec<BookingSlot> {
    let tz = settings.tz();
    let step = Duration::minutes(i64::from(settings.slot_duration_minutes));
    let earliest = now + Duration::hours(i64::from(settings.minimum_notice_hours));
    let horizon = now + Duration::days(i64::from(settings.max_days_ahead));
    let horizon_local = horizon.with_timezone(&tz).naive_local();

    let mut cursor = round_up(earliest.with_timezone(&tz).naive_local(), settings.slot_duration_minutes);
    let mut slots = Vec::new();

    for _ in 0..MAX_SCAN_STEPS {
        if slots.len() >= count || cursor >= horizon_local {
            break;
        }

        let Some(day) = settings.working_hours.day(cursor.weekday()).filter(|d| d.is_open()) else {
            cursor = next_midnight(cursor);
            continue;
        };

        // Ranges may overlap; the slot fits if any range holding `time` can contain it.
        let time = cursor.time();
        let fits = day
            .ranges
            .iter()
            .any(|range| range.contains(time) && cursor + step <= range.end_on(cursor.date()));

        if !fits {
            cursor = match day.next_start_after(time) {
                Some(start) => cursor.date().and_time(start),
                None => next_midnight(cursor),
            };
            continue;
        }

        if let Some(start) = resolve_local(&tz, cursor) {
            if start >= horizon {
                break;
            }
            if start >= earliest {
                slots.push(make_slot(start, step, &tz, &settings.timezone, booking_type));
            }
        }
        cursor += step;
    }

    slots
}

fn round_up(local: NaiveDateTime, slot_minutes: u32) -> NaiveDateTime {
    let step = i64::from(slot_minutes.max(1)) * 60;
    let mut secs = i64::from(local.time().num_seconds_from_midnight());
    if local.time().nanosecond() > 0 {
        secs += 1;
    }
    let rounded = (secs + step - 1) / step * step;
    start_of_day(local.date()) + Duration::seconds(rounded)
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn next_midnight(local: NaiveDateTime) -> NaiveDateTime {
    start_of_day(local.date()) + Duration::days(1)
}

// Local wall-clock time to an instant; times skipped by a DST change resolve to `None`.
fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn make_slot(start: DateTime<Utc>, step: Duration, tz: &Tz, timezone: &str, booking_type: &str) -> BookingSlot {
    let end = start + step;
    let local_start = start.with_timezone(tz);
    let local_end = end.with_timezone(tz);
    BookingSlot {
        id: format!("local-{booking_type}-{}", start.timestamp()),
        start,
        end: Some(end),
        label: Some(format!(
            "{}, {} - {}",
            local_start.format("%a, %b %-d"),
            local_start.format("%-I:%M %p"),
            local_end.format("%-I:%M %p"),
        )),
        timezone: timezone.to_string(),
        booking_type: Some(booking_type.to_string()),
    }
}

pub fn normalize_slots(raw: &[Value], settings: &SchedulingSettings, booking_type: &str) -> Vec<BookingSlot> {
    let tz = settings.tz();
    let mut slots: Vec<BookingSlot> = raw
        .iter()
        .filter_map(|value| normalize_slot(value, &tz, settings, booking_type))
        .collect();
    slots.sort_by_key(|s| s.start);
    dedup_slots(slots)
}

pub fn dedup_slots(slots: Vec<BookingSlot>) -> Vec<BookingSlot> {
    let mut seen = HashSet::new();
    slots
        .into_iter()
        .filter(|slot| {
            let (start, end, kind, tz) = slot.dedup_key();
            seen.insert((start, end, kind.map(str::to_string), tz.to_string()))
        })
        .collect()
}

fn normalize_slot(raw: &Value, tz: &Tz, settings: &SchedulingSettings, booking_type: &str) -> Option<BookingSlot> {
    let field = |keys: &[&str]| keys.iter().find_map(|k| raw.get(*k).and_then(Value::as_str));

    let slot_tz: Tz = raw
        .get("timezone")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(*tz);
    let start = field(&START_KEYS[..]).and_then(|s| parse_instant(s, &slot_tz))?;
    let end = field(&END_KEYS[..])
        .and_then(|s| parse_instant(s, &slot_tz))
        .filter(|end| *end > start)
        .or_else(|| Some(start + Duration::minutes(i64::from(settings.slot_duration_minutes))));

    let id = match raw.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("remote-{booking_type}-{}", start.timestamp()),
    };

    Some(BookingSlot {
        id,
        start,
        end,
        label: raw
            .get("label")
            .and_then(Value::as_str)
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string),
        timezone: slot_tz.name().to_string(),
        booking_type: Some(
            raw.get("type")
                .and_then(Value::as_str)
                .unwrap_or(booking_type)
                .to_string(),
        ),
    })
}

fn parse_instant(s: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|local| resolve_local(tz, local))
}
