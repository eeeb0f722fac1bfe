use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::BookingPayload;

const BACKEND_BOOKING_PATHS: [&[&str]; 3] = [&["booking"], &["meta", "booking"], &["ui_action", "booking"]];

const TEXT_KEYS: [&str; 4] = ["reply", "message", "content", "text"];

const REQUIRED_INFO_KEYS: [&str; 4] = ["required_info", "requiredInfo", "missing_fields", "missingFields"];

#[derive(Debug, Clone, Copy)]
pub struct AiReply<'a>(pub &'a Value);

impl<'a> AiReply<'a> {
    // Non-empty `mode` under any booking path means the backend already
    // orchestrates booking for this turn.
    pub fn backend_booking_mode(&self) -> Option<&'a str> {
        BACKEND_BOOKING_PATHS.iter().find_map(|path| {
            path.iter()
                .try_fold(self.0, |v, key| v.get(*key))
                .and_then(|booking| booking.get("mode"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|mode| !mode.is_empty())
        })
    }

    pub fn text(&self) -> &'a str {
        if let Some(s) = self.0.as_str() {
            return s;
        }
        TEXT_KEYS
            .iter()
            .find_map(|k| self.0.get(*k).and_then(Value::as_str))
            .unwrap_or("")
    }

    pub fn required_info_is_empty(&self) -> bool {
        let scopes = [Some(self.0), self.0.get("meta")];
        scopes
            .into_iter()
            .flatten()
            .flat_map(|scope| REQUIRED_INFO_KEYS.iter().filter_map(move |k| scope.get(*k)))
            .find_map(Value::as_array)
            .is_some_and(|list| list.is_empty())
    }

    pub fn merge(&self, prompt: &str, payload: &BookingPayload) -> AugmentedReply {
        let base = self.text();
        let text = match (base.trim().is_empty(), prompt.is_empty()) {
            (true, _) => prompt.to_string(),
            (false, true) => base.to_string(),
            (false, false) => format!("{}\n\n{prompt}", base.trim_end()),
        };

        let mut object = match self.0 {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        let text_key = TEXT_KEYS
            .iter()
            .find(|k| object.get(**k).is_some_and(Value::is_string))
            .copied()
            .unwrap_or("reply");
        object.insert(text_key.to_string(), Value::String(text.clone()));

        let mut booking = match object.remove("booking") {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        if let Ok(Value::Object(fields)) = serde_json::to_value(payload) {
            booking.extend(fields);
        }
        object.insert("booking".to_string(), Value::Object(booking));

        AugmentedReply {
            reply: Value::Object(object),
            text,
            booking: payload.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AugmentedReply {
    pub reply: Value,
    pub text: String,
    pub booking: BookingPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PayloadMode;
    use serde_json::json;

    #[test]
    fn test_backend_mode_detected_on_every_path() {
        for reply in [
            json!({"reply": "hi", "booking": {"mode": "slots"}}),
            json!({"reply": "hi", "meta": {"booking": {"mode": "offer"}}}),
            json!({"reply": "hi", "ui_action": {"booking": {"mode": "confirm"}}}),
        ] {
            assert!(AiReply(&reply).backend_booking_mode().is_some(), "{reply}");
        }
    }

    #[test]
    fn test_empty_backend_mode_is_ignored() {
        let reply = json!({"reply": "hi", "booking": {"mode": "  "}});
        assert_eq!(AiReply(&reply).backend_booking_mode(), None);
        let reply = json!({"reply": "hi", "booking": {}});
        assert_eq!(AiReply(&reply).backend_booking_mode(), None);
    }

    #[test]
    fn test_required_info_must_be_present_and_empty() {
        assert!(AiReply(&json!({"required_info": []})).required_info_is_empty());
        assert!(AiReply(&json!({"meta": {"missingFields": []}})).required_info_is_empty());
        assert!(!AiReply(&json!({"required_info": ["budget"]})).required_info_is_empty());
        assert!(!AiReply(&json!({"reply": "hello"})).required_info_is_empty());
    }

    #[test]
    fn test_merge_appends_prompt_to_existing_text_key() {
        let reply = json!({"message": "Your quote is $500.", "id": 7});
        let payload = BookingPayload::new(PayloadMode::Offer, "call", "UTC");
        let merged = AiReply(&reply).merge("Want to book a call?", &payload);
        assert_eq!(merged.text, "Your quote is $500.\n\nWant to book a call?");
        assert_eq!(merged.reply["message"], merged.text);
        assert_eq!(merged.reply["id"], 7);
        assert!(merged.reply.get("reply").is_none());
        assert_eq!(merged.reply["booking"]["mode"], "offer");
    }

    #[test]
    fn test_merge_keeps_unrelated_booking_keys() {
        let reply = json!({"reply": "ok", "booking": {"calendar_id": "cal-1"}});
        let payload = BookingPayload::new(PayloadMode::Declined, "call", "UTC");
        let merged = AiReply(&reply).merge("No problem.", &payload);
        assert_eq!(merged.reply["booking"]["calendar_id"], "cal-1");
        assert_eq!(merged.reply["booking"]["mode"], "declined");
    }

    #[test]
    fn test_merge_plain_string_reply() {
        let reply = json!("Sure thing.");
        let payload = BookingPayload::new(PayloadMode::CollectTime, "call", "UTC");
        let merged = AiReply(&reply).merge("What time works?", &payload);
        assert_eq!(merged.reply["reply"], "Sure thing.\n\nWhat time works?");
    }
}
