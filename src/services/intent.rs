use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

pub struct Rule {
    pub name: &'static str,
    pattern: Regex,
}

pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    fn new(rules: &[(&'static str, &str)]) -> Self {
        let rules = rules
            .iter()
            .map(|&(name, pattern)| Rule {
                name,
                pattern: RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .unwrap_or_else(|e| panic!("invalid rule {name}: {e}")),
            })
            .collect();
        Self { rules }
    }

    pub fn first_match(&self, text: &str) -> Option<&'static str> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(text))
            .map(|r| r.name)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name)
    }
}

pub static BOOKING_INTENT: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(&[
        (
            "scheduling_verb",
            r"\b(book|booking|schedule|scheduling|reschedule|appointment|appt|reserve)\b",
        ),
        (
            "meeting_request",
            r"\b(set up|arrange|hop on|jump on|get on)\b.*\b(call|meeting|chat|demo)\b",
        ),
        (
            "availability_question",
            r"\b(availability|available times?|free slots?|open slots?|when can we (meet|talk))\b",
        ),
        (
            "relative_time",
            r"\b(tomorrow|tonight|next (week|month|monday|tuesday|wednesday|thursday|friday|saturday|sunday)|this (week|afternoon|morning|evening))\b",
        ),
        (
            "clock_time",
            r"\b([01]?\d|2[0-3])(:[0-5]\d)?\s?(am|pm)\b|\b([01]?\d|2[0-3]):[0-5]\d\b",
        ),
    ])
});

pub static DECLINE: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(&[
        ("not_now", r"\bnot (now|today|right now|interested)\b"),
        ("no_thanks", r"\bno,? thanks?\b|\bno thank you\b"),
        ("later", r"\b(maybe )?later\b"),
        ("skip", r"\bskip\b"),
        ("never_mind", r"\bnever ?mind\b"),
        ("dont_want", r"\b(don'?t|do not) want to (book|schedule)\b"),
    ])
});

pub static SHOW_SLOTS: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(&[
        ("available_slots", r"\bavailable (slots?|times?)\b"),
        (
            "show_times",
            r"\b(show|see|view|list|what are|which are)\b.*\b(slots?|times?|availability|openings)\b",
        ),
    ])
});

pub static CUSTOM_TIME: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(&[
        ("propose_time", r"\b(propose|suggest|pick|choose)\b.*\b(time|date)\b"),
        (
            "other_time",
            r"\b(custom|different|another|other|my own)\s+(time|date|slot)\b",
        ),
        ("none_work", r"\bnone of (these|those|them) work"),
    ])
});

pub static AFFIRMATIVE: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(&[
        ("yes", r"^\s*(yes|yeah|yep|yup|sure|ok|okay|absolutely|definitely|of course)\b"),
        ("confirm", r"\b(confirm|book it|sounds good|let'?s do it|go ahead|please do)\b"),
    ])
});

static PHONE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\(?\d[\d\s().-]{4,}\d").expect("phone pattern"));

static ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(
        r"^\s*(?:(?:option|slot|number|no\.?|#)\s*)?(\d)\s*$|\b(first|second|third|fourth|fifth|1st|2nd|3rd|4th|5th)\b",
    )
    .case_insensitive(true)
    .build()
    .expect("ordinal pattern")
});

const BOOKING_TYPES: [&str; 5] = ["call", "meeting", "consultation", "demo", "visit"];

pub fn detect(message: &str) -> bool {
    BOOKING_INTENT.matches(message)
}

pub fn matched_rule(message: &str) -> Option<&'static str> {
    BOOKING_INTENT.first_match(message)
}

pub fn detect_booking_type(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    BOOKING_TYPES.iter().copied().find(|t| {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == *t || word.strip_suffix('s') == Some(*t))
    })
}

pub fn extract_phone(message: &str) -> Option<String> {
    PHONE_NUMBER
        .find(message)
        .map(|m| m.as_str().trim().to_string())
}

pub fn slot_ordinal(message: &str) -> Option<usize> {
    let caps = ORDINAL.captures(message)?;
    if let Some(digit) = caps.get(1) {
        return digit.as_str().parse::<usize>().ok()?.checked_sub(1);
    }
    let word = caps.get(2)?.as_str().to_lowercase();
    match word.as_str() {
        "first" | "1st" => Some(0),
        "second" | "2nd" => Some(1),
        "third" | "3rd" => Some(2),
        "fourth" | "4th" => Some(3),
        "fifth" | "5th" => Some(4),
        _ => None,
    }
}
