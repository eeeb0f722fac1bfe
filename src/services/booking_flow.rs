use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::models::{
    AiReply, AppointmentStatus, AppointmentSummary, AugmentedReply, BookingFlowState, BookingMode,
    BookingPayload, BookingRequest, BookingSlot, FlowStage, PayloadMode, QuickActionKind,
    SchedulingSettings,
};
use crate::services::backend::SchedulingBackend;
use crate::services::flow_store::FlowStore;
use crate::services::intent;
use crate::services::settings::SettingsCache;
use crate::services::slots::{normalize_slots, synthesize};

pub const MAX_OFFERED_SLOTS: usize = 5;

struct Turn {
    prompt: String,
    payload: BookingPayload,
}

impl Turn {
    fn new(prompt: impl Into<String>, payload: BookingPayload) -> Self {
        Self {
            prompt: prompt.into(),
            payload,
        }
    }
}

pub struct BookingFlowController {
    backend: Arc<dyn SchedulingBackend>,
    store: Arc<FlowStore>,
    settings: SettingsCache,
    max_offered_slots: usize,
}

impl BookingFlowController {
    pub fn new(backend: Arc<dyn SchedulingBackend>, store: Arc<FlowStore>, settings_ttl: StdDuration) -> Self {
        Self {
            backend,
            store,
            settings: SettingsCache::new(settings_ttl),
            max_offered_slots: MAX_OFFERED_SLOTS,
        }
    }

    pub fn with_max_offered_slots(mut self, max: usize) -> Self {
        self.max_offered_slots = max.clamp(1, MAX_OFFERED_SLOTS);
        self
    }

    pub fn store(&self) -> &Arc<FlowStore> {
        &self.store
    }

    pub async fn settings(&self) -> Arc<SchedulingSettings> {
        self.settings.get(self.backend.as_ref()).await
    }

    pub async fn process(
        &self,
        ai_reply: &Value,
        conversation_key: &str,
        user_message: Option<&str>,
    ) -> Option<AugmentedReply> {
        self.process_at(ai_reply, conversation_key, user_message, Utc::now())
            .await
    }

    pub async fn process_at(
        &self,
        ai_reply: &Value,
        key: &str,
        user_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<AugmentedReply> {
        let reply = AiReply(ai_reply);

        // Server-side orchestration takes precedence over this client shim.
        if let Some(mode) = reply.backend_booking_mode() {
            tracing::debug!(conversation = key, mode, "backend attached booking metadata, standing down");
            return None;
        }

        let settings = self.settings().await;
        if !settings.offers_booking() {
            return None;
        }

        let _turn = self.store.lock_turn(key).await;
        let mut flow = self.store.peek(key).unwrap_or_default();
        let message = user_message.map(str::trim).filter(|m| !m.is_empty());

        let turn = if flow.active {
            match message {
                Some(message) => self.advance(key, &mut flow, message, &settings, now).await,
                None => None,
            }
        } else if flow.is_settled() {
            None
        } else if let Some(rule) = message.and_then(intent::matched_rule) {
            tracing::info!(conversation = key, rule, "booking intent detected");
            Some(self.start(key, &mut flow, message, &settings, now).await)
        } else if settings.ask_after_quote && !flow.offer_shown && reply.required_info_is_empty() {
            tracing::info!(conversation = key, "quote complete, offering booking");
            Some(self.start(key, &mut flow, message, &settings, now).await)
        } else {
            None
        };

        let turn = turn?;
        tracing::info!(
            conversation = key,
            stage = flow.stage.as_str(),
            mode = turn.payload.mode.as_str(),
            "booking flow turn"
        );
        self.store.save(key, flow);
        Some(reply.merge(&turn.prompt, &turn.payload))
    }

    async fn start(
        &self,
        key: &str,
        flow: &mut BookingFlowState,
        message: Option<&str>,
        settings: &SchedulingSettings,
        now: DateTime<Utc>,
    ) -> Turn {
        let booking_type = message
            .and_then(intent::detect_booking_type)
            .map(str::to_string)
            .unwrap_or_else(|| settings.default_booking_type.clone());

        *flow = BookingFlowState::start(settings, booking_type);
        flow.offer_shown = true;

        match collect_prerequisite(flow, settings) {
            Some(turn) => turn,
            None => self.offer(key, flow, settings, now).await,
        }
    }

    async fn advance(
        &self,
        key: &str,
        flow: &mut BookingFlowState,
        message: &str,
        settings: &SchedulingSettings,
        now: DateTime<Utc>,
    ) -> Option<Turn> {
        if let Some(rule) = intent::DECLINE.first_match(message) {
            tracing::debug!(conversation = key, rule, "booking declined");
            return Some(decline(flow, settings));
        }

        // Prerequisite stages accept only their field (or a decline).
        match flow.stage {
            FlowStage::AwaitingName => {
                if message.chars().count() < 2 {
                    return None;
                }
                flow.name_collected = true;
                flow.customer_name = Some(message.to_string());
                return Some(match collect_prerequisite(flow, settings) {
                    Some(turn) => turn,
                    None => self.offer(key, flow, settings, now).await,
                });
            }
            FlowStage::AwaitingPhone => {
                let phone = intent::extract_phone(message)?;
                flow.phone_collected = true;
                flow.customer_phone = Some(phone);
                return Some(self.offer(key, flow, settings, now).await);
            }
            _ => {}
        }

        if intent::SHOW_SLOTS.matches(message) {
            return Some(self.show_slots(flow, settings, now));
        }
        if settings.allow_custom_time && intent::CUSTOM_TIME.matches(message) {
            return Some(ask_custom_time(flow, settings, None));
        }

        match flow.stage {
            FlowStage::AwaitingBookingConfirmation if intent::AFFIRMATIVE.matches(message) => {
                match flow.selected_slot.clone() {
                    Some(slot) => Some(self.finalize(key, flow, settings, slot).await),
                    None => Some(self.show_slots(flow, settings, now)),
                }
            }
            FlowStage::AwaitingSlotChoice => {
                let slot = select_offered(flow, message)?;
                Some(confirm_selection(flow, settings, slot))
            }
            FlowStage::AwaitingCustomTime if message.chars().count() >= 3 => {
                Some(complete_custom_time(flow, settings, message))
            }
            _ => None,
        }
    }

    async fn offer(
        &self,
        key: &str,
        flow: &mut BookingFlowState,
        settings: &SchedulingSettings,
        now: DateTime<Utc>,
    ) -> Turn {
        if settings.show_available_slots {
            let slots = self.load_slots(key, &flow.requested_type, settings, now).await;
            if !slots.is_empty() {
                return self.present_slots(flow, settings, slots);
            }
        }

        flow.stage = FlowStage::AwaitingBookingConfirmation;
        flow.selected_slot = None;
        flow.last_offered_slots.clear();

        let mut actions = Vec::new();
        if settings.show_available_slots {
            actions.push(QuickActionKind::ShowSlots);
        }
        if settings.allow_custom_time {
            actions.push(QuickActionKind::ProposeTime);
        }
        actions.extend([QuickActionKind::Confirm, QuickActionKind::NotNow]);

        Turn::new(
            format!("Would you like to book a {}?", flow.requested_type),
            payload(flow, settings, PayloadMode::Offer).with_actions(&actions),
        )
    }

    // Live availability first; a failed or empty fetch falls back to local synthesis.
    async fn load_slots(
        &self,
        key: &str,
        booking_type: &str,
        settings: &SchedulingSettings,
        now: DateTime<Utc>,
    ) -> Vec<BookingSlot> {
        let to = now + Duration::days(i64::from(settings.max_days_ahead));
        match self.backend.fetch_available_slots(booking_type, now, to).await {
            Ok(raw) => {
                let slots: Vec<BookingSlot> = normalize_slots(&raw, settings, booking_type)
                    .into_iter()
                    .filter(|s| s.start >= now && s.start < to)
                    .collect();
                if !slots.is_empty() {
                    return slots;
                }
                tracing::debug!(conversation = key, "no live slots returned, synthesizing");
            }
            Err(e) => {
                tracing::warn!(conversation = key, error = %e, "slot fetch failed, synthesizing");
            }
        }
        synthesize(settings, booking_type, now, self.max_offered_slots)
    }

    fn show_slots(&self, flow: &mut BookingFlowState, settings: &SchedulingSettings, now: DateTime<Utc>) -> Turn {
        let slots = synthesize(settings, &flow.requested_type, now, self.max_offered_slots);
        if !slots.is_empty() {
            return self.present_slots(flow, settings, slots);
        }
        if settings.allow_custom_time {
            return ask_custom_time(
                flow,
                settings,
                Some("I couldn't find any open times in the booking window."),
            );
        }

        let hours = settings.working_hours.to_human_readable();
        let prompt = if hours.is_empty() {
            "Sorry, there are no open times available right now.".to_string()
        } else {
            format!("Sorry, there are no open times available right now. Our hours are {hours}.")
        };
        Turn::new(
            prompt,
            payload(flow, settings, PayloadMode::NotAvailable).with_actions(&[QuickActionKind::NotNow]),
        )
    }

    fn present_slots(
        &self,
        flow: &mut BookingFlowState,
        settings: &SchedulingSettings,
        slots: Vec<BookingSlot>,
    ) -> Turn {
        let offered: Vec<BookingSlot> = slots.into_iter().take(self.max_offered_slots).collect();
        flow.stage = FlowStage::AwaitingSlotChoice;
        flow.selected_slot = None;
        flow.last_offered_slots = offered.clone();

        let mut actions = Vec::new();
        if settings.allow_custom_time {
            actions.push(QuickActionKind::ProposeTime);
        }
        actions.push(QuickActionKind::NotNow);

        Turn::new(
            format!(
                "Here are the next available times for a {}. Which one works best for you?",
                flow.requested_type
            ),
            payload(flow, settings, PayloadMode::Slots)
                .with_slots(offered)
                .with_actions(&actions),
        )
    }

    async fn finalize(
        &self,
        key: &str,
        flow: &mut BookingFlowState,
        settings: &SchedulingSettings,
        slot: BookingSlot,
    ) -> Turn {
        let mut appointment = summary(flow, AppointmentStatus::PendingConfirmation);
        appointment.slot = Some(slot.clone());

        if settings.booking_mode == BookingMode::DirectBooking {
            let request = BookingRequest {
                conversation_key: key.to_string(),
                booking_type: flow.requested_type.clone(),
                slot: slot.clone(),
                customer_name: flow.customer_name.clone(),
                customer_phone: flow.customer_phone.clone(),
            };
            match self.backend.confirm_booking(&request).await {
                Ok(confirmation) => {
                    appointment.status = AppointmentStatus::Confirmed;
                    appointment.reference = confirmation.reference;
                }
                Err(e) => {
                    tracing::warn!(conversation = key, error = %e, "direct booking failed, leaving as request");
                }
            }
        }

        flow.finish(FlowStage::Completed);
        tracing::info!(
            conversation = key,
            status = appointment.status.as_str(),
            mode = settings.booking_mode.as_str(),
            "booking finalized"
        );

        let label = slot.display_label();
        let prompt = match appointment.status {
            AppointmentStatus::Confirmed => format!("You're booked for {label}. See you then!"),
            AppointmentStatus::PendingConfirmation => {
                format!("Thanks! I've requested {label} for you. We'll confirm shortly.")
            }
        };
        Turn::new(
            prompt,
            payload(flow, settings, PayloadMode::Confirmed)
                .with_selected(slot)
                .with_appointment(appointment),
        )
    }
}

fn payload(flow: &BookingFlowState, settings: &SchedulingSettings, mode: PayloadMode) -> BookingPayload {
    BookingPayload::new(mode, &flow.requested_type, &settings.timezone)
}

fn summary(flow: &BookingFlowState, status: AppointmentStatus) -> AppointmentSummary {
    AppointmentSummary {
        status,
        booking_type: flow.requested_type.clone(),
        slot: None,
        proposed_time: None,
        customer_name: flow.customer_name.clone(),
        customer_phone: flow.customer_phone.clone(),
        reference: None,
    }
}

fn collect_prerequisite(flow: &mut BookingFlowState, settings: &SchedulingSettings) -> Option<Turn> {
    let (stage, mode, prompt) = if flow.needs_name() {
        (
            FlowStage::AwaitingName,
            PayloadMode::AwaitingName,
            "Before we book, could I get your name?",
        )
    } else if flow.needs_phone() {
        (
            FlowStage::AwaitingPhone,
            PayloadMode::AwaitingPhone,
            "What's the best phone number to reach you at?",
        )
    } else {
        return None;
    };

    flow.stage = stage;
    flow.offer_shown = true;
    Some(Turn::new(
        prompt,
        payload(flow, settings, mode).with_actions(&[QuickActionKind::NotNow]),
    ))
}

fn ask_custom_time(flow: &mut BookingFlowState, settings: &SchedulingSettings, lead: Option<&str>) -> Turn {
    flow.stage = FlowStage::AwaitingCustomTime;
    flow.selected_slot = None;

    let mut actions = Vec::new();
    if settings.show_available_slots {
        actions.push(QuickActionKind::ShowSlots);
    }
    actions.push(QuickActionKind::NotNow);

    let question = "What day and time would work best for you?";
    let prompt = match lead {
        Some(lead) => format!("{lead} {question}"),
        None => question.to_string(),
    };
    Turn::new(
        prompt,
        payload(flow, settings, PayloadMode::CollectTime).with_actions(&actions),
    )
}

fn select_offered(flow: &BookingFlowState, message: &str) -> Option<BookingSlot> {
    let offered = &flow.last_offered_slots;
    if let Some(slot) = intent::slot_ordinal(message).and_then(|i| offered.get(i)) {
        return Some(slot.clone());
    }
    let lower = message.to_lowercase();
    offered
        .iter()
        .find(|s| {
            s.id == message
                || s.label
                    .as_deref()
                    .is_some_and(|label| lower.contains(&label.to_lowercase()))
        })
        .cloned()
}

fn confirm_selection(flow: &mut BookingFlowState, settings: &SchedulingSettings, slot: BookingSlot) -> Turn {
    flow.stage = FlowStage::AwaitingBookingConfirmation;
    flow.selected_slot = Some(slot.clone());

    let mut actions = vec![QuickActionKind::Confirm];
    if settings.show_available_slots {
        actions.push(QuickActionKind::ShowSlots);
    }
    actions.push(QuickActionKind::NotNow);

    Turn::new(
        format!("Great choice. Shall I book {} for you?", slot.display_label()),
        payload(flow, settings, PayloadMode::Confirm)
            .with_selected(slot)
            .with_actions(&actions),
    )
}

fn complete_custom_time(flow: &mut BookingFlowState, settings: &SchedulingSettings, message: &str) -> Turn {
    flow.proposed_custom_time = Some(message.to_string());
    flow.finish(FlowStage::Completed);

    let mut appointment = summary(flow, AppointmentStatus::PendingConfirmation);
    appointment.proposed_time = Some(message.to_string());

    Turn::new(
        format!("Thanks! I've noted \"{message}\" as your preferred time. We'll confirm shortly."),
        payload(flow, settings, PayloadMode::Confirmed).with_appointment(appointment),
    )
}

fn decline(flow: &mut BookingFlowState, settings: &SchedulingSettings) -> Turn {
    flow.finish(FlowStage::Declined);
    flow.selected_slot = None;
    Turn::new(
        "No problem! Just let me know whenever you'd like to book.",
        payload(flow, settings, PayloadMode::Declined),
    )
}
