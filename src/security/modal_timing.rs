// src/security/modal_timing.rs - Interaction-window timing per (session, kind)
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::SessionId;
use crate::security::clock::{seconds_between, Clock};
use crate::security::SecurityError;
use crate::utils::generate_id;

/// Timing thresholds and tracker housekeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Score assigned when a transfer is evaluated with no open interaction window
    pub direct_invocation_penalty: u8,
    pub very_fast_ratio: f64,
    pub fast_ratio: f64,
    pub faster_ratio: f64,
    pub very_fast_risk: u8,
    pub fast_risk: u8,
    pub faster_risk: u8,
    pub normal_risk: u8,
    pub min_interactions: u32,
    pub low_interaction_after_secs: f64,
    pub low_interaction_penalty: u8,
    pub abandoned_after_secs: i64,
    pub max_events_per_session: usize,
}

impl Default for TimingSettings {
    fn default() -> Self {
        TimingSettings {
            direct_invocation_penalty: 70,
            very_fast_ratio: 0.10,
            fast_ratio: 0.25,
            faster_ratio: 0.50,
            very_fast_risk: 100,
            fast_risk: 75,
            faster_risk: 40,
            normal_risk: 5,
            min_interactions: 3,
            low_interaction_after_secs: 5.0,
            low_interaction_penalty: 20,
            abandoned_after_secs: 30 * 60,
            max_events_per_session: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub event_type: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ModalSession {
    id: String,
    started_at: DateTime<Utc>,
    interaction_count: u32,
    last_interaction_at: Option<DateTime<Utc>>,
    events: VecDeque<InteractionEvent>,
}

/// Returned by `start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalHandle {
    pub modal_id: String,
    pub session_id: SessionId,
    pub interaction_kind: String,
    pub started_at: DateTime<Utc>,
}

/// Non-destructive view of an open window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSnapshot {
    pub elapsed_seconds: f64,
    pub interaction_count: u32,
    pub started_at: DateTime<Utc>,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

/// Result of closing a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedInteraction {
    pub duration_seconds: f64,
    pub interaction_count: u32,
    pub successful: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionStatus {
    pub active: bool,
    pub elapsed_seconds: Option<f64>,
    pub interaction_count: u32,
    pub started_at: Option<DateTime<Utc>>,
}

type ModalKey = (SessionId, String);

pub struct ModalTimingTracker {
    sessions: Mutex<HashMap<ModalKey, ModalSession>>,
    settings: TimingSettings,
    clock: Arc<dyn Clock>,
}

impl ModalTimingTracker {
    pub fn new(settings: TimingSettings, clock: Arc<dyn Clock>) -> Self {
        ModalTimingTracker {
            sessions: Mutex::new(HashMap::new()),
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &TimingSettings {
        &self.settings
    }

    fn key(session_id: &str, kind: &str) -> ModalKey {
        (session_id.to_string(), kind.to_string())
    }

    /// Opens a window, replacing any unterminated one for the same key
    pub fn start(&self, session_id: &str, kind: &str) -> ModalHandle {
        let now = self.clock.now();
        let modal = ModalSession {
            id: generate_id("modal"),
            started_at: now,
            interaction_count: 0,
            last_interaction_at: None,
            events: VecDeque::new(),
        };
        let modal_id = modal.id.clone();

        let replaced = self.sessions.lock().insert(Self::key(session_id, kind), modal);
        if let Some(old) = replaced {
            debug!("Discarded unterminated modal {} for session {}", old.id, session_id);
        }
        info!("Modal started: session={} kind={}", session_id, kind);

        ModalHandle {
            modal_id,
            session_id: session_id.to_string(),
            interaction_kind: kind.to_string(),
            started_at: now,
        }
    }

    /// Returns the updated interaction count
    pub fn record_interaction(&self, session_id: &str, kind: &str, event_type: &str) -> Result<u32, SecurityError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock();
        let modal = sessions
            .get_mut(&Self::key(session_id, kind))
            .ok_or_else(|| SecurityError::not_found("modal session", &format!("{}/{}", session_id, kind)))?;

        modal.interaction_count = modal.interaction_count.saturating_add(1);
        modal.last_interaction_at = Some(now);
        modal.events.push_back(InteractionEvent {
            event_type: event_type.to_string(),
            at: now,
        });
        while modal.events.len() > self.settings.max_events_per_session {
            modal.events.pop_front();
        }

        Ok(modal.interaction_count)
    }

    pub fn snapshot(&self, session_id: &str, kind: &str) -> Option<TimingSnapshot> {
        let now = self.clock.now();
        self.sessions
            .lock()
            .get(&Self::key(session_id, kind))
            .map(|modal| TimingSnapshot {
                elapsed_seconds: seconds_between(modal.started_at, now),
                interaction_count: modal.interaction_count,
                started_at: modal.started_at,
                last_interaction_at: modal.last_interaction_at,
            })
    }

    /// Always removes the window; `None` when nothing was open
    pub fn end(&self, session_id: &str, kind: &str, successful: bool) -> Option<CompletedInteraction> {
        let now = self.clock.now();
        let modal = self.sessions.lock().remove(&Self::key(session_id, kind))?;
        let completed = CompletedInteraction {
            duration_seconds: seconds_between(modal.started_at, now),
            interaction_count: modal.interaction_count,
            successful,
        };

        info!(
            "Modal ended: session={} kind={} duration={:.1}s interactions={} successful={}",
            session_id, kind, completed.duration_seconds, completed.interaction_count, successful
        );
        Some(completed)
    }

    pub fn status(&self, session_id: &str, kind: &str) -> InteractionStatus {
        match self.snapshot(session_id, kind) {
            Some(snapshot) => InteractionStatus {
                active: true,
                elapsed_seconds: Some(snapshot.elapsed_seconds),
                interaction_count: snapshot.interaction_count,
                started_at: Some(snapshot.started_at),
            },
            None => InteractionStatus {
                active: false,
                elapsed_seconds: None,
                interaction_count: 0,
                started_at: None,
            },
        }
    }

    /// Drops every window belonging to a session
    pub fn evict_session(&self, session_id: &str) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|(sid, _), _| sid != session_id);
        before - sessions.len()
    }

    /// Drops windows with no activity for longer than the abandonment threshold
    pub fn evict_abandoned(&self) -> usize {
        let cutoff = self.clock.now() - Duration::seconds(self.settings.abandoned_after_secs);
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, modal| modal.last_interaction_at.unwrap_or(modal.started_at) > cutoff);
        before - sessions.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
