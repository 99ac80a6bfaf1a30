use crate::status::StatusEvent;
use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::error;

/// What `GET /` shows.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BoardView {
    pub results: Vec<StatusEvent>,
    pub errors: Vec<String>,
}

/// Latest status event per (namespace, check name).
#[derive(Debug)]
pub struct Board {
    events: Mutex<HashMap<(String, String), StatusEvent>>,
    time_to_report: TimeDelta,
}

impl Board {
    /// `time_to_report_minutes` is how old the newest event may get before
    /// the board says data is missing.
    #[must_use]
    pub fn new(time_to_report_minutes: f64) -> Self {
        // sub-second precision is irrelevant for a minutes threshold
        #[allow(clippy::cast_possible_truncation)]
        let seconds = (time_to_report_minutes * 60.0).max(0.0).round() as i64;
        Self {
            events: Mutex::new(HashMap::new()),
            time_to_report: TimeDelta::seconds(seconds),
        }
    }

    /// Keep `event`, replacing any earlier one with the same key.
    pub fn put(&self, event: StatusEvent) {
        let key = (event.namespace().to_string(), event.name().to_string());
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        events.insert(key, event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn view(&self) -> BoardView {
        self.view_at(Local::now().naive_local())
    }

    /// Events newest first, plus a staleness error relative to `now`.
    #[must_use]
    pub fn view_at(&self, now: NaiveDateTime) -> BoardView {
        let mut results: Vec<StatusEvent> = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        results.sort_by(|a, b| b.time().cmp(&a.time()).then_with(|| a.name().cmp(b.name())));

        let mut errors = Vec::new();
        if let Some(latest) = results.first() {
            let age = now - latest.time();
            if age >= self.time_to_report {
                let message = stale_message(age);
                error!("{}", message);
                errors.push(message);
            }
        }
        BoardView { results, errors }
    }
}

fn stale_message(age: TimeDelta) -> String {
    format!(
        "ERROR! No test data for {} days {} hours and {} minutes",
        age.num_days(),
        age.num_hours() % 24,
        age.num_minutes() % 60
    )
}
