use std::sync::atomic;
use std::time;

use serde_derive::Serialize;
use slog_scope::{debug, warn};

use crate::clock;
use crate::journal;
use crate::settings;
use crate::slots;
use crate::weather;

/// Width of the rolling aggregate window, measured from "now" at each
/// computation, not from any boundary reset.
pub const WINDOW_DAYS: i64 = 7;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The payload pushed to the dashboard.  Recomputed from scratch on every
/// report cycle.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub last_watered: Option<String>,
    pub next_scheduled: Option<String>,
    pub rain_status: String,
    pub system_mm_last_7d: f64,
    pub rain_mm_last_7d: f64,
    pub message: String,
}

pub fn build_snapshot(
    now: chrono::NaiveDateTime,
    journal: &journal::EventLog,
    slots: &[slots::TimeSlot],
    decision: weather::RainDecision,
) -> StatusSnapshot {
    let message = match decision {
        weather::RainDecision::Unknown => {
            "Weather service unavailable; watering proceeds fail-open.".to_owned()
        }
        _ => "System running normally.".to_owned(),
    };

    StatusSnapshot {
        last_watered: journal
            .last_event()
            .map(|event| event.timestamp.format(TIME_FORMAT).to_string()),
        next_scheduled: next_scheduled(now, slots)
            .map(|at| at.format(TIME_FORMAT).to_string()),
        rain_status: decision.label().to_owned(),
        system_mm_last_7d: journal.sum_mm(now, WINDOW_DAYS),
        // No rain gauge is integrated; the dashboard field is kept so the
        // payload stays forward-compatible.
        rain_mm_last_7d: 0.0,
        message,
    }
}

/// The earliest slot strictly after `now` today, else the first slot
/// tomorrow.  `slots` is sorted by construction.
pub fn next_scheduled(
    now: chrono::NaiveDateTime,
    slots: &[slots::TimeSlot],
) -> Option<chrono::NaiveDateTime> {
    slots
        .iter()
        .map(|slot| slot.on(now.date()))
        .find(|at| *at > now)
        .or_else(|| {
            slots
                .first()
                .map(|slot| slot.on(now.date() + chrono::Duration::days(1)))
        })
}

/// Pushes status snapshots to the dashboard on a fixed cadence.  A failed
/// push is logged and retried on the next cycle, never fatal.
pub struct Reporter {
    journal: journal::EventLog,
    slots: Vec<slots::TimeSlot>,
    agent: ureq::Agent,
    url: String,
    interval: time::Duration,
}

impl Reporter {
    pub fn new(
        journal: journal::EventLog,
        slots: Vec<slots::TimeSlot>,
        dashboard: &settings::Dashboard,
        interval: time::Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(time::Duration::from_secs(dashboard.timeout_secs))
            .build();

        Reporter {
            journal,
            slots,
            agent,
            url: dashboard.url.clone(),
            interval,
        }
    }

    pub fn run<C, G>(&self, clock: &C, gate: &G, running: &atomic::AtomicBool)
    where
        C: clock::Clock,
        G: weather::RainCheck,
    {
        while running.load(atomic::Ordering::SeqCst) {
            let snapshot = build_snapshot(clock.now(), &self.journal, &self.slots, gate.decide());
            self.push(&snapshot);
            clock.sleep(self.interval);
        }
    }

    fn push(&self, snapshot: &StatusSnapshot) {
        match self.agent.post(&self.url).send_json(snapshot) {
            Ok(response) => debug!("pushed status"; "status" => response.status()),
            Err(e) => warn!("could not push status, will retry next cycle: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::weather::RainDecision;

    fn at(h: u32, m: u32) -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 23)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn default_slots() -> Vec<slots::TimeSlot> {
        slots::parse_times("06:00,18:00").unwrap()
    }

    #[test]
    fn next_scheduled_picks_the_upcoming_slot_today() {
        let next = next_scheduled(at(7, 30), &default_slots()).unwrap();
        assert_eq!(next, at(18, 0));
    }

    #[test]
    fn next_scheduled_wraps_to_tomorrow_after_the_last_slot() {
        let next = next_scheduled(at(19, 0), &default_slots()).unwrap();
        assert_eq!(next, at(6, 0) + chrono::Duration::days(1));
    }

    #[test]
    fn next_scheduled_is_strictly_after_now() {
        // At exactly 06:00 the running slot is no longer "next".
        let next = next_scheduled(at(6, 0), &default_slots()).unwrap();
        assert_eq!(next, at(18, 0));
    }

    #[test]
    fn next_scheduled_is_none_without_slots() {
        assert!(next_scheduled(at(7, 0), &[]).is_none());
    }

    #[test]
    fn snapshot_reflects_journal_and_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal::EventLog::new(dir.path().join("log.jsonl"));
        journal
            .record(&journal::WateringEvent::new(at(6, 0), 20))
            .unwrap();

        let snapshot = build_snapshot(at(7, 0), &journal, &default_slots(), RainDecision::Clear);

        assert_eq!(snapshot.last_watered.as_deref(), Some("2026-08-23 06:00:00"));
        assert_eq!(
            snapshot.next_scheduled.as_deref(),
            Some("2026-08-23 18:00:00")
        );
        assert_eq!(snapshot.rain_status, "No rain in last 24h");
        assert!((snapshot.system_mm_last_7d - 20.0 * journal::MM_PER_SECOND).abs() < 1e-9);
        assert_eq!(snapshot.rain_mm_last_7d, 0.0);
        assert_eq!(snapshot.message, "System running normally.");
    }

    #[test]
    fn snapshot_flags_unknown_weather() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal::EventLog::new(dir.path().join("log.jsonl"));

        let snapshot =
            build_snapshot(at(7, 0), &journal, &default_slots(), RainDecision::Unknown);

        assert!(snapshot.last_watered.is_none());
        assert_eq!(snapshot.rain_status, "Weather data unavailable");
        assert!(snapshot.message.contains("fail-open"));
    }

    #[test]
    fn snapshot_serializes_with_the_dashboard_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal::EventLog::new(dir.path().join("log.jsonl"));

        let snapshot = build_snapshot(at(7, 0), &journal, &default_slots(), RainDecision::Clear);
        let value = serde_json::to_value(&snapshot).unwrap();

        for field in &[
            "last_watered",
            "next_scheduled",
            "rain_status",
            "system_mm_last_7d",
            "rain_mm_last_7d",
            "message",
        ] {
            assert!(value.get(*field).is_some(), "missing field {}", field);
        }
    }
}
