use std::fs;
use std::io;
use std::path;

use serde_derive::{Deserialize, Serialize};
use slog_scope::debug;

use std::io::BufRead;
use std::io::Write;

/// Millimetres of water applied per second of pulse, from the emitter
/// calibration of the installed drip line.
pub const MM_PER_SECOND: f64 = 0.2;

/// One watering action.  Immutable once appended; the timestamp is
/// timezone-naive local time and serializes to ISO-8601.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WateringEvent {
    pub timestamp: chrono::NaiveDateTime,
    pub duration: u64,
    pub mm_applied: f64,
}

impl WateringEvent {
    pub fn new(timestamp: chrono::NaiveDateTime, duration: u64) -> Self {
        WateringEvent {
            timestamp,
            duration,
            mm_applied: duration as f64 * MM_PER_SECOND,
        }
    }
}

/// Append-only journal of watering events, one JSON object per line.
///
/// The file is the only state shared between the watering and reporting
/// processes; each record is self-contained, so a reader never needs more
/// than line-level atomicity.
pub struct EventLog {
    path: path::PathBuf,
}

impl EventLog {
    pub fn new<P>(path: P) -> Self
    where
        P: Into<path::PathBuf>,
    {
        EventLog { path: path.into() }
    }

    pub fn record(&self, event: &WateringEvent) -> Result<(), failure::Error> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{}", line)?;

        Ok(())
    }

    /// Sums `mm_applied` over events within `window_days` of `now`.
    /// Malformed or partially written lines are skipped, never fatal.
    pub fn sum_mm(&self, now: chrono::NaiveDateTime, window_days: i64) -> f64 {
        let mut total = 0.0;

        self.scan(|event| {
            if (now - event.timestamp).num_days() < window_days {
                total += event.mm_applied;
            }
        });

        total
    }

    /// The newest well-formed record, if any.
    pub fn last_event(&self) -> Option<WateringEvent> {
        let mut last = None;

        self.scan(|event| last = Some(event));

        last
    }

    fn scan<F>(&self, mut visit: F)
    where
        F: FnMut(WateringEvent),
    {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(_) => return,
        };

        for line in io::BufReader::new(file).lines() {
            // A torn write can leave bytes that do not even read as UTF-8;
            // the reader has already consumed up to the newline, so the
            // records after it are still reachable.
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    debug!("skipping unreadable journal line: {}", e);
                    continue;
                }
            };

            match serde_json::from_str::<WateringEvent>(&line) {
                Ok(event) => visit(event),
                Err(e) => debug!("skipping malformed journal line: {}", e),
            }
        }
    }
}
