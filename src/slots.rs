use std::fmt;
use std::str;

use chrono::Timelike;
use failure::Fail;

/// A wall-clock watering trigger point.  The configured set is fixed at
/// startup, sorted and de-duplicated.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TimeSlot {
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "invalid time {:?}: expected HH:MM with 0 <= HH < 24 and 0 <= MM < 60", _0)]
    InvalidTime(String),
    #[fail(display = "no watering times configured; pass --times or use --every")]
    NothingToTrigger,
    #[fail(display = "poll interval of {}s exceeds the 60s bound", _0)]
    PollIntervalTooCoarse(u64),
}

impl TimeSlot {
    pub fn matches(&self, now: chrono::NaiveDateTime) -> bool {
        now.hour() == self.hour && now.minute() == self.minute
    }

    pub fn on(&self, date: chrono::NaiveDate) -> chrono::NaiveDateTime {
        // In range by construction; parsing rejects anything else.
        date.and_hms_opt(self.hour, self.minute, 0).unwrap()
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl str::FromStr for TimeSlot {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts = raw.split(':').collect::<Vec<_>>();

        if parts.len() != 2 {
            return Err(ConfigError::InvalidTime(raw.to_owned()));
        }

        let hour = parts[0]
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidTime(raw.to_owned()))?;
        let minute = parts[1]
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidTime(raw.to_owned()))?;

        if hour >= 24 || minute >= 60 {
            return Err(ConfigError::InvalidTime(raw.to_owned()));
        }

        Ok(TimeSlot { hour, minute })
    }
}

/// Parses a comma-separated `"HH:MM,HH:MM"` spec into a sorted,
/// de-duplicated slot list.  An empty spec yields an empty list; whether
/// that is acceptable depends on the trigger mode and is checked by the
/// caller.
pub fn parse_times(spec: &str) -> Result<Vec<TimeSlot>, ConfigError> {
    let mut slots = spec
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<TimeSlot>, _>>()?;

    slots.sort();
    slots.dedup();

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_time() {
        let slot = "06:00".parse::<TimeSlot>().unwrap();
        assert_eq!(
            slot,
            TimeSlot {
                hour: 6,
                minute: 0
            }
        );
    }

    #[test]
    fn parses_default_spec_in_order() {
        let slots = parse_times("18:00,06:00").unwrap();
        assert_eq!(
            slots,
            vec![
                TimeSlot {
                    hour: 6,
                    minute: 0
                },
                TimeSlot {
                    hour: 18,
                    minute: 0
                },
            ]
        );
    }

    #[test]
    fn deduplicates_repeated_slots() {
        let slots = parse_times("06:00,06:00,18:00").unwrap();
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn empty_spec_yields_empty_list() {
        assert!(parse_times("").unwrap().is_empty());
        assert!(parse_times(" , ").unwrap().is_empty());
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        for raw in &["24:00", "06:60", "6", "aa:bb", "06:00:00", "-1:30"] {
            assert!(raw.parse::<TimeSlot>().is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn matches_on_minute_equality() {
        let slot = TimeSlot {
            hour: 6,
            minute: 30,
        };
        let now = chrono::NaiveDate::from_ymd_opt(2026, 8, 23)
            .unwrap()
            .and_hms_opt(6, 30, 42)
            .unwrap();
        assert!(slot.matches(now));
        assert!(!slot.matches(now + chrono::Duration::minutes(1)));
    }
}
