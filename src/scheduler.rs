use std::collections;
use std::sync::atomic;
use std::time;

use itertools::Itertools;
use slog_scope::{debug, error, info};

use crate::clock;
use crate::journal;
use crate::relay;
use crate::slots;
use crate::weather;

/// What causes waterings to fire.
enum Trigger {
    /// Fixed wall-clock slots, each firing at most once per calendar day.
    /// `day` is the date the fired set belongs to; the set is cleared when
    /// the date rolls over, which realizes the midnight reset and also
    /// covers a process started mid-day.
    Slots {
        slots: Vec<slots::TimeSlot>,
        fired: collections::HashSet<slots::TimeSlot>,
        day: Option<chrono::NaiveDate>,
    },
    /// Fixed frequency, anchored on elapsed time rather than wall-clock
    /// slots; no de-duplication state is needed.
    Every {
        interval: chrono::Duration,
        last: Option<chrono::NaiveDateTime>,
    },
}

/// The decision loop: on every tick, find due triggers, consult the rain
/// gate, pulse the relay and journal the outcome.
pub struct Scheduler<R, G>
where
    R: relay::Relay,
    G: weather::RainCheck,
{
    trigger: Trigger,
    actuator: relay::Actuator<R>,
    gate: G,
    journal: journal::EventLog,
    duration: time::Duration,
    dry_run: bool,
}

impl<R, G> Scheduler<R, G>
where
    R: relay::Relay,
    G: weather::RainCheck,
{
    pub fn with_slots(
        slots: Vec<slots::TimeSlot>,
        actuator: relay::Actuator<R>,
        gate: G,
        journal: journal::EventLog,
        duration: time::Duration,
        dry_run: bool,
    ) -> Result<Self, slots::ConfigError> {
        if slots.is_empty() {
            return Err(slots::ConfigError::NothingToTrigger);
        }

        info!("watering at {}", slots.iter().join(", "); "dry_run" => dry_run);

        Ok(Scheduler {
            trigger: Trigger::Slots {
                slots,
                fired: collections::HashSet::new(),
                day: None,
            },
            actuator,
            gate,
            journal,
            duration,
            dry_run,
        })
    }

    pub fn with_frequency(
        every: time::Duration,
        actuator: relay::Actuator<R>,
        gate: G,
        journal: journal::EventLog,
        duration: time::Duration,
        dry_run: bool,
    ) -> Self {
        info!("watering every {}s", every.as_secs(); "dry_run" => dry_run);

        Scheduler {
            trigger: Trigger::Every {
                interval: chrono::Duration::from_std(every).unwrap_or_else(|_| {
                    chrono::Duration::seconds(every.as_secs() as i64)
                }),
                last: None,
            },
            actuator,
            gate,
            journal,
            duration,
            dry_run,
        }
    }

    pub fn run<C>(
        &mut self,
        clock: &C,
        poll_interval: time::Duration,
        running: &atomic::AtomicBool,
    ) -> Result<(), failure::Error>
    where
        C: clock::Clock,
    {
        while running.load(atomic::Ordering::SeqCst) {
            self.tick(clock)?;
            clock.sleep(poll_interval);
        }

        info!("watering loop stopped");

        Ok(())
    }

    /// One pass of the decision loop.  Only a relay fault is propagated;
    /// everything else degrades locally.
    pub fn tick<C>(&mut self, clock: &C) -> Result<(), failure::Error>
    where
        C: clock::Clock,
    {
        let now = clock.now();

        for trigger in self.due_triggers(now) {
            self.water(clock, now, &trigger)?;
        }

        Ok(())
    }

    /// Collects triggers due at `now`, marking them as fired up front so a
    /// slot cannot re-fire within the same minute even when the rain gate
    /// skips the watering.
    fn due_triggers(&mut self, now: chrono::NaiveDateTime) -> Vec<String> {
        match self.trigger {
            Trigger::Slots {
                ref slots,
                ref mut fired,
                ref mut day,
            } => {
                if *day != Some(now.date()) {
                    if day.is_some() {
                        debug!("new day, resetting fired slots");
                    }
                    fired.clear();
                    *day = Some(now.date());
                }

                slots
                    .iter()
                    .filter(|slot| slot.matches(now) && !fired.contains(*slot))
                    .cloned()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(|slot| {
                        fired.insert(slot);
                        format!("slot {}", slot)
                    })
                    .collect()
            }
            Trigger::Every {
                interval,
                ref mut last,
            } => {
                let due = last.map_or(true, |last| now - last >= interval);

                if due {
                    *last = Some(now);
                    vec![format!("every {}s", interval.num_seconds())]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn water<C>(
        &mut self,
        clock: &C,
        now: chrono::NaiveDateTime,
        trigger: &str,
    ) -> Result<(), failure::Error>
    where
        C: clock::Clock,
    {
        let decision = self.gate.decide();

        if decision.blocks_watering() {
            info!("skipping watering, it rained"; "trigger" => trigger);
            return Ok(());
        }

        info!("watering";
              "trigger" => trigger,
              "seconds" => self.duration.as_secs(),
              "rain_check" => decision.label());
        self.actuator.pulse(clock, self.duration, self.dry_run)?;

        if !self.dry_run {
            let event = journal::WateringEvent::new(now, self.duration.as_secs());
            if let Err(e) = self.journal.record(&event) {
                error!("could not record watering event: {}", e);
            }
        }

        Ok(())
    }
}
