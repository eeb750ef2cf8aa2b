use std::time;

use slog_scope::{error, info};

use crate::clock;

/// Binary on/off interface to the water valve relay.
pub trait Relay {
    fn set_active(&mut self, active: bool) -> Result<(), failure::Error>;
}

/// Relay driven through a sysfs GPIO pin.  The pin is exported with its
/// deasserted level so the valve stays closed from the moment the process
/// takes over, and `Drop` forces it closed again before unexporting.
pub struct GpioRelay {
    pin: sysfs_gpio::Pin,
    active_low: bool,
}

impl GpioRelay {
    pub fn new(pin: u64, active_low: bool) -> Result<Self, failure::Error> {
        let pin = sysfs_gpio::Pin::new(pin);
        pin.export()?;
        pin.set_direction(if active_low {
            sysfs_gpio::Direction::High
        } else {
            sysfs_gpio::Direction::Low
        })?;

        Ok(GpioRelay { pin, active_low })
    }
}

impl Relay for GpioRelay {
    fn set_active(&mut self, active: bool) -> Result<(), failure::Error> {
        let level = if active != self.active_low { 1 } else { 0 };
        self.pin.set_value(level)?;
        Ok(())
    }
}

impl Drop for GpioRelay {
    fn drop(&mut self) {
        if let Err(e) = self.set_active(false) {
            error!("could not deactivate pin {}: {}", self.pin.get_pin(), e);
        }
        if let Err(e) = self.pin.unexport() {
            error!("could not unexport pin {}: {}", self.pin.get_pin(), e);
        }
    }
}

/// Stand-in for dry runs, where no GPIO may be exported or driven at all.
pub struct NullRelay;

impl Relay for NullRelay {
    fn set_active(&mut self, _active: bool) -> Result<(), failure::Error> {
        Ok(())
    }
}

/// Drives timed watering pulses.  A pulse holds the relay active for the
/// requested duration through a scoped guard, so the relay cannot stay
/// active past the pulse on any exit path.
pub struct Actuator<R> {
    relay: R,
}

impl<R> Actuator<R>
where
    R: Relay,
{
    pub fn new(relay: R) -> Self {
        Actuator { relay }
    }

    pub fn pulse<C>(
        &mut self,
        clock: &C,
        duration: time::Duration,
        dry_run: bool,
    ) -> Result<(), failure::Error>
    where
        C: clock::Clock,
    {
        if dry_run {
            info!("dry run: simulating pulse"; "seconds" => duration.as_secs());
            clock.sleep(duration);
            return Ok(());
        }

        let guard = PulseGuard::engage(&mut self.relay)?;
        clock.sleep(duration);
        guard.release()
    }
}

struct PulseGuard<'a, R>
where
    R: Relay,
{
    relay: &'a mut R,
    released: bool,
}

impl<'a, R> PulseGuard<'a, R>
where
    R: Relay,
{
    fn engage(relay: &'a mut R) -> Result<Self, failure::Error> {
        relay.set_active(true)?;
        Ok(PulseGuard {
            relay,
            released: false,
        })
    }

    fn release(mut self) -> Result<(), failure::Error> {
        self.released = true;
        self.relay.set_active(false)
    }
}

impl<'a, R> Drop for PulseGuard<'a, R>
where
    R: Relay,
{
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.relay.set_active(false) {
                error!("could not deactivate relay after interrupted pulse: {}", e);
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell;
    use std::rc;

    use super::Relay;

    /// Records every `set_active` transition for assertions.
    #[derive(Clone)]
    pub struct MockRelay {
        pub transitions: rc::Rc<cell::RefCell<Vec<bool>>>,
        pub fail_on_activate: bool,
    }

    impl MockRelay {
        pub fn new() -> Self {
            MockRelay {
                transitions: rc::Rc::new(cell::RefCell::new(Vec::new())),
                fail_on_activate: false,
            }
        }

        pub fn failing() -> Self {
            MockRelay {
                fail_on_activate: true,
                ..MockRelay::new()
            }
        }
    }

    impl Relay for MockRelay {
        fn set_active(&mut self, active: bool) -> Result<(), failure::Error> {
            if active && self.fail_on_activate {
                return Err(failure::err_msg("relay write failed"));
            }
            self.transitions.borrow_mut().push(active);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockRelay;
    use super::*;

    use crate::clock::testing::ManualClock;

    fn start() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 23)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    #[test]
    fn pulse_activates_then_deactivates() {
        let relay = MockRelay::new();
        let transitions = relay.transitions.clone();
        let clock = ManualClock::new(start());

        let mut actuator = Actuator::new(relay);
        actuator
            .pulse(&clock, time::Duration::from_secs(20), false)
            .unwrap();

        assert_eq!(*transitions.borrow(), vec![true, false]);
        assert_eq!(clock.total_slept(), time::Duration::from_secs(20));
    }

    #[test]
    fn dry_run_sleeps_but_never_touches_the_relay() {
        let relay = MockRelay::new();
        let transitions = relay.transitions.clone();
        let clock = ManualClock::new(start());

        let mut actuator = Actuator::new(relay);
        actuator
            .pulse(&clock, time::Duration::from_secs(20), true)
            .unwrap();

        assert!(transitions.borrow().is_empty());
        assert_eq!(clock.total_slept(), time::Duration::from_secs(20));
    }

    #[test]
    fn failed_activation_propagates_and_leaves_relay_untouched() {
        let relay = MockRelay::failing();
        let transitions = relay.transitions.clone();
        let clock = ManualClock::new(start());

        let mut actuator = Actuator::new(relay);
        let result = actuator.pulse(&clock, time::Duration::from_secs(20), false);

        assert!(result.is_err());
        // The activation never took effect, so there is nothing to undo.
        assert!(transitions.borrow().is_empty());
    }
}
