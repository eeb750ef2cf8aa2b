use std::thread;
use std::time;

/// Time source and sleeper for the polling loops.  Injected so tests can
/// advance time without real delays.
pub trait Clock {
    fn now(&self) -> chrono::NaiveDateTime;

    fn sleep(&self, duration: time::Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    fn sleep(&self, duration: time::Duration) {
        thread::sleep(duration);
    }
}
