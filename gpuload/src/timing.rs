use quanta::{Clock, Instant};
use std::time::Duration;

pub(crate) struct Stopwatch<'a> {
    clock: &'a Clock,
    start: Instant,
}

impl<'a> Stopwatch<'a> {
    pub fn start(clock: &'a Clock) -> Self {
        Self {
            clock,
            start: clock.now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }
}

pub(crate) fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
