use std::time::{Duration, Instant};

/// Monotonic time in whole seconds.
///
/// The supervisor never reads ambient time; everything it decides is
/// relative to the clock it was built with, which is also what makes its
/// timeouts testable.
pub trait Clock {
  fn now(&self) -> u64;
}

/// Seconds elapsed since the clock was created.
pub struct MonotonicClock {
  origin: Instant,
}

impl MonotonicClock {
  pub fn new() -> Self {
    Self { origin: Instant::now() }
  }
}

impl Default for MonotonicClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for MonotonicClock {
  fn now(&self) -> u64 {
    self.origin.elapsed().as_secs()
  }
}

/// Wake-up registration offered to `Session::run_wait`.
///
/// The two primitives mirror what a poll-based event loop can do between
/// iterations: sleep for at most so long, or not sleep at all.
pub trait Scheduler {
  /// Request a wake-up no later than `secs` seconds from now.
  fn wake_after(&mut self, secs: u64);

  /// Request that the next blocking wait return immediately.
  fn wake_now(&mut self);
}

/// Collects wake requests into the timeout to hand a blocking poll.
#[derive(Debug, Default)]
pub struct WakeTimer {
  earliest: Option<u64>,
  immediate: bool,
}

impl WakeTimer {
  pub fn new() -> Self {
    Self::default()
  }

  /// The poll timeout implied by the requests so far; `None` if nothing
  /// asked to be woken at all.
  pub fn timeout(&self) -> Option<Duration> {
    if self.immediate {
      return Some(Duration::ZERO);
    }
    self.earliest.map(Duration::from_secs)
  }
}

impl Scheduler for WakeTimer {
  fn wake_after(&mut self, secs: u64) {
    self.earliest = Some(match self.earliest {
      Some(earliest) => earliest.min(secs),
      None => secs,
    });
  }

  fn wake_now(&mut self) {
    self.immediate = true;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn no_requests_means_no_timeout() {
    assert_eq!(WakeTimer::new().timeout(), None);
  }

  #[test]
  fn earliest_request_wins() {
    let mut timer = WakeTimer::new();
    timer.wake_after(30);
    timer.wake_after(5);
    timer.wake_after(10);
    assert_eq!(timer.timeout(), Some(Duration::from_secs(5)));
  }

  #[test]
  fn immediate_trumps_everything() {
    let mut timer = WakeTimer::new();
    timer.wake_after(5);
    timer.wake_now();
    assert_eq!(timer.timeout(), Some(Duration::ZERO));
  }

  #[test]
  fn monotonic_clock_does_not_go_backwards() {
    let clock = MonotonicClock::new();
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
  }
}
