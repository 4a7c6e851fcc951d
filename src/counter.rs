use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

/// Counts how many of a caller's messages are still sitting in a send
/// queue.
///
/// The caller keeps one `Arc`, passes the counter along with each send,
/// and reads [`count`](PacketCounter::count) to decide whether to keep
/// submitting (see `Session::send_with_limit`). Every queued message holds
/// its own clone of the `Arc`, so the allocation stays alive until the
/// caller has dropped its references *and* nothing is in flight any more,
/// whichever comes last.
#[derive(Debug, Default)]
pub struct PacketCounter {
  n: AtomicUsize,
}

impl PacketCounter {
  pub fn new() -> Arc<Self> {
    Arc::new(Self { n: AtomicUsize::new(0) })
  }

  /// Number of messages currently in flight.
  #[inline]
  pub fn count(&self) -> usize {
    self.n.load(Ordering::Relaxed)
  }

  pub(crate) fn inc(&self) {
    self.n.fetch_add(1, Ordering::Relaxed);
  }

  /// # Panics
  /// If no message is in flight; a decrement must always pair with an
  /// earlier increment.
  pub(crate) fn dec(&self) {
    let prev = self.n.fetch_sub(1, Ordering::Relaxed);
    assert!(prev > 0, "packet counter decremented below zero");
  }
}
