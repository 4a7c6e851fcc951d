use std::sync::atomic::{AtomicU64, Ordering};

/// Event counters the supervisor bumps as it works its queue, shared with
/// the embedder through `Session::coverage`.
///
/// These count events, not messages in flight: `queued` and `sent` drift
/// apart by exactly the number of messages discarded on disconnects.
#[derive(Debug, Default)]
pub struct Coverage {
  queued: AtomicU64,
  sent: AtomicU64,
  discarded: AtomicU64,
  overflow: AtomicU64,
}

impl Coverage {
  /// Messages accepted into the send queue.
  pub fn queued(&self) -> u64 {
    self.queued.load(Ordering::Relaxed)
  }

  /// Messages handed off to the transport.
  pub fn sent(&self) -> u64 {
    self.sent.load(Ordering::Relaxed)
  }

  /// Messages dropped from the queue by a disconnect.
  pub fn discarded(&self) -> u64 {
    self.discarded.load(Ordering::Relaxed)
  }

  /// Messages refused because a counter was at its limit, or submitted
  /// with a limit while disconnected.
  pub fn overflow(&self) -> u64 {
    self.overflow.load(Ordering::Relaxed)
  }

  pub(crate) fn record_queued(&self) {
    self.queued.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_sent(&self) {
    self.sent.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_discarded(&self) {
    self.discarded.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_overflow(&self) {
    self.overflow.fetch_add(1, Ordering::Relaxed);
  }
}
