//! Periodic cleanup of expiring in-memory state.

use std::{
  sync::{Arc, Weak},
  time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// Something with expired entries to drop.
pub trait Sweep: Send + Sync + 'static {
  /// Label used in log lines.
  fn name(&self) -> &'static str;

  /// Remove expired entries, returning how many were dropped.
  fn sweep(&self) -> usize;
}

/// Owns the background task sweeping one target.
///
/// The task stops when the `Sweeper` is dropped or when the target itself is
/// dropped, whichever comes first.
pub struct Sweeper {
  handle: JoinHandle<()>,
}

impl Sweeper {
  /// Sweep `target` every `every`, starting one interval from now.
  pub fn spawn<T: Sweep>(target: &Arc<T>, every: Duration) -> Self {
    let target: Weak<T> = Arc::downgrade(target);
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // The first tick completes immediately.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let Some(live) = target.upgrade() else { break };
        let removed = live.sweep();
        if removed > 0 {
          tracing::debug!(sweeper = live.name(), removed, "swept expired entries");
        }
      }
    });
    Self { handle }
  }

  pub fn is_running(&self) -> bool { !self.handle.is_finished() }
}

impl Drop for Sweeper {
  fn drop(&mut self) { self.handle.abort(); }
}
