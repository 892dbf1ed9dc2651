use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

/// Shared flag that stops a run before its next solve.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn cancel(&self) {
    self.0.store(true, Ordering::Release);
  }
  /// Clears the flag so that later runs proceed.
  pub fn reset(&self) {
    self.0.store(false, Ordering::Release);
  }
  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Acquire)
  }
}
