use std::time::Duration;

/// Default time a dispatch step blocks waiting for the next transport event.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Default cap on events handled by one `run_event_loop` call. `0` means no cap.
pub const DEFAULT_MAX_EVENTS_PER_RUN: usize = 0;
/// Name given to the OS thread spawned by `DispatchThread`.
pub const DEFAULT_DISPATCH_THREAD_NAME: &str = "rxio-eqh-dispatch";

#[derive(Debug, Clone)]
pub struct EqhConfig {
  /// `None` polls without blocking; `Some(d)` blocks up to `d` for each event.
  pub poll_timeout: Option<Duration>,
  pub max_events_per_run: usize,
  pub thread_name: String,
}

impl Default for EqhConfig {
  fn default() -> Self {
    Self {
      poll_timeout: Some(DEFAULT_POLL_TIMEOUT),
      max_events_per_run: DEFAULT_MAX_EVENTS_PER_RUN,
      thread_name: DEFAULT_DISPATCH_THREAD_NAME.to_string(),
    }
  }
}

impl EqhConfig {
  /// Switches to non-blocking polling.
  pub fn polling(mut self) -> Self {
    self.poll_timeout = None;
    self
  }

  pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
    self.poll_timeout = Some(timeout);
    self
  }

  pub fn with_max_events_per_run(mut self, max_events: usize) -> Self {
    self.max_events_per_run = max_events;
    self
  }

  pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
    self.thread_name = name.into();
    self
  }
}
