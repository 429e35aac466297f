use super::EventQueueHandler;
use crate::error::XioError;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// A dedicated OS thread draining one `EventQueueHandler`.
///
/// Dropping the `DispatchThread` stops and joins it.
pub struct DispatchThread {
  eqh: EventQueueHandler,
  stop_requested: Arc<AtomicBool>,
  join_handle: Option<JoinHandle<Result<usize, XioError>>>,
}

impl fmt::Debug for DispatchThread {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DispatchThread")
      .field("loop_handle", &self.eqh.loop_handle())
      .field("stop_requested", &self.stop_requested.load(Ordering::Relaxed))
      .field("finished", &self.is_finished())
      .finish()
  }
}

impl DispatchThread {
  pub fn spawn(eqh: &EventQueueHandler) -> Result<Self, XioError> {
    let stop_requested = Arc::new(AtomicBool::new(false));
    let worker_eqh = eqh.clone();
    let worker_stop = stop_requested.clone();

    let join_handle = std::thread::Builder::new()
      .name(eqh.config().thread_name.clone())
      .spawn(move || run_dispatch_thread(worker_eqh, worker_stop))
      .map_err(|e| XioError::Internal(format!("Failed to spawn dispatch thread: {:?}", e)))?;

    Ok(Self {
      eqh: eqh.clone(),
      stop_requested,
      join_handle: Some(join_handle),
    })
  }

  pub fn eqh(&self) -> &EventQueueHandler {
    &self.eqh
  }

  pub fn is_finished(&self) -> bool {
    self.join_handle.as_ref().map_or(true, |h| h.is_finished())
  }

  /// Stops the thread and waits for it, returning the number of events it dispatched.
  pub fn stop(mut self) -> Result<usize, XioError> {
    self.shutdown()
  }

  fn shutdown(&mut self) -> Result<usize, XioError> {
    let Some(handle) = self.join_handle.take() else {
      return Ok(0);
    };
    self.stop_requested.store(true, Ordering::Release);
    self.eqh.break_event_loop();
    let result = handle
      .join()
      .map_err(|_| XioError::Internal("dispatch thread panicked".into()))?;
    // The break may not have been consumed if the thread was between runs.
    self.eqh.clear_break();
    result
  }
}

impl Drop for DispatchThread {
  fn drop(&mut self) {
    if self.join_handle.is_some() {
      if let Err(e) = self.shutdown() {
        warn!(loop_handle = %self.eqh.loop_handle(), error = %e, "Dispatch thread ended with error");
      }
    }
  }
}

fn run_dispatch_thread(eqh: EventQueueHandler, stop_requested: Arc<AtomicBool>) -> Result<usize, XioError> {
  let loop_handle = eqh.loop_handle();
  let config = eqh.config().clone();
  info!(loop_handle = %loop_handle, "Dispatch thread started");

  let mut total = 0usize;
  while !stop_requested.load(Ordering::Acquire) && !eqh.is_closed() {
    match eqh.run_event_loop(config.max_events_per_run, config.poll_timeout) {
      Ok(handled) => {
        total += handled;
        if handled == 0 && config.poll_timeout.is_none() {
          std::thread::yield_now();
        }
      }
      Err(_) if eqh.is_closed() => break,
      Err(e) => {
        error!(loop_handle = %loop_handle, error = %e, "Dispatch thread stopping on error");
        return Err(e);
      }
    }
  }

  info!(loop_handle = %loop_handle, total, "Dispatch thread finished");
  Ok(total)
}
