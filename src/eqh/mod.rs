//! The dispatch loop: drains transport events and routes them to sessions.

mod config;
mod in_use;
mod registry;
mod thread;

pub use config::{EqhConfig, DEFAULT_DISPATCH_THREAD_NAME, DEFAULT_MAX_EVENTS_PER_RUN, DEFAULT_POLL_TIMEOUT};
pub use thread::DispatchThread;

use crate::error::XioError;
use crate::event::{Event, RawEvent};
use crate::message::Msg;
use crate::session::SessionCore;
use crate::transport::{LoopHandle, MsgHandle, NativeTransport, SessionHandle};

use in_use::InUseTracker;
use registry::SessionRegistry;

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

pub(crate) struct EqhInner {
  transport: Arc<dyn NativeTransport>,
  loop_handle: LoopHandle,
  config: EqhConfig,
  registry: RwLock<SessionRegistry<SessionCore>>,
  in_use: Mutex<InUseTracker>,
  /// Held for the duration of a dispatch step or run; only one thread drains at a time.
  dispatch_lock: Mutex<()>,
  break_requested: AtomicBool,
  closed: AtomicBool,
}

impl Drop for EqhInner {
  fn drop(&mut self) {
    if !self.closed.load(Ordering::Acquire) {
      debug!(loop_handle = %self.loop_handle, "EventQueueHandler dropped without close; releasing event queue");
      self.transport.close_event_queue(self.loop_handle);
    }
  }
}

/// One event queue of the transport together with the sessions multiplexed on it.
///
/// `EventQueueHandler` is a cheap, cloneable handle. Sessions keep a clone to reach
/// the transport and the bookkeeping; the handler itself only keeps non-owning
/// references to sessions, keyed by their transport handle.
///
/// Events are dispatched by whichever thread calls [`run_event_loop`](Self::run_event_loop)
/// or [`dispatch_next`](Self::dispatch_next) (usually a [`DispatchThread`]). Session
/// callbacks run synchronously on that thread.
#[derive(Clone)]
pub struct EventQueueHandler {
  inner: Arc<EqhInner>,
}

impl fmt::Debug for EventQueueHandler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventQueueHandler")
      .field("loop_handle", &self.inner.loop_handle)
      .field("sessions", &self.session_count())
      .field("in_use", &self.in_use_count())
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}

impl EventQueueHandler {
  /// Opens an event queue on `transport`.
  pub fn new(transport: Arc<dyn NativeTransport>, config: EqhConfig) -> Result<Self, XioError> {
    let loop_handle = transport.open_event_queue()?;
    if !loop_handle.is_valid() {
      error!("Transport returned an invalid event queue handle");
      return Err(XioError::Transport("invalid event queue handle".into()));
    }
    info!(loop_handle = %loop_handle, "EventQueueHandler created");
    Ok(Self {
      inner: Arc::new(EqhInner {
        transport,
        loop_handle,
        config,
        registry: RwLock::new(SessionRegistry::new()),
        in_use: Mutex::new(InUseTracker::new()),
        dispatch_lock: Mutex::new(()),
        break_requested: AtomicBool::new(false),
        closed: AtomicBool::new(false),
      }),
    })
  }

  /// Opens an event queue with the default configuration.
  pub fn with_transport(transport: Arc<dyn NativeTransport>) -> Result<Self, XioError> {
    Self::new(transport, EqhConfig::default())
  }

  pub fn loop_handle(&self) -> LoopHandle {
    self.inner.loop_handle
  }

  pub fn config(&self) -> &EqhConfig {
    &self.inner.config
  }

  pub(crate) fn transport(&self) -> &Arc<dyn NativeTransport> {
    &self.inner.transport
  }

  pub fn is_closed(&self) -> bool {
    self.inner.closed.load(Ordering::Acquire)
  }

  // --- Session registry ---

  /// Adds a routing entry for `session`. Returns `false` when the session has no
  /// valid handle and therefore can never be routed to.
  pub(crate) fn register(&self, session: &Arc<SessionCore>) -> bool {
    let handle = session.handle();
    let routable = self.inner.registry.write().insert(handle, session);
    debug!(session = %handle, routable, loop_handle = %self.inner.loop_handle, "Session registered");
    routable
  }

  /// Removes the routing entry for `handle`. Idempotent; returns whether an entry was removed.
  pub fn deregister(&self, handle: SessionHandle) -> bool {
    self.inner.registry.write().remove(handle)
  }

  pub fn is_registered(&self, handle: SessionHandle) -> bool {
    self.inner.registry.read().contains(handle)
  }

  pub fn session_count(&self) -> usize {
    self.inner.registry.read().len()
  }

  // --- In-use message tracking ---

  /// Hands `msg` to the tracker. Refused once `close()` started, since nothing
  /// would drain the tracker afterwards.
  pub(crate) fn track_in_use(&self, msg: Msg) -> Result<(), Msg> {
    let mut in_use = self.inner.in_use.lock();
    if self.is_closed() {
      return Err(msg);
    }
    in_use.add(msg)
  }

  pub(crate) fn release_for_session(&self, handle: MsgHandle, session: SessionHandle) -> Option<Msg> {
    self.inner.in_use.lock().take_for_session(handle, session)
  }

  pub(crate) fn release_all_for(&self, session: SessionHandle) -> Vec<Msg> {
    self.inner.in_use.lock().take_all_for_session(session)
  }

  /// True while the transport may still reference the message's buffer.
  pub fn is_in_use(&self, handle: MsgHandle) -> bool {
    self.inner.in_use.lock().contains(handle)
  }

  pub fn in_use_count(&self) -> usize {
    self.inner.in_use.lock().len()
  }

  // --- Dispatch ---

  fn try_dispatch_guard(&self) -> Result<MutexGuard<'_, ()>, XioError> {
    if self.is_closed() {
      return Err(XioError::InvalidState("event queue handler is closed"));
    }
    self
      .inner
      .dispatch_lock
      .try_lock()
      .ok_or(XioError::InvalidState("another thread is already dispatching on this event queue"))
  }

  /// Pulls at most one event and routes it. Returns whether an event was pulled.
  pub fn dispatch_next(&self, timeout: Option<Duration>) -> Result<bool, XioError> {
    let _guard = self.try_dispatch_guard()?;
    Ok(self.dispatch_one(timeout))
  }

  /// Dispatches events until `max_events` have been handled (`0` = no cap), a poll
  /// comes back empty, or [`break_event_loop`](Self::break_event_loop) is called.
  ///
  /// Returns the number of events pulled from the transport.
  pub fn run_event_loop(&self, max_events: usize, timeout: Option<Duration>) -> Result<usize, XioError> {
    let _guard = self.try_dispatch_guard()?;
    let mut handled = 0;
    loop {
      if self.inner.break_requested.swap(false, Ordering::AcqRel) {
        // The wakeup that came with the break found no blocked poll.
        self.inner.transport.discard_wakeup(self.inner.loop_handle);
        debug!(loop_handle = %self.inner.loop_handle, handled, "Event loop break requested");
        break;
      }
      if self.is_closed() {
        break;
      }
      if max_events != 0 && handled >= max_events {
        break;
      }
      if !self.dispatch_one(timeout) {
        break;
      }
      handled += 1;
    }
    trace!(loop_handle = %self.inner.loop_handle, handled, "Event loop run finished");
    Ok(handled)
  }

  /// Runs the event loop with the configured limits.
  pub fn run(&self) -> Result<usize, XioError> {
    self.run_event_loop(self.inner.config.max_events_per_run, self.inner.config.poll_timeout)
  }

  /// Makes the current (or next) `run_event_loop` return as soon as possible.
  pub fn break_event_loop(&self) {
    self.inner.break_requested.store(true, Ordering::Release);
    self.inner.transport.wakeup(self.inner.loop_handle);
  }

  /// Forgets a break (and its wakeup) that no run consumed.
  pub(crate) fn clear_break(&self) {
    self.inner.break_requested.store(false, Ordering::Release);
    self.inner.transport.discard_wakeup(self.inner.loop_handle);
  }

  fn dispatch_one(&self, timeout: Option<Duration>) -> bool {
    match self.inner.transport.poll_next_event(self.inner.loop_handle, timeout) {
      Some(raw) => {
        self.route(raw);
        true
      }
      None => false,
    }
  }

  fn route(&self, raw: RawEvent) {
    let event = match Event::try_from(raw) {
      Ok(event) => event,
      Err(e) => {
        warn!(loop_handle = %self.inner.loop_handle, error = %e, "Dropping undecodable transport event");
        return;
      }
    };
    let handle = event.session;
    let kind = event.kind.name();
    trace!(session = %handle, kind, "Dispatching event");

    // The registry lock is released before the session runs user callbacks.
    let session = self.inner.registry.read().get(handle);
    let Some(session) = session else {
      warn!(session = %handle, kind, "Dropping event for unregistered session");
      return;
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| session.on_event(event))) {
      error!(
        session = %handle,
        kind,
        "Session event handler panicked: {}",
        panic_message(&*payload)
      );
    }
  }

  /// Stops dispatching, drops any messages still in use, forgets all sessions and
  /// releases the transport event queue. Idempotent.
  pub fn close(&self) {
    if self.inner.closed.swap(true, Ordering::AcqRel) {
      debug!(loop_handle = %self.inner.loop_handle, "EventQueueHandler already closed");
      return;
    }
    self.break_event_loop();

    let orphaned = self.inner.in_use.lock().drain_all();
    if !orphaned.is_empty() {
      warn!(
        loop_handle = %self.inner.loop_handle,
        count = orphaned.len(),
        "Closing event queue with messages still in use"
      );
    }
    drop(orphaned);

    let sessions = self.inner.registry.write().clear();
    self.inner.transport.close_event_queue(self.inner.loop_handle);
    info!(loop_handle = %self.inner.loop_handle, sessions, "EventQueueHandler closed");
  }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
  payload
    .downcast_ref::<&str>()
    .copied()
    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
    .unwrap_or("<non-string panic payload>")
}
