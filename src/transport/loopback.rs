//! An in-process transport that completes every operation locally.
//!
//! `LoopbackTransport` behaves like a well-mannered native engine whose peer
//! answers every request immediately: creating a session queues a
//! `SessionEstablished` event, every sent message is echoed back as a reply, and
//! closing a session queues the teardown event. Failures and arbitrary raw events
//! can be injected, and every primitive call is counted, which makes it the
//! transport used by the crate's own tests and benchmarks.

use crate::error::XioError;
use crate::event::{RawEvent, SessionEventCode};
use crate::message::MsgFlags;
use crate::transport::{LoopHandle, MsgHandle, NativeTransport, SessionHandle};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Reason string carried by the teardown event queued on close.
pub const LOOPBACK_TEARDOWN_REASON: &str = "session closed by application";

#[derive(Debug, Clone, Copy)]
pub struct LoopbackConfig {
  /// Handle given to the first session created; later sessions count up from it.
  pub first_session_handle: u64,
  /// Queue a `SessionEstablished` event when a session is created.
  pub auto_establish: bool,
  /// Queue a reply carrying the request payload for every sent message.
  pub echo_replies: bool,
  /// Queue the teardown event when a session is closed.
  pub teardown_on_close: bool,
}

impl Default for LoopbackConfig {
  fn default() -> Self {
    Self {
      first_session_handle: 1,
      auto_establish: true,
      echo_replies: true,
      teardown_on_close: true,
    }
  }
}

impl LoopbackConfig {
  pub fn with_first_session_handle(mut self, handle: u64) -> Self {
    self.first_session_handle = handle.max(1);
    self
  }

  pub fn with_auto_establish(mut self, enabled: bool) -> Self {
    self.auto_establish = enabled;
    self
  }

  pub fn with_echo_replies(mut self, enabled: bool) -> Self {
    self.echo_replies = enabled;
    self
  }

  pub fn with_teardown_on_close(mut self, enabled: bool) -> Self {
    self.teardown_on_close = enabled;
    self
  }
}

#[derive(Debug, Default)]
struct QueueState {
  events: VecDeque<RawEvent>,
  woken: bool,
}

#[derive(Debug, Default)]
struct EventQueue {
  state: Mutex<QueueState>,
  ready: Condvar,
}

impl EventQueue {
  fn push(&self, event: RawEvent) {
    self.state.lock().events.push_back(event);
    self.ready.notify_one();
  }

  fn wake(&self) {
    self.state.lock().woken = true;
    self.ready.notify_all();
  }

  fn discard_wake(&self) {
    self.state.lock().woken = false;
  }

  fn pop(&self, timeout: Option<Duration>) -> Option<RawEvent> {
    let mut state = self.state.lock();
    if let Some(event) = state.events.pop_front() {
      return Some(event);
    }
    // A timeout too large to represent as an instant waits until woken or fed.
    let deadline = Instant::now().checked_add(timeout?);
    loop {
      if state.woken {
        state.woken = false;
        return None;
      }
      match deadline {
        Some(deadline) => {
          if self.ready.wait_until(&mut state, deadline).timed_out() {
            return state.events.pop_front();
          }
        }
        None => self.ready.wait(&mut state),
      }
      if let Some(event) = state.events.pop_front() {
        return Some(event);
      }
    }
  }
}

#[derive(Debug)]
pub struct LoopbackTransport {
  config: LoopbackConfig,
  next_loop: AtomicU64,
  next_session: AtomicU64,
  queues: RwLock<HashMap<LoopHandle, Arc<EventQueue>>>,
  /// Open sessions and the queue their events go to.
  sessions: Mutex<HashMap<SessionHandle, LoopHandle>>,

  fail_creates: AtomicBool,
  fail_sends: AtomicBool,
  fail_closes: AtomicBool,

  create_calls: AtomicUsize,
  send_calls: AtomicUsize,
  close_calls: AtomicUsize,
}

impl Default for LoopbackTransport {
  fn default() -> Self {
    Self::with_config(LoopbackConfig::default())
  }
}

impl LoopbackTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(config: LoopbackConfig) -> Self {
    Self {
      config,
      next_loop: AtomicU64::new(1),
      next_session: AtomicU64::new(config.first_session_handle.max(1)),
      queues: RwLock::new(HashMap::new()),
      sessions: Mutex::new(HashMap::new()),
      fail_creates: AtomicBool::new(false),
      fail_sends: AtomicBool::new(false),
      fail_closes: AtomicBool::new(false),
      create_calls: AtomicUsize::new(0),
      send_calls: AtomicUsize::new(0),
      close_calls: AtomicUsize::new(0),
    }
  }

  pub fn config(&self) -> &LoopbackConfig {
    &self.config
  }

  fn queue(&self, loop_handle: LoopHandle) -> Option<Arc<EventQueue>> {
    self.queues.read().get(&loop_handle).cloned()
  }

  fn queue_for_session(&self, session: SessionHandle) -> Option<Arc<EventQueue>> {
    let loop_handle = *self.sessions.lock().get(&session)?;
    self.queue(loop_handle)
  }

  /// Queues a raw event on the event queue of the session it names.
  pub fn inject(&self, event: RawEvent) -> Result<(), XioError> {
    match self.queue_for_session(event.session) {
      Some(queue) => {
        tracing::trace!(session = %event.session, kind = event.kind, "Loopback: injecting event");
        queue.push(event);
        Ok(())
      }
      None => Err(XioError::Transport(format!(
        "no open session {} to inject event into",
        event.session
      ))),
    }
  }

  /// Queues a raw event directly on `loop_handle`, whatever session it names.
  pub fn inject_into(&self, loop_handle: LoopHandle, event: RawEvent) -> Result<(), XioError> {
    match self.queue(loop_handle) {
      Some(queue) => {
        queue.push(event);
        Ok(())
      }
      None => Err(XioError::Transport(format!("no event queue {}", loop_handle))),
    }
  }

  /// Number of events waiting on `loop_handle`.
  pub fn pending_events(&self, loop_handle: LoopHandle) -> usize {
    self.queue(loop_handle).map_or(0, |q| q.state.lock().events.len())
  }

  pub fn is_session_open(&self, session: SessionHandle) -> bool {
    self.sessions.lock().contains_key(&session)
  }

  pub fn set_fail_creates(&self, fail: bool) {
    self.fail_creates.store(fail, Ordering::SeqCst);
  }

  pub fn set_fail_sends(&self, fail: bool) {
    self.fail_sends.store(fail, Ordering::SeqCst);
  }

  pub fn set_fail_closes(&self, fail: bool) {
    self.fail_closes.store(fail, Ordering::SeqCst);
  }

  pub fn create_calls(&self) -> usize {
    self.create_calls.load(Ordering::SeqCst)
  }

  pub fn send_calls(&self) -> usize {
    self.send_calls.load(Ordering::SeqCst)
  }

  pub fn close_calls(&self) -> usize {
    self.close_calls.load(Ordering::SeqCst)
  }
}

impl NativeTransport for LoopbackTransport {
  fn open_event_queue(&self) -> Result<LoopHandle, XioError> {
    let handle = LoopHandle::new(self.next_loop.fetch_add(1, Ordering::Relaxed));
    self.queues.write().insert(handle, Arc::new(EventQueue::default()));
    tracing::debug!(loop_handle = %handle, "Loopback: event queue opened");
    Ok(handle)
  }

  fn close_event_queue(&self, loop_handle: LoopHandle) {
    if let Some(queue) = self.queues.write().remove(&loop_handle) {
      queue.wake();
      self.sessions.lock().retain(|_, l| *l != loop_handle);
      tracing::debug!(loop_handle = %loop_handle, "Loopback: event queue closed");
    }
  }

  fn create_client_session(&self, url: &Url, loop_handle: LoopHandle) -> SessionHandle {
    self.create_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_creates.load(Ordering::SeqCst) {
      tracing::debug!(%url, "Loopback: failing session creation as configured");
      return SessionHandle::INVALID;
    }
    let Some(queue) = self.queue(loop_handle) else {
      tracing::warn!(%url, loop_handle = %loop_handle, "Loopback: session requested on unknown event queue");
      return SessionHandle::INVALID;
    };

    let handle = SessionHandle::new(self.next_session.fetch_add(1, Ordering::Relaxed));
    self.sessions.lock().insert(handle, loop_handle);
    if self.config.auto_establish {
      queue.push(RawEvent::session_established(handle));
    }
    handle
  }

  fn send_msg(&self, session: SessionHandle, _flags: MsgFlags, msg: MsgHandle, data: Bytes) -> Result<(), XioError> {
    self.send_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_sends.load(Ordering::SeqCst) {
      return Err(XioError::SendFailed { session, msg });
    }
    let queue = self
      .queue_for_session(session)
      .ok_or(XioError::SendFailed { session, msg })?;
    if self.config.echo_replies {
      queue.push(RawEvent::reply(session, msg, data));
    }
    Ok(())
  }

  fn close_client_session(&self, session: SessionHandle) -> Result<(), XioError> {
    self.close_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_closes.load(Ordering::SeqCst) {
      return Err(XioError::CloseFailed(session));
    }
    let queue = self.queue_for_session(session).ok_or(XioError::CloseFailed(session))?;
    self.sessions.lock().remove(&session);
    if self.config.teardown_on_close {
      queue.push(RawEvent::session_error(
        session,
        SessionEventCode::Teardown,
        LOOPBACK_TEARDOWN_REASON,
      ));
    }
    Ok(())
  }

  fn poll_next_event(&self, loop_handle: LoopHandle, timeout: Option<Duration>) -> Option<RawEvent> {
    self.queue(loop_handle)?.pop(timeout)
  }

  fn wakeup(&self, loop_handle: LoopHandle) {
    if let Some(queue) = self.queue(loop_handle) {
      queue.wake();
    }
  }

  fn discard_wakeup(&self, loop_handle: LoopHandle) {
    if let Some(queue) = self.queue(loop_handle) {
      queue.discard_wake();
    }
  }
}
