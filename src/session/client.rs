use super::state::{SessionState, Trigger};
use crate::callbacks::SessionCallbacks;
use crate::eqh::{panic_message, EventQueueHandler};
use crate::error::{MsgError, SendError, XioError};
use crate::event::{Event, EventKind, SessionEventCode};
use crate::message::Msg;
use crate::transport::endpoint::parse_session_url;
use crate::transport::SessionHandle;

use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

const EQH_CLOSED: &str = "event queue handler is closed";

/// Shared state of one client session.
///
/// Owned through `ClientSession` handles; the dispatch loop only holds a `Weak`.
pub(crate) struct SessionCore {
  handle: SessionHandle,
  url: String,
  eqh: EventQueueHandler,
  state: Mutex<SessionState>,
  established: AtomicBool,
  callbacks: Mutex<Box<dyn SessionCallbacks>>,
}

impl SessionCore {
  fn create(eqh: &EventQueueHandler, url: &str, callbacks: Box<dyn SessionCallbacks>) -> Arc<Self> {
    let handle = match parse_session_url(url) {
      Ok(parsed) => eqh.transport().create_client_session(&parsed, eqh.loop_handle()),
      Err(e) => {
        error!(url, error = %e, "Rejecting session URL");
        SessionHandle::INVALID
      }
    };
    let trigger = if handle.is_valid() {
      Trigger::HandleAssigned
    } else {
      error!(url, "There was an error creating session");
      Trigger::HandleInvalid
    };
    let state = SessionState::Creating
      .next(trigger)
      .unwrap_or(SessionState::CreationFailed);
    info!(session = %handle, url, %state, "Client session created");

    let core = Arc::new(Self {
      handle,
      url: url.to_string(),
      eqh: eqh.clone(),
      state: Mutex::new(state),
      established: AtomicBool::new(false),
      callbacks: Mutex::new(callbacks),
    });
    eqh.register(&core);
    core
  }

  pub(crate) fn handle(&self) -> SessionHandle {
    self.handle
  }

  fn state(&self) -> SessionState {
    *self.state.lock()
  }

  fn send(&self, mut msg: Msg) -> Result<(), SendError> {
    let msg_handle = msg.handle();
    let flags = msg.flags();
    let payload = msg.data_bytes();

    // Tracking happens under the state lock so a concurrent teardown either sees
    // this message when it releases the session's messages, or rejects the send.
    {
      let state = self.state.lock();
      if !state.is_live() {
        let error = match *state {
          SessionState::CreationFailed => XioError::InvalidSessionHandle,
          _ => XioError::InvalidState("session is torn down"),
        };
        error!(session = %self.handle, msg = %msg_handle, state = %*state, "Rejecting send");
        return Err(SendError::new(error, msg));
      }
      if self.eqh.is_closed() {
        error!(session = %self.handle, msg = %msg_handle, "Rejecting send on a closed event queue");
        return Err(SendError::new(XioError::InvalidState(EQH_CLOSED), msg));
      }
      if let Err(e) = msg.bind(self.handle) {
        error!(session = %self.handle, msg = %msg_handle, error = %e, "Rejecting send of a bound message");
        return Err(SendError::new(e, msg));
      }
      if let Err(mut msg) = self.eqh.track_in_use(msg) {
        msg.unbind();
        let reason = if self.eqh.is_closed() {
          EQH_CLOSED
        } else {
          "message is already in use"
        };
        return Err(SendError::new(XioError::InvalidState(reason), msg));
      }
    }

    match self.eqh.transport().send_msg(self.handle, flags, msg_handle, payload) {
      Ok(()) => {
        trace!(session = %self.handle, msg = %msg_handle, "Message submitted");
        Ok(())
      }
      Err(e) => {
        error!(session = %self.handle, msg = %msg_handle, error = %e, "There was an error sending the message");
        match self.eqh.release_for_session(msg_handle, self.handle) {
          Some(mut msg) => {
            msg.unbind();
            Err(SendError::new(e, msg))
          }
          None => {
            // A completion already handed the message back through a callback.
            warn!(session = %self.handle, msg = %msg_handle, "Message completed despite failed submission");
            Ok(())
          }
        }
      }
    }
  }

  fn close(&self) -> Result<(), XioError> {
    if !self.handle.is_valid() {
      error!(url = %self.url, "Closing session with invalid handle");
      return Err(XioError::InvalidSessionHandle);
    }
    {
      let mut state = self.state.lock();
      match state.next(Trigger::CloseRequested) {
        Some(next) => *state = next,
        None => {
          debug!(session = %self.handle, state = %*state, "Close already requested");
          return Ok(());
        }
      }
    }

    info!(session = %self.handle, "Closing session");
    self.eqh.transport().close_client_session(self.handle).map_err(|e| {
      error!(session = %self.handle, error = %e, "Transport failed to close session");
      e
    })
  }

  /// Handles one event routed to this session by the dispatch loop.
  pub(crate) fn on_event(&self, event: Event) {
    let state = self.state();
    if !state.is_live() {
      warn!(
        session = %self.handle,
        %state,
        kind = event.kind.name(),
        "Protocol violation: event delivered to a session that is not live"
      );
      return;
    }

    match event.kind {
      EventKind::SessionError { code, reason } => {
        info!(session = %self.handle, %code, reason = %reason, "Received session event");
        if code.is_teardown() {
          self.tear_down(code, &reason);
        } else {
          self.callbacks.lock().on_session_error(code, &reason);
        }
      }
      EventKind::MsgError { msg, code } => match self.eqh.release_for_session(msg, self.handle) {
        Some(mut released) => {
          released.unbind();
          debug!(session = %self.handle, msg = %msg, code, "Received message error event");
          self.callbacks.lock().on_msg_error(released, MsgError::Transport { code });
        }
        None => {
          warn!(session = %self.handle, msg = %msg, code, "Message error for a message not in use on this session");
        }
      },
      EventKind::SessionEstablished => {
        if self.established.swap(true, Ordering::AcqRel) {
          warn!(session = %self.handle, "Received a second session established event");
        } else {
          info!(session = %self.handle, "Session established");
        }
        self.callbacks.lock().on_session_established();
      }
      EventKind::Reply { msg, data } => match self.eqh.release_for_session(msg, self.handle) {
        Some(mut released) => {
          released.unbind();
          released.set_reply(data);
          trace!(session = %self.handle, msg = %msg, "Received reply");
          self.callbacks.lock().on_reply(released);
        }
        None => {
          warn!(session = %self.handle, msg = %msg, "Reply for a message not in use on this session");
        }
      },
    }
  }

  /// Moves to `TornDown`, deregisters and takes back every in-use message before
  /// any callback runs.
  fn tear_down(&self, code: SessionEventCode, reason: &str) {
    {
      let mut state = self.state.lock();
      match state.next(Trigger::Teardown) {
        Some(next) => *state = next,
        None => return,
      }
    }
    self.eqh.deregister(self.handle);
    let orphaned = self.eqh.release_all_for(self.handle);
    info!(session = %self.handle, released = orphaned.len(), "Session torn down");

    self.notify("on_session_error", |cb| cb.on_session_error(code, reason));
    for mut msg in orphaned {
      msg.unbind();
      self.notify("on_msg_error", move |cb| cb.on_msg_error(msg, MsgError::SessionTornDown));
    }
  }

  /// Runs one callback, containing a panic so the remaining notifications still go out.
  fn notify(&self, callback: &'static str, f: impl FnOnce(&mut dyn SessionCallbacks)) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
      let mut callbacks = self.callbacks.lock();
      f(&mut **callbacks)
    }));
    if let Err(payload) = result {
      error!(
        session = %self.handle,
        callback,
        "Session callback panicked: {}",
        panic_message(&*payload)
      );
    }
  }
}

impl Drop for SessionCore {
  fn drop(&mut self) {
    let state = *self.state.get_mut();
    if !state.is_live() {
      return;
    }
    if state == SessionState::Active {
      if let Err(e) = self.eqh.transport().close_client_session(self.handle) {
        debug!(session = %self.handle, error = %e, "Close on drop failed");
      }
    }
    self.eqh.deregister(self.handle);
    let orphaned = self.eqh.release_all_for(self.handle);
    debug!(
      session = %self.handle,
      released = orphaned.len(),
      "Session dropped before teardown"
    );
  }
}

/// The application's handle to one logical connection.
///
/// Cloning is cheap and every clone refers to the same session. When the last
/// clone is dropped before teardown, the session is closed at the transport,
/// deregistered, and any messages still in use are dropped.
#[derive(Clone)]
pub struct ClientSession {
  core: Arc<SessionCore>,
}

impl fmt::Debug for ClientSession {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ClientSession")
      .field("handle", &self.core.handle)
      .field("url", &self.core.url)
      .field("state", &self.core.state())
      .finish_non_exhaustive()
  }
}

impl ClientSession {
  /// Starts a session towards `url`, delivering its events to `callbacks`.
  ///
  /// This never fails: if the URL is invalid or the transport does not produce a
  /// handle, the error is logged and the returned session is permanently in
  /// `SessionState::CreationFailed`. Check [`handle`](Self::handle) or
  /// [`state`](Self::state) when that matters.
  pub fn connect<C>(eqh: &EventQueueHandler, url: &str, callbacks: C) -> Self
  where
    C: SessionCallbacks + 'static,
  {
    Self::with_boxed_callbacks(eqh, url, Box::new(callbacks))
  }

  pub fn with_boxed_callbacks(eqh: &EventQueueHandler, url: &str, callbacks: Box<dyn SessionCallbacks>) -> Self {
    Self {
      core: SessionCore::create(eqh, url, callbacks),
    }
  }

  pub fn handle(&self) -> SessionHandle {
    self.core.handle
  }

  pub fn url(&self) -> &str {
    &self.core.url
  }

  pub fn state(&self) -> SessionState {
    self.core.state()
  }

  /// True from the moment `close()` is called (or the transport tore the session down).
  pub fn is_closing(&self) -> bool {
    self.core.state().is_closing()
  }

  pub fn is_established(&self) -> bool {
    self.core.established.load(Ordering::Acquire)
  }

  pub fn eqh(&self) -> &EventQueueHandler {
    &self.core.eqh
  }

  /// Submits `msg` for transmission.
  ///
  /// `Ok` only means the transport accepted the submission. The message comes back
  /// exactly once through `on_reply` or `on_msg_error`. On `Err` the transport
  /// did not take it and it is returned inside the `SendError`.
  pub fn send_message(&self, msg: Msg) -> Result<(), SendError> {
    self.core.send(msg)
  }

  /// Requests teardown. The session stays registered until the transport reports
  /// the teardown event. Repeated calls are no-ops.
  pub fn close(&self) -> Result<(), XioError> {
    self.core.close()
  }
}
