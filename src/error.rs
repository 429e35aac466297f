use crate::message::Msg;
use crate::transport::{MsgHandle, SessionHandle};

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum XioError {
  // --- Endpoint Errors ---
  #[error("Invalid session URL: {0}")]
  InvalidEndpoint(String),
  #[error("Transport scheme not supported: {0}")]
  UnsupportedTransport(String),

  // --- State Errors ---
  #[error("Session has no valid transport handle (creation failed)")]
  InvalidSessionHandle,
  #[error("Operation is invalid for the current state: {0}")]
  InvalidState(&'static str),
  #[error("Message {msg} is already bound to session {session}")]
  MsgAlreadyBound { msg: MsgHandle, session: SessionHandle },

  // --- Submission Errors ---
  #[error("Transport rejected message {msg} on session {session}")]
  SendFailed { session: SessionHandle, msg: MsgHandle },
  #[error("Transport failed to close session {0}")]
  CloseFailed(SessionHandle),

  // --- Event Errors ---
  #[error("Unknown event kind {kind} for session {session}")]
  UnknownEventKind { kind: i32, session: SessionHandle },
  #[error("Malformed event record: {0}")]
  MalformedEvent(String),

  // --- Transport / Internal ---
  #[error("Transport error: {0}")]
  Transport(String),
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl XioError {
  /// Maps a URL parse failure onto the endpoint error for `url`.
  pub fn from_url_error(e: url::ParseError, url: &str) -> Self {
    XioError::InvalidEndpoint(format!("{} ({})", url, e))
  }

  /// True for errors caused by calling an operation on a session that can no longer accept it.
  pub fn is_state_error(&self) -> bool {
    matches!(self, XioError::InvalidSessionHandle | XioError::InvalidState(_))
  }
}

/// Asynchronous failure reported for a message that was already handed to the transport.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgError {
  /// The transport reported a delivery failure with its own error code.
  #[error("transport message error (code {code})")]
  Transport { code: i32 },
  /// The owning session was torn down before a completion arrived.
  #[error("session torn down before completion")]
  SessionTornDown,
}

/// Returned by `ClientSession::send_message` when a message could not be submitted.
///
/// The rejected message is handed back so the caller keeps ownership of its buffer.
#[derive(Error)]
#[error("{error}")]
pub struct SendError {
  error: XioError,
  msg: Msg,
}

impl SendError {
  pub(crate) fn new(error: XioError, msg: Msg) -> Self {
    Self { error, msg }
  }

  pub fn error(&self) -> &XioError {
    &self.error
  }

  pub fn msg(&self) -> &Msg {
    &self.msg
  }

  /// Splits the error, returning the message to the caller.
  pub fn into_parts(self) -> (XioError, Msg) {
    (self.error, self.msg)
  }

  pub fn into_msg(self) -> Msg {
    self.msg
  }
}

impl fmt::Debug for SendError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendError")
      .field("error", &self.error)
      .field("msg", &self.msg.handle())
      .finish()
  }
}
