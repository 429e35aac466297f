//! Event records produced by the transport and their typed form.

use crate::error::XioError;
use crate::transport::{MsgHandle, SessionHandle};

use bytes::Bytes;
use std::fmt;

/// Numeric event kinds as they appear in a [`RawEvent`].
pub const EVENT_KIND_SESSION_ERROR: i32 = 0;
pub const EVENT_KIND_MSG_ERROR: i32 = 1;
pub const EVENT_KIND_SESSION_ESTABLISHED: i32 = 2;
pub const EVENT_KIND_REPLY: i32 = 3;

/// Session event codes carried by session-error events.
///
/// Only [`SessionEventCode::Teardown`] ends a session's lifetime; every other code
/// is informational for the session owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventCode {
  Reject,
  Teardown,
  NewConnection,
  ConnectionEstablished,
  ConnectionTeardown,
  ConnectionClosed,
  ConnectionDisconnected,
  ConnectionRefused,
  ConnectionError,
  Error,
  /// A code this version does not know about.
  Other(i32),
}

impl SessionEventCode {
  pub fn code(self) -> i32 {
    match self {
      SessionEventCode::Reject => 0,
      SessionEventCode::Teardown => 1,
      SessionEventCode::NewConnection => 2,
      SessionEventCode::ConnectionEstablished => 3,
      SessionEventCode::ConnectionTeardown => 4,
      SessionEventCode::ConnectionClosed => 5,
      SessionEventCode::ConnectionDisconnected => 6,
      SessionEventCode::ConnectionRefused => 7,
      SessionEventCode::ConnectionError => 8,
      SessionEventCode::Error => 9,
      SessionEventCode::Other(code) => code,
    }
  }

  pub fn is_teardown(self) -> bool {
    self == SessionEventCode::Teardown
  }
}

impl From<i32> for SessionEventCode {
  fn from(code: i32) -> Self {
    match code {
      0 => SessionEventCode::Reject,
      1 => SessionEventCode::Teardown,
      2 => SessionEventCode::NewConnection,
      3 => SessionEventCode::ConnectionEstablished,
      4 => SessionEventCode::ConnectionTeardown,
      5 => SessionEventCode::ConnectionClosed,
      6 => SessionEventCode::ConnectionDisconnected,
      7 => SessionEventCode::ConnectionRefused,
      8 => SessionEventCode::ConnectionError,
      9 => SessionEventCode::Error,
      other => SessionEventCode::Other(other),
    }
  }
}

impl fmt::Display for SessionEventCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SessionEventCode::Reject => write!(f, "SESSION_REJECT"),
      SessionEventCode::Teardown => write!(f, "SESSION_TEARDOWN"),
      SessionEventCode::NewConnection => write!(f, "NEW_CONNECTION"),
      SessionEventCode::ConnectionEstablished => write!(f, "CONNECTION_ESTABLISHED"),
      SessionEventCode::ConnectionTeardown => write!(f, "CONNECTION_TEARDOWN"),
      SessionEventCode::ConnectionClosed => write!(f, "CONNECTION_CLOSED"),
      SessionEventCode::ConnectionDisconnected => write!(f, "CONNECTION_DISCONNECTED"),
      SessionEventCode::ConnectionRefused => write!(f, "CONNECTION_REFUSED"),
      SessionEventCode::ConnectionError => write!(f, "CONNECTION_ERROR"),
      SessionEventCode::Error => write!(f, "SESSION_ERROR"),
      SessionEventCode::Other(code) => write!(f, "UNKNOWN({})", code),
    }
  }
}

/// The flat record a transport produces for one occurrence.
///
/// Which payload fields are meaningful depends on `kind`; decoding into an
/// [`Event`] keeps only the ones the kind defines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
  pub kind: i32,
  pub session: SessionHandle,
  /// Session event code (session errors) or transport error code (message errors).
  pub error_code: i32,
  pub reason: Option<String>,
  /// The message a reply or message error refers to.
  pub msg: MsgHandle,
  /// Reply payload.
  pub data: Option<Bytes>,
}

impl RawEvent {
  pub fn session_error(session: SessionHandle, code: SessionEventCode, reason: impl Into<String>) -> Self {
    Self {
      kind: EVENT_KIND_SESSION_ERROR,
      session,
      error_code: code.code(),
      reason: Some(reason.into()),
      ..Default::default()
    }
  }

  pub fn msg_error(session: SessionHandle, msg: MsgHandle, code: i32) -> Self {
    Self {
      kind: EVENT_KIND_MSG_ERROR,
      session,
      error_code: code,
      msg,
      ..Default::default()
    }
  }

  pub fn session_established(session: SessionHandle) -> Self {
    Self {
      kind: EVENT_KIND_SESSION_ESTABLISHED,
      session,
      ..Default::default()
    }
  }

  pub fn reply(session: SessionHandle, msg: MsgHandle, data: Bytes) -> Self {
    Self {
      kind: EVENT_KIND_REPLY,
      session,
      msg,
      data: Some(data),
      ..Default::default()
    }
  }
}

/// What happened, with exactly the payload that kind defines.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
  SessionError { code: SessionEventCode, reason: String },
  MsgError { msg: MsgHandle, code: i32 },
  SessionEstablished,
  Reply { msg: MsgHandle, data: Bytes },
}

impl EventKind {
  pub fn name(&self) -> &'static str {
    match self {
      EventKind::SessionError { .. } => "SessionError",
      EventKind::MsgError { .. } => "MsgError",
      EventKind::SessionEstablished => "SessionEstablished",
      EventKind::Reply { .. } => "Reply",
    }
  }

  pub fn is_teardown(&self) -> bool {
    matches!(self, EventKind::SessionError { code, .. } if code.is_teardown())
  }
}

/// A decoded event addressed to one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
  pub session: SessionHandle,
  pub kind: EventKind,
}

impl TryFrom<RawEvent> for Event {
  type Error = XioError;

  fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
    let kind = match raw.kind {
      EVENT_KIND_SESSION_ERROR => EventKind::SessionError {
        code: SessionEventCode::from(raw.error_code),
        reason: raw.reason.unwrap_or_default(),
      },
      EVENT_KIND_MSG_ERROR => {
        if !raw.msg.is_valid() {
          return Err(XioError::MalformedEvent(format!(
            "message error for session {} carries no message handle",
            raw.session
          )));
        }
        EventKind::MsgError {
          msg: raw.msg,
          code: raw.error_code,
        }
      }
      EVENT_KIND_SESSION_ESTABLISHED => EventKind::SessionEstablished,
      EVENT_KIND_REPLY => {
        if !raw.msg.is_valid() {
          return Err(XioError::MalformedEvent(format!(
            "reply for session {} carries no message handle",
            raw.session
          )));
        }
        EventKind::Reply {
          msg: raw.msg,
          data: raw.data.unwrap_or_default(),
        }
      }
      kind => {
        return Err(XioError::UnknownEventKind {
          kind,
          session: raw.session,
        })
      }
    };
    Ok(Event {
      session: raw.session,
      kind,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_session_event_code_mapping() {
    for code in 0..10 {
      assert_eq!(SessionEventCode::from(code).code(), code);
    }
    assert_eq!(SessionEventCode::from(1), SessionEventCode::Teardown);
    assert!(SessionEventCode::from(1).is_teardown());
    assert!(!SessionEventCode::from(5).is_teardown());
    assert_eq!(SessionEventCode::from(42), SessionEventCode::Other(42));
    assert_eq!(SessionEventCode::Other(42).code(), 42);
  }

  #[test]
  fn test_decode_each_kind() {
    let session = SessionHandle::new(42);
    let msg = MsgHandle::new(9);

    let ev = Event::try_from(RawEvent::session_error(session, SessionEventCode::Teardown, "bye")).unwrap();
    assert_eq!(ev.session, session);
    assert!(ev.kind.is_teardown());
    assert_eq!(
      ev.kind,
      EventKind::SessionError {
        code: SessionEventCode::Teardown,
        reason: "bye".into()
      }
    );

    let ev = Event::try_from(RawEvent::msg_error(session, msg, -3)).unwrap();
    assert_eq!(ev.kind, EventKind::MsgError { msg, code: -3 });

    let ev = Event::try_from(RawEvent::session_established(session)).unwrap();
    assert_eq!(ev.kind, EventKind::SessionEstablished);

    let ev = Event::try_from(RawEvent::reply(session, msg, Bytes::from_static(b"pong"))).unwrap();
    assert_eq!(
      ev.kind,
      EventKind::Reply {
        msg,
        data: Bytes::from_static(b"pong")
      }
    );
  }

  #[test]
  fn test_decode_rejects_unknown_kind() {
    let raw = RawEvent {
      kind: 17,
      session: SessionHandle::new(3),
      ..Default::default()
    };
    let err = Event::try_from(raw).unwrap_err();
    assert!(matches!(err, XioError::UnknownEventKind { kind: 17, .. }));
  }

  #[test]
  fn test_decode_rejects_reply_without_message() {
    let raw = RawEvent {
      kind: EVENT_KIND_REPLY,
      session: SessionHandle::new(3),
      ..Default::default()
    };
    assert!(matches!(Event::try_from(raw), Err(XioError::MalformedEvent(_))));
  }

  #[test]
  fn test_session_error_without_reason_decodes_empty() {
    let raw = RawEvent {
      kind: EVENT_KIND_SESSION_ERROR,
      session: SessionHandle::new(3),
      error_code: 7,
      ..Default::default()
    };
    let ev = Event::try_from(raw).unwrap();
    assert_eq!(
      ev.kind,
      EventKind::SessionError {
        code: SessionEventCode::ConnectionRefused,
        reason: String::new()
      }
    );
  }
}
