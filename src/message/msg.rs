use crate::error::XioError;
use crate::message::flags::MsgFlags;
use crate::transport::{MsgHandle, SessionHandle};

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// Handle 0 is reserved as the invalid handle.
static NEXT_MSG_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_msg_handle() -> MsgHandle {
  MsgHandle::new(NEXT_MSG_HANDLE.fetch_add(1, Ordering::Relaxed))
}

/// One unit of data submitted on a session, together with the reply it received.
///
/// A `Msg` is not `Clone`: sending moves it into the dispatch loop's
/// in-use tracker and the application only gets it back, by value, through a
/// completion callback (or a `SendError`). While the transport may still read the
/// buffer the application has no way to touch it.
pub struct Msg {
  handle: MsgHandle,
  data: Bytes,
  reply: Option<Bytes>,
  flags: MsgFlags,
  session: Option<SessionHandle>,
}

impl Msg {
  /// Creates an empty message with a fresh handle.
  pub fn new() -> Self {
    Self::from_bytes(Bytes::new())
  }

  /// Creates a message from a `Vec<u8>`, taking ownership.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self::from_bytes(Bytes::from(data))
  }

  /// Creates a message from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self::from_bytes(Bytes::from_static(data))
  }

  /// Creates a message from `bytes::Bytes`.
  pub fn from_bytes(data: Bytes) -> Self {
    Self {
      handle: next_msg_handle(),
      data,
      reply: None,
      flags: MsgFlags::empty(),
      session: None,
    }
  }

  pub fn handle(&self) -> MsgHandle {
    self.handle
  }

  /// Returns the outbound payload.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Returns the size of the outbound payload in bytes.
  pub fn size(&self) -> usize {
    self.data.len()
  }

  /// Returns the outbound payload as `Bytes` (reference counted, cheap to clone).
  pub fn data_bytes(&self) -> Bytes {
    self.data.clone()
  }

  /// Replaces the outbound payload, e.g. when reusing a released message.
  /// Any reply from a previous exchange is discarded.
  pub fn set_data(&mut self, data: impl Into<Bytes>) {
    self.data = data.into();
    self.reply = None;
  }

  /// Returns the reply payload, if this message completed with a reply.
  pub fn reply(&self) -> Option<&[u8]> {
    self.reply.as_deref()
  }

  pub fn take_reply(&mut self) -> Option<Bytes> {
    self.reply.take()
  }

  pub fn flags(&self) -> MsgFlags {
    self.flags
  }

  pub fn set_flags(&mut self, flags: MsgFlags) {
    self.flags = flags;
  }

  /// The session this message is currently submitted on, if any.
  pub fn session(&self) -> Option<SessionHandle> {
    self.session
  }

  pub fn is_bound(&self) -> bool {
    self.session.is_some()
  }

  pub(crate) fn bind(&mut self, session: SessionHandle) -> Result<(), XioError> {
    match self.session {
      Some(bound) => Err(XioError::MsgAlreadyBound {
        msg: self.handle,
        session: bound,
      }),
      None => {
        self.session = Some(session);
        Ok(())
      }
    }
  }

  pub(crate) fn unbind(&mut self) {
    self.session = None;
  }

  pub(crate) fn set_reply(&mut self, reply: Bytes) {
    self.reply = Some(reply);
  }
}

impl Default for Msg {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("handle", &self.handle)
      .field("size", &self.size())
      .field("reply", &self.reply.as_ref().map(|r| format!("{} bytes", r.len()))) // Avoid printing large data
      .field("flags", &self.flags)
      .field("session", &self.session)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_handles_are_unique_and_valid() {
    let a = Msg::new();
    let b = Msg::from_static(b"payload");
    assert!(a.handle().is_valid());
    assert!(b.handle().is_valid());
    assert_ne!(a.handle(), b.handle());
  }

  #[test]
  fn test_bind_twice_is_misuse() {
    let mut msg = Msg::from_static(b"hello");
    msg.bind(SessionHandle::new(7)).unwrap();
    assert_eq!(msg.session(), Some(SessionHandle::new(7)));

    let err = msg.bind(SessionHandle::new(8)).unwrap_err();
    assert!(matches!(
      err,
      XioError::MsgAlreadyBound { session, .. } if session == SessionHandle::new(7)
    ));

    msg.unbind();
    assert!(!msg.is_bound());
    msg.bind(SessionHandle::new(8)).unwrap();
  }

  #[test]
  fn test_set_data_clears_previous_reply() {
    let mut msg = Msg::from_vec(vec![1, 2, 3]);
    msg.set_reply(Bytes::from_static(b"pong"));
    assert_eq!(msg.reply(), Some(&b"pong"[..]));

    msg.set_data(Bytes::from_static(b"ping again"));
    assert_eq!(msg.data(), b"ping again");
    assert!(msg.reply().is_none());
  }
}
