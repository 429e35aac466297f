//! Boundary with the native transport engine.
//!
//! The engine itself (connection setup, moving bytes, producing completions) lives
//! outside this crate. It is consumed through [`NativeTransport`], which deals only
//! in opaque numeric handles and flat [`RawEvent`] records.

pub mod endpoint;
pub mod loopback;

use crate::error::XioError;
use crate::event::RawEvent;
use crate::message::MsgFlags;

use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use url::Url;

macro_rules! transport_handle {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct $name(u64);

    impl $name {
      /// The handle value the transport uses to signal failure.
      pub const INVALID: $name = $name(0);

      pub const fn new(raw: u64) -> Self {
        Self(raw)
      }

      pub const fn raw(self) -> u64 {
        self.0
      }

      pub const fn is_valid(self) -> bool {
        self.0 != 0
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl From<u64> for $name {
      fn from(raw: u64) -> Self {
        Self(raw)
      }
    }
  };
}

transport_handle!(
  /// Identifies one event queue (dispatch loop) inside the transport.
  LoopHandle
);
transport_handle!(
  /// Identifies one client session inside the transport. `0` means creation failed.
  SessionHandle
);
transport_handle!(
  /// Identifies one message while the transport may still reference its buffer.
  MsgHandle
);

/// Primitive operations of the native transport engine.
///
/// Implementations must be callable from application threads and the dispatch
/// thread at the same time. None of these calls may invoke back into the
/// session layer synchronously; completions are reported later through
/// [`NativeTransport::poll_next_event`].
pub trait NativeTransport: Send + Sync + fmt::Debug {
  /// Opens a new event queue that sessions can be attached to.
  fn open_event_queue(&self) -> Result<LoopHandle, XioError>;

  /// Releases an event queue. Pending events on it are discarded.
  fn close_event_queue(&self, loop_handle: LoopHandle);

  /// Starts a client session towards `url` whose events are delivered on `loop_handle`.
  ///
  /// Returns [`SessionHandle::INVALID`] on failure.
  fn create_client_session(&self, url: &Url, loop_handle: LoopHandle) -> SessionHandle;

  /// Submits a message for transmission. `data` shares the caller's buffer; the
  /// transport may keep it until it reports a reply or a message error for `msg`.
  fn send_msg(&self, session: SessionHandle, flags: MsgFlags, msg: MsgHandle, data: Bytes) -> Result<(), XioError>;

  /// Requests session teardown. Completion is reported later as a teardown session event.
  fn close_client_session(&self, session: SessionHandle) -> Result<(), XioError>;

  /// Takes the next raw event queued on `loop_handle`.
  ///
  /// `None` timeout polls without blocking; `Some(d)` blocks for at most `d`.
  fn poll_next_event(&self, loop_handle: LoopHandle, timeout: Option<Duration>) -> Option<RawEvent>;

  /// Interrupts a `poll_next_event` call blocked on `loop_handle`. A wakeup sent
  /// while nobody polls is kept for the next poll.
  fn wakeup(&self, loop_handle: LoopHandle);

  /// Drops a pending wakeup that no poll consumed. Transports whose wakeups are not
  /// kept can leave this as is.
  fn discard_wakeup(&self, _loop_handle: LoopHandle) {}
}
