//! The notifications a session owner receives.

use crate::error::MsgError;
use crate::event::SessionEventCode;
use crate::message::Msg;

/// Receives a session's asynchronous notifications.
///
/// All methods run on the dispatch thread and must not block for long: every
/// session sharing the event queue waits while they run. There are no default
/// implementations; a session owner has to decide what each notification means
/// for it, even if that is nothing.
pub trait SessionCallbacks: Send {
  /// A reply arrived. `msg` is the message that was sent, with the reply attached
  /// (see `Msg::reply`). It is unbound and can be reused.
  fn on_reply(&mut self, msg: Msg);

  /// The transport reports the session as connected.
  fn on_session_established(&mut self);

  /// A session event. [`SessionEventCode::Teardown`] is the last event the session
  /// receives; any other code is informational.
  fn on_session_error(&mut self, code: SessionEventCode, reason: &str);

  /// A sent message failed after submission, or its session was torn down before
  /// a reply arrived. The message is handed back unbound.
  fn on_msg_error(&mut self, msg: Msg, error: MsgError);
}

/// One callback invocation, as forwarded by [`ChannelCallbacks`].
#[derive(Debug)]
pub enum SessionNotification {
  Reply(Msg),
  Established,
  SessionError { code: SessionEventCode, reason: String },
  MsgError { msg: Msg, error: MsgError },
}

impl SessionNotification {
  pub fn is_teardown(&self) -> bool {
    matches!(self, SessionNotification::SessionError { code, .. } if code.is_teardown())
  }
}

pub type NotificationSender = async_channel::Sender<SessionNotification>;
pub type NotificationReceiver = async_channel::Receiver<SessionNotification>;

/// Forwards every callback into an unbounded channel so async code can consume
/// session notifications with `recv().await`.
///
/// The channel is unbounded so the dispatch thread never waits on a slow consumer.
#[derive(Debug, Clone)]
pub struct ChannelCallbacks {
  tx: NotificationSender,
}

impl ChannelCallbacks {
  pub fn new() -> (Self, NotificationReceiver) {
    let (tx, rx) = async_channel::unbounded();
    (Self { tx }, rx)
  }

  fn forward(&self, notification: SessionNotification) {
    if let Err(e) = self.tx.try_send(notification) {
      tracing::debug!("ChannelCallbacks: receiver gone, dropping {:?}", e.into_inner());
    }
  }
}

impl SessionCallbacks for ChannelCallbacks {
  fn on_reply(&mut self, msg: Msg) {
    self.forward(SessionNotification::Reply(msg));
  }

  fn on_session_established(&mut self) {
    self.forward(SessionNotification::Established);
  }

  fn on_session_error(&mut self, code: SessionEventCode, reason: &str) {
    self.forward(SessionNotification::SessionError {
      code,
      reason: reason.to_string(),
    });
  }

  fn on_msg_error(&mut self, msg: Msg, error: MsgError) {
    self.forward(SessionNotification::MsgError { msg, error });
  }
}
