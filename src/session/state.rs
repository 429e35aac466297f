use std::fmt;

/// Lifecycle of a client session.
///
/// ```text
/// Creating ──handle──▶ Active ──close()──▶ Closing ──teardown──▶ TornDown
///    │                   └───────────teardown───────────────────────▲
///    └──no handle──▶ CreationFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
  /// Waiting for the transport to hand out a session handle.
  Creating,
  Active,
  /// `close()` was called; waiting for the teardown event.
  Closing,
  /// Teardown delivered and the session deregistered. Terminal.
  TornDown,
  /// The transport never produced a handle. Terminal.
  CreationFailed,
}

/// What moves a session from one state to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
  HandleAssigned,
  HandleInvalid,
  CloseRequested,
  Teardown,
}

impl SessionState {
  /// The state `trigger` leads to, or `None` if it does not apply in this state.
  pub(crate) fn next(self, trigger: Trigger) -> Option<SessionState> {
    use SessionState::*;
    match (self, trigger) {
      (Creating, Trigger::HandleAssigned) => Some(Active),
      (Creating, Trigger::HandleInvalid) => Some(CreationFailed),
      (Active, Trigger::CloseRequested) => Some(Closing),
      (Active | Closing, Trigger::Teardown) => Some(TornDown),
      _ => None,
    }
  }

  /// True once `close()` was called or the session was torn down. Never reverts.
  pub fn is_closing(self) -> bool {
    matches!(self, SessionState::Closing | SessionState::TornDown)
  }

  /// Sessions accept sends and deliver events until they are torn down.
  pub fn is_live(self) -> bool {
    matches!(self, SessionState::Active | SessionState::Closing)
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, SessionState::TornDown | SessionState::CreationFailed)
  }
}

impl fmt::Display for SessionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SessionState::Creating => "CREATING",
      SessionState::Active => "ACTIVE",
      SessionState::Closing => "CLOSING",
      SessionState::TornDown => "TORN_DOWN",
      SessionState::CreationFailed => "CREATION_FAILED",
    };
    f.write_str(name)
  }
}
