use crate::message::Msg;
use crate::transport::{MsgHandle, SessionHandle};

use std::collections::HashMap;

/// Messages the transport may still reference, keyed by handle.
///
/// A message is moved in before it is handed to the transport and moved back out
/// exactly once, by whichever completion arrives first.
#[derive(Debug)]
pub(crate) struct InUseTracker {
  in_flight: HashMap<MsgHandle, Msg>,
}

impl InUseTracker {
  pub fn new() -> Self {
    Self {
      in_flight: HashMap::new(),
    }
  }

  /// Takes ownership of a bound message. A message whose handle is already tracked
  /// is handed back untouched.
  pub fn add(&mut self, msg: Msg) -> Result<(), Msg> {
    if self.in_flight.contains_key(&msg.handle()) {
      tracing::warn!(msg = %msg.handle(), "InUseTracker: message is already in use");
      return Err(msg);
    }
    self.in_flight.insert(msg.handle(), msg);
    Ok(())
  }

  pub fn take(&mut self, handle: MsgHandle) -> Option<Msg> {
    self.in_flight.remove(&handle)
  }

  /// Takes a message only if it was sent on `session`.
  pub fn take_for_session(&mut self, handle: MsgHandle, session: SessionHandle) -> Option<Msg> {
    match self.in_flight.get(&handle) {
      Some(msg) if msg.session() == Some(session) => self.take(handle),
      Some(msg) => {
        tracing::warn!(
          msg = %handle,
          owner = ?msg.session(),
          session = %session,
          "InUseTracker: completion names a message owned by another session"
        );
        None
      }
      None => None,
    }
  }

  /// Takes every message still in use on `session`, in handle order.
  pub fn take_all_for_session(&mut self, session: SessionHandle) -> Vec<Msg> {
    let mut handles: Vec<MsgHandle> = self
      .in_flight
      .iter()
      .filter(|(_, msg)| msg.session() == Some(session))
      .map(|(handle, _)| *handle)
      .collect();
    handles.sort_unstable();
    handles.into_iter().filter_map(|h| self.in_flight.remove(&h)).collect()
  }

  pub fn contains(&self, handle: MsgHandle) -> bool {
    self.in_flight.contains_key(&handle)
  }

  pub fn len(&self) -> usize {
    self.in_flight.len()
  }

  pub fn drain_all(&mut self) -> Vec<Msg> {
    self.in_flight.drain().map(|(_, msg)| msg).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bound(session: u64, payload: &'static [u8]) -> Msg {
    let mut msg = Msg::from_static(payload);
    msg.bind(SessionHandle::new(session)).unwrap();
    msg
  }

  #[test]
  fn test_add_and_take_once() {
    let mut tracker = InUseTracker::new();
    let msg = bound(1, b"one");
    let handle = msg.handle();
    tracker.add(msg).unwrap();
    assert!(tracker.contains(handle));

    let back = tracker.take(handle).unwrap();
    assert_eq!(back.data(), b"one");
    assert!(tracker.take(handle).is_none());
    assert_eq!(tracker.len(), 0);
  }

  #[test]
  fn test_take_for_session_checks_owner() {
    let mut tracker = InUseTracker::new();
    let msg = bound(1, b"one");
    let handle = msg.handle();
    tracker.add(msg).unwrap();

    assert!(tracker.take_for_session(handle, SessionHandle::new(2)).is_none());
    assert!(tracker.contains(handle));
    assert!(tracker.take_for_session(handle, SessionHandle::new(1)).is_some());
  }

  #[test]
  fn test_take_all_for_session_leaves_others() {
    let mut tracker = InUseTracker::new();
    let a1 = bound(1, b"a1");
    let a2 = bound(1, b"a2");
    let b1 = bound(2, b"b1");
    let b1_handle = b1.handle();
    tracker.add(a1).unwrap();
    tracker.add(a2).unwrap();
    tracker.add(b1).unwrap();

    let released = tracker.take_all_for_session(SessionHandle::new(1));
    let payloads: Vec<&[u8]> = released.iter().map(|m| m.data()).collect();
    assert_eq!(payloads, vec![&b"a1"[..], &b"a2"[..]]);
    assert_eq!(tracker.len(), 1);
    assert!(tracker.contains(b1_handle));
  }
}
