use crate::transport::SessionHandle;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Routing table from session handle to the session that receives its events.
///
/// Entries are non-owning: the application owns its sessions, and an entry whose
/// session has been dropped simply stops resolving.
#[derive(Debug)]
pub(crate) struct SessionRegistry<S> {
  sessions: HashMap<SessionHandle, Weak<S>>,
}

impl<S> SessionRegistry<S> {
  pub fn new() -> Self {
    Self {
      sessions: HashMap::new(),
    }
  }

  /// Adds a routing entry. Returns `false` if `handle` is not routable.
  pub fn insert(&mut self, handle: SessionHandle, session: &Arc<S>) -> bool {
    if !handle.is_valid() {
      debug!("SessionRegistry: session without a valid handle is registered but not routable");
      return false;
    }
    if let Some(previous) = self.sessions.insert(handle, Arc::downgrade(session)) {
      if previous.strong_count() > 0 {
        warn!(session = %handle, "SessionRegistry: replaced a live registration for the same handle");
      }
    }
    true
  }

  /// Removes a routing entry. Removing an absent entry is a no-op.
  pub fn remove(&mut self, handle: SessionHandle) -> bool {
    let removed = self.sessions.remove(&handle).is_some();
    if removed {
      debug!(session = %handle, "SessionRegistry: removed");
    }
    removed
  }

  /// Resolves `handle` to its live session, if any.
  pub fn get(&self, handle: SessionHandle) -> Option<Arc<S>> {
    self.sessions.get(&handle).and_then(Weak::upgrade)
  }

  pub fn contains(&self, handle: SessionHandle) -> bool {
    self.sessions.contains_key(&handle)
  }

  pub fn len(&self) -> usize {
    self.sessions.len()
  }

  pub fn clear(&mut self) -> usize {
    let count = self.sessions.len();
    self.sessions.clear();
    count
  }
}
