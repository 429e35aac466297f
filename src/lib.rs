// src/lib.rs

//! rxio - session-oriented messaging over native high-performance transports.
//!
//! An application opens [`ClientSession`]s to remote endpoints, submits [`Msg`]s on
//! them, and receives replies and lifecycle notifications through
//! [`SessionCallbacks`]. All transport events of a set of sessions are drained by
//! one [`EventQueueHandler`], usually running on a [`DispatchThread`].
//!
//! The transport engine itself is external and plugs in through
//! [`NativeTransport`]. [`LoopbackTransport`] is an in-process implementation.
//!
//! ```
//! use std::sync::Arc;
//! use rxio::{ChannelCallbacks, ClientSession, EventQueueHandler, LoopbackTransport, Msg, SessionNotification};
//!
//! let transport = Arc::new(LoopbackTransport::new());
//! let eqh = EventQueueHandler::with_transport(transport).unwrap();
//! let (callbacks, notifications) = ChannelCallbacks::new();
//!
//! let session = ClientSession::connect(&eqh, "rdma://10.0.0.1:1234", callbacks);
//! session.send_message(Msg::from_static(b"ping")).unwrap();
//! eqh.run_event_loop(2, None).unwrap();
//!
//! assert!(matches!(notifications.try_recv().unwrap(), SessionNotification::Established));
//! match notifications.try_recv().unwrap() {
//!   SessionNotification::Reply(msg) => assert_eq!(msg.reply(), Some(&b"ping"[..])),
//!   other => panic!("unexpected {:?}", other),
//! }
//! ```

/// Callback contract for session owners and its channel adapter.
pub mod callbacks;
/// The dispatch loop, its configuration and its dedicated thread.
pub mod eqh;
/// Defines custom error types used throughout the library.
pub mod error;
/// Transport event records and their typed form.
pub mod event;
/// Contains types related to message representation (`Msg`, `MsgFlags`).
pub mod message;
/// Client sessions and their lifecycle state machine.
pub mod session;
/// The native transport boundary and the in-process loopback transport.
pub mod transport;

pub use callbacks::{ChannelCallbacks, NotificationReceiver, SessionCallbacks, SessionNotification};
pub use eqh::{DispatchThread, EqhConfig, EventQueueHandler};
pub use error::{MsgError, SendError, XioError};
pub use event::{Event, EventKind, RawEvent, SessionEventCode};
pub use message::{Msg, MsgFlags};
pub use session::{ClientSession, SessionState};
pub use transport::loopback::{LoopbackConfig, LoopbackTransport};
pub use transport::{LoopHandle, MsgHandle, NativeTransport, SessionHandle};

// --- Top-Level Library Information Functions ---

/// Major version number of the rxio library.
const VERSION_MAJOR: i32 = 0;
/// Minor version number of the rxio library.
const VERSION_MINOR: i32 = 1;
/// Patch version number of the rxio library.
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
///
/// # Examples
///
/// ```
/// let (major, minor, patch) = rxio::version();
/// println!("rxio version: {}.{}.{}", major, minor, patch);
/// ```
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
