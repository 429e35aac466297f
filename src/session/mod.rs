//! Client sessions and their lifecycle state machine.

mod client;
mod state;

pub use client::ClientSession;
pub(crate) use client::SessionCore;
pub use state::SessionState;
