//! Message-related types (`Msg`, `MsgFlags`).

mod flags;
mod msg;

pub use flags::MsgFlags;
pub use msg::Msg;
