//! Chat session server: one serially-processing task per conversation.
//!
//! - `handle` -- `SessionHandle`, the cloneable address used to deliver
//!   updates and out-of-band messages into a session's mailbox
//! - `server` -- the task loop: waits on mailbox, inactivity timer and
//!   shutdown, runs one callback at a time, cleans up its registry entry

mod handle;
pub(crate) mod server;

pub use handle::SessionHandle;
pub(crate) use handle::Command;
