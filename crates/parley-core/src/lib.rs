//! Update dispatch and per-conversation session management for parley.
//!
//! Two dispatch models share the [`dispatch::Dispatch`] seam:
//! - `dispatcher` -- stateless: every update runs as an isolated task under a
//!   global concurrency ceiling.
//! - `router` -- stateful: updates are classified to a conversation and
//!   funnelled through that conversation's single session server, created on
//!   demand by the `supervisor` and addressable through the `registry`.
//!
//! This crate never talks to the platform API; handlers do, using the
//! `BotContext` they receive.

pub mod bot;
pub mod dispatch;
pub mod dispatcher;
mod guard;
pub mod registry;
pub mod router;
pub mod session;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;

pub use bot::{Bot, ChatBot, Next, Route, Started, Timer};
pub use dispatch::{Dispatch, drive};
pub use dispatcher::AsyncDispatcher;
pub use registry::{AlreadyRegistered, ChatRegistry, SessionAddress};
pub use router::{ChatRouter, Routed};
pub use session::SessionHandle;
pub use supervisor::ChatSupervisor;
