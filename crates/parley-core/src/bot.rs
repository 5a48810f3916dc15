//! Handler traits implemented by application code.
//!
//! - [`Bot`] -- stateless: one call per update, run by `AsyncDispatcher`.
//! - [`ChatBot`] -- stateful per conversation: a callback-driven state machine
//!   run by one session server per conversation identity.
//!
//! Uses RPITIT (return-position `impl Trait` in traits) for async methods, so
//! implementors can simply write `async fn`. An `Err` from any callback is a
//! handler failure; a panic is caught and treated the same way.

use std::future::Future;
use std::time::Duration;

use parley_types::context::BotContext;
use parley_types::conversation::{ConversationHandle, ConversationId};
use parley_types::update::Update;

/// Stateless update handler.
pub trait Bot: Send + Sync + 'static {
    /// Handle one update. Runs in its own task; failures are isolated.
    fn handle_update(
        &self,
        update: Update,
        ctx: &BotContext,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Outcome of classifying an update for the stateful model.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Deliver to the session of this conversation, creating it if needed.
    Deliver(ConversationHandle),
    /// Drop the update without side effects.
    Ignore,
}

/// Default classification: only `message` updates are routed, and the
/// message's chat id is the conversation identity.
///
/// The chat object is kept as session-creation metadata. Every other update
/// kind (edited messages, callback queries, membership changes, ...) is
/// ignored; bots that want them override `ChatBot::classify`.
pub fn default_route(update: &Update) -> Route {
    if update.kind() != Some("message") {
        return Route::Ignore;
    }
    let Some(chat) = update.chat() else {
        return Route::Ignore;
    };
    match chat.get("id").and_then(ConversationId::from_json) {
        Some(id) => Route::Deliver(ConversationHandle::with_metadata(id, chat.clone())),
        None => Route::Ignore,
    }
}

/// How a callback wants the inactivity timer treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// After an update or timeout step: restart the current window.
    /// After an out-of-band step: leave the pending deadline as is.
    Unchanged,
    /// Arm a new inactivity window of this length.
    Arm(Duration),
    /// Never expire (until a later step arms a window again).
    Clear,
}

/// Tagged result of a session callback.
#[derive(Debug, PartialEq)]
pub enum Next<S> {
    Continue { state: S, timer: Timer },
    Stop { state: S },
}

impl<S> Next<S> {
    /// Continue with `state`, timer unchanged.
    pub fn cont(state: S) -> Self {
        Self::Continue {
            state,
            timer: Timer::Unchanged,
        }
    }

    /// Continue with `state` and a fresh inactivity window.
    pub fn cont_for(state: S, timeout: Duration) -> Self {
        Self::Continue {
            state,
            timer: Timer::Arm(timeout),
        }
    }

    /// Continue with `state` and no automatic expiry.
    pub fn cont_forever(state: S) -> Self {
        Self::Continue {
            state,
            timer: Timer::Clear,
        }
    }

    pub fn stop(state: S) -> Self {
        Self::Stop { state }
    }
}

/// Result of `init`/`resume`: the session's first state and optional timeout.
#[derive(Debug, PartialEq)]
pub struct Started<S> {
    pub state: S,
    pub timeout: Option<Duration>,
}

impl<S> Started<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            timeout: None,
        }
    }

    pub fn with_timeout(state: S, timeout: Duration) -> Self {
        Self {
            state,
            timeout: Some(timeout),
        }
    }
}

/// Stateful, per-conversation handler.
///
/// Each conversation gets its own session whose state is owned by exactly one
/// task; callbacks receive the state by value and hand it back through
/// [`Next`]. Every session has a long-lived task, so bots that see many
/// conversations should arm a timeout to retire idle ones.
pub trait ChatBot: Send + Sync + 'static {
    /// Per-conversation state.
    type State: Send + 'static;
    /// Out-of-band messages accepted by `handle_info` (use `()` if unused).
    type Message: Send + 'static;

    /// Map an update to a conversation, or ignore it.
    fn classify(&self, kind: Option<&str>, update: &Update) -> anyhow::Result<Route> {
        let _ = kind;
        Ok(default_route(update))
    }

    /// Invoked once when a conversation starts.
    fn init(
        &self,
        chat: &ConversationHandle,
    ) -> impl Future<Output = anyhow::Result<Started<Self::State>>> + Send;

    /// Receives an update and the current state; returns the next state.
    fn handle_update(
        &self,
        update: Update,
        ctx: &BotContext,
        state: Self::State,
    ) -> impl Future<Output = anyhow::Result<Next<Self::State>>> + Send;

    /// Invoked when the inactivity window elapses. Stops the session by default.
    fn handle_timeout(
        &self,
        ctx: &BotContext,
        chat_id: &ConversationId,
        state: Self::State,
    ) -> impl Future<Output = anyhow::Result<Next<Self::State>>> + Send {
        let _ = (ctx, chat_id);
        async move { Ok(Next::stop(state)) }
    }

    /// Receives an out-of-band message sent through `SessionHandle::notify`.
    fn handle_info(
        &self,
        message: Self::Message,
        ctx: &BotContext,
        chat_id: &ConversationId,
        state: Self::State,
    ) -> impl Future<Output = anyhow::Result<Next<Self::State>>> + Send {
        let _ = (message, ctx);
        tracing::warn!(%chat_id, "unhandled out-of-band message, ignoring");
        async move { Ok(Next::cont(state)) }
    }

    /// Invoked instead of `init` when a session is resumed with a seed state.
    fn resume(
        &self,
        chat: &ConversationHandle,
        seed: Self::State,
    ) -> impl Future<Output = anyhow::Result<Started<Self::State>>> + Send {
        let _ = chat;
        async move { Ok(Started::new(seed)) }
    }
}
