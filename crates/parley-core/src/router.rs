//! Chat router: classify an update to a conversation and forward it to that
//! conversation's session, creating the session on first contact.

use std::sync::Arc;

use parley_types::config::SessionConfig;
use parley_types::context::BotContext;
use parley_types::conversation::{ConversationHandle, ConversationId};
use parley_types::error::{DispatchError, SessionError};
use parley_types::update::Update;
use tracing::{Instrument, debug, info_span, warn};

use crate::bot::{ChatBot, Route};
use crate::dispatch::Dispatch;
use crate::guard::guarded_sync;
use crate::session::SessionHandle;
use crate::supervisor::ChatSupervisor;

/// Delivery attempts when the resolved session stops between lookup and send.
const MAX_DELIVERY_ATTEMPTS: usize = 2;

/// What the router did with an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Delivered(ConversationId),
    Ignored,
}

/// Stateful dispatch front end for a [`ChatBot`].
pub struct ChatRouter<B: ChatBot> {
    bot: Arc<B>,
    supervisor: Arc<ChatSupervisor<B>>,
}

impl<B: ChatBot> ChatRouter<B> {
    pub fn new(bot: B, ctx: BotContext, config: SessionConfig) -> Self {
        let bot = Arc::new(bot);
        let supervisor = Arc::new(ChatSupervisor::new(Arc::clone(&bot), ctx, config));
        Self { bot, supervisor }
    }

    pub fn supervisor(&self) -> &Arc<ChatSupervisor<B>> {
        &self.supervisor
    }

    /// The live session for `chat_id`, for out-of-band messaging.
    pub fn lookup(&self, chat_id: &ConversationId) -> Option<SessionHandle<B::Message>> {
        self.supervisor.lookup(chat_id)
    }

    /// Start a conversation from a seed state (see `ChatSupervisor::resume`).
    pub async fn resume(
        &self,
        chat: &ConversationHandle,
        seed: B::State,
    ) -> Result<SessionHandle<B::Message>, SessionError> {
        self.supervisor.resume(chat, seed).await
    }

    /// Apply the bot's classifier. A failing classifier means "ignore".
    pub fn classify(&self, update: &Update) -> Route {
        match guarded_sync(|| self.bot.classify(update.kind(), update)) {
            Ok(route) => route,
            Err(reason) => {
                warn!(%reason, update_id = ?update.update_id(), "classify failed, ignoring update");
                Route::Ignore
            }
        }
    }

    /// Route one update to its conversation's session.
    ///
    /// Returns once the update is queued in the session mailbox (waiting
    /// while the mailbox is full), not once it is processed.
    pub async fn route(&self, update: Update) -> Result<Routed, SessionError> {
        let chat = match self.classify(&update) {
            Route::Deliver(chat) => chat,
            Route::Ignore => {
                debug!(update_id = ?update.update_id(), kind = ?update.kind(), "update ignored");
                return Ok(Routed::Ignored);
            }
        };

        let mut update = update;
        for _ in 0..MAX_DELIVERY_ATTEMPTS {
            let session = self.supervisor.get_or_create(&chat).await?;
            match session.send_update(update).await {
                Ok(()) => {
                    debug!(chat_id = %chat.id, "update routed");
                    return Ok(Routed::Delivered(chat.id));
                }
                Err(returned) => {
                    debug!(chat_id = %chat.id, "session stopped before delivery, retrying");
                    update = returned;
                }
            }
        }
        Err(SessionError::Closed(chat.id))
    }

    /// Stop every session (see `ChatSupervisor::shutdown`).
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}

impl<B: ChatBot> Dispatch for ChatRouter<B> {
    async fn dispatch_update(&self, update: Update) -> Result<(), DispatchError> {
        let span = info_span!(
            "route",
            bot = self.supervisor.context().bot(),
            update_id = ?update.update_id()
        );
        self.route(update)
            .instrument(span)
            .await
            .map(|_| ())
            .map_err(DispatchError::from)
    }
}

impl<B: ChatBot> std::fmt::Debug for ChatRouter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRouter")
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
