//! Chat session supervisor: on-demand creation with at-most-one session per
//! conversation identity.
//!
//! Creation for one identity is serialized by a per-identity async lock: the
//! first caller runs `init`, registers and spawns the session; a concurrent
//! caller for the same identity waits on the lock and then finds the freshly
//! registered session. Different identities never wait on each other.
//!
//! Sessions remove their own registry entry when they stop (normally, on
//! timeout, on failure, or on shutdown) before their mailbox is gone for
//! good, so the next update for that identity starts a fresh session.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parley_types::config::SessionConfig;
use parley_types::context::BotContext;
use parley_types::conversation::{ConversationHandle, ConversationId};
use parley_types::error::SessionError;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::bot::{ChatBot, Started};
use crate::guard::guarded;
use crate::registry::{AlreadyRegistered, ChatRegistry};
use crate::session::SessionHandle;
use crate::session::server::{SessionLease, SessionServer};

/// How a new session obtains its first state.
enum Start<S> {
    Init,
    Resume(S),
}

/// Creates, tracks and shuts down the chat sessions of one bot.
pub struct ChatSupervisor<B: ChatBot> {
    bot: Arc<B>,
    ctx: BotContext,
    config: SessionConfig,
    registry: Arc<ChatRegistry<SessionHandle<B::Message>>>,
    /// Per-identity creation locks; entries exist only while contended.
    creation_locks: DashMap<ConversationId, Arc<Mutex<()>>>,
    /// Live sessions, reserved before init and released by the session lease.
    live: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl<B: ChatBot> ChatSupervisor<B> {
    /// A `mailbox_capacity` outside `1..=MAX_CAPACITY` is clamped.
    pub fn new(bot: Arc<B>, ctx: BotContext, mut config: SessionConfig) -> Self {
        let capacity = config.effective_mailbox_capacity();
        if capacity != config.mailbox_capacity {
            warn!(
                requested = config.mailbox_capacity,
                applied = capacity,
                "mailbox_capacity out of range, clamped"
            );
            config.mailbox_capacity = capacity;
        }
        Self {
            bot,
            ctx,
            config,
            registry: Arc::new(ChatRegistry::new()),
            creation_locks: DashMap::new(),
            live: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// The live session for `chat_id`, if any.
    pub fn lookup(&self, chat_id: &ConversationId) -> Option<SessionHandle<B::Message>> {
        self.registry.lookup(chat_id)
    }

    /// Return the live session for `chat`, starting one via `init` if needed.
    pub async fn get_or_create(
        &self,
        chat: &ConversationHandle,
    ) -> Result<SessionHandle<B::Message>, SessionError> {
        if let Some(session) = self.registry.lookup(&chat.id) {
            return Ok(session);
        }
        self.start(chat, Start::Init).await
    }

    /// Start a session from an externally supplied seed state via `resume`.
    ///
    /// Fails with `AlreadyRunning` if the conversation has a live session.
    pub async fn resume(
        &self,
        chat: &ConversationHandle,
        seed: B::State,
    ) -> Result<SessionHandle<B::Message>, SessionError> {
        self.start(chat, Start::Resume(seed)).await
    }

    /// Number of sessions currently running.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &ChatRegistry<SessionHandle<B::Message>> {
        &self.registry
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Stop every session after its current step and wait for them to exit.
    ///
    /// No new sessions are created afterwards.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        debug!(bot = self.ctx.bot(), "chat supervisor shut down");
    }

    async fn start(
        &self,
        chat: &ConversationHandle,
        start: Start<B::State>,
    ) -> Result<SessionHandle<B::Message>, SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::ShutDown);
        }

        let lock = self
            .creation_locks
            .entry(chat.id.clone())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.start_locked(chat, start).await
        };
        drop(lock);
        // Only the map still holds the lock: nobody is waiting on it.
        self.creation_locks
            .remove_if(&chat.id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn start_locked(
        &self,
        chat: &ConversationHandle,
        start: Start<B::State>,
    ) -> Result<SessionHandle<B::Message>, SessionError> {
        if let Some(existing) = self.registry.lookup(&chat.id) {
            return match start {
                Start::Init => Ok(existing),
                Start::Resume(_) => Err(SessionError::AlreadyRunning(chat.id.clone())),
            };
        }

        // Nothing between the reservation and `spawn` may panic.
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity);

        self.reserve_slot()?;

        let started = match start {
            Start::Init => guarded(self.bot.init(chat)).await,
            Start::Resume(seed) => guarded(self.bot.resume(chat, seed)).await,
        };
        let started = match started {
            Ok(started) => started,
            Err(reason) => {
                self.live.fetch_sub(1, Ordering::SeqCst);
                error!(bot = self.ctx.bot(), chat_id = %chat.id, %reason, "chat session init failed");
                return Err(SessionError::InitFailed {
                    chat_id: chat.id.clone(),
                    reason,
                });
            }
        };

        let instance = Uuid::now_v7();
        let handle = SessionHandle::new(chat.id.clone(), instance, tx);

        if let Err(AlreadyRegistered(winner)) =
            self.registry.register(chat.id.clone(), handle.clone())
        {
            // Someone registered around the creation lock; theirs wins.
            self.live.fetch_sub(1, Ordering::SeqCst);
            debug!(chat_id = %chat.id, "lost session creation race, discarding new session");
            return Ok(winner);
        }

        self.spawn(chat.id.clone(), instance, rx, started);
        Ok(handle)
    }

    /// Take a live-session slot, honoring `max_sessions`.
    fn reserve_slot(&self) -> Result<(), SessionError> {
        match self.config.max_sessions {
            None => {
                self.live.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Some(max) => self
                .live
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                    (live < max).then_some(live + 1)
                })
                .map(|_| ())
                .map_err(|_| {
                    warn!(bot = self.ctx.bot(), max, "session limit reached, refusing new conversation");
                    SessionError::SessionLimitReached(max)
                }),
        }
    }

    fn spawn(
        &self,
        chat_id: ConversationId,
        instance: Uuid,
        rx: mpsc::Receiver<crate::session::Command<B::Message>>,
        started: Started<B::State>,
    ) {
        let lease = SessionLease::new(
            Arc::clone(&self.registry),
            chat_id.clone(),
            instance,
            Arc::clone(&self.live),
        );
        let span = info_span!("chat_session", bot = self.ctx.bot(), chat_id = %chat_id);
        let server = SessionServer::new(
            Arc::clone(&self.bot),
            self.ctx.clone(),
            chat_id,
            rx,
            self.shutdown.child_token(),
            lease,
        );
        self.tasks.spawn(server.run(started).instrument(span));
    }
}

impl<B: ChatBot> std::fmt::Debug for ChatSupervisor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSupervisor")
            .field("bot", &self.ctx.bot())
            .field("live_sessions", &self.live.load(Ordering::SeqCst))
            .field("max_sessions", &self.config.max_sessions)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
