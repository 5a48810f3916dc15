//! The per-conversation task loop.
//!
//! A session waits for whichever comes first: a shutdown signal, a mailbox
//! item (update or out-of-band message) or the inactivity deadline. Each
//! wake-up runs exactly one callback to completion before the next wait, so
//! the state is never touched by two invocations at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parley_types::context::BotContext;
use parley_types::conversation::ConversationId;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::handle::{Command, SessionHandle};
use crate::bot::{ChatBot, Next, Started, Timer};
use crate::guard::guarded;
use crate::registry::ChatRegistry;

/// Which callback produced a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Update,
    Info,
    Timeout,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Update => "handle_update",
            Phase::Info => "handle_info",
            Phase::Timeout => "handle_timeout",
        }
    }
}

enum Event<M> {
    Command(Command<M>),
    Timeout,
    Shutdown,
    /// Every handle was dropped.
    Abandoned,
}

#[derive(Debug, Clone, Copy)]
enum StopReason {
    Requested(Phase),
    Crashed,
    Shutdown,
    Abandoned,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            StopReason::Requested(Phase::Timeout) => "timeout",
            StopReason::Requested(_) => "requested",
            StopReason::Crashed => "crashed",
            StopReason::Shutdown => "shutdown",
            StopReason::Abandoned => "abandoned",
        }
    }
}

/// Inactivity window and the instant it elapses.
#[derive(Debug)]
struct InactivityTimer {
    window: Option<Duration>,
    deadline: Option<Instant>,
}

impl InactivityTimer {
    fn new(window: Option<Duration>) -> Self {
        Self {
            window,
            deadline: window.map(|w| Instant::now() + w),
        }
    }

    /// Apply a callback's timer request. `activity` is false for out-of-band
    /// steps, which leave an unchanged deadline where it is.
    fn apply(&mut self, timer: Timer, activity: bool) {
        match timer {
            Timer::Arm(window) => {
                self.window = Some(window);
                self.deadline = Some(Instant::now() + window);
            }
            Timer::Clear => {
                self.window = None;
                self.deadline = None;
            }
            Timer::Unchanged if activity => {
                self.deadline = self.window.map(|w| Instant::now() + w);
            }
            Timer::Unchanged => {}
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

/// A session's registry entry and live-session slot.
///
/// Released explicitly when the session loop exits, or on drop if the task
/// unwinds first. Releasing twice is a no-op.
pub(crate) struct SessionLease<M: Send + 'static> {
    registry: Arc<ChatRegistry<SessionHandle<M>>>,
    chat_id: ConversationId,
    instance: Uuid,
    live: Arc<AtomicUsize>,
    released: bool,
}

impl<M: Send + 'static> SessionLease<M> {
    pub(crate) fn new(
        registry: Arc<ChatRegistry<SessionHandle<M>>>,
        chat_id: ConversationId,
        instance: Uuid,
        live: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            registry,
            chat_id,
            instance,
            live,
            released: false,
        }
    }

    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.unregister_instance(&self.chat_id, self.instance);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<M: Send + 'static> Drop for SessionLease<M> {
    fn drop(&mut self) {
        self.release();
    }
}

/// One running conversation.
pub(crate) struct SessionServer<B: ChatBot> {
    bot: Arc<B>,
    ctx: BotContext,
    chat_id: ConversationId,
    rx: mpsc::Receiver<Command<B::Message>>,
    shutdown: CancellationToken,
    lease: SessionLease<B::Message>,
}

impl<B: ChatBot> SessionServer<B> {
    pub(crate) fn new(
        bot: Arc<B>,
        ctx: BotContext,
        chat_id: ConversationId,
        rx: mpsc::Receiver<Command<B::Message>>,
        shutdown: CancellationToken,
        lease: SessionLease<B::Message>,
    ) -> Self {
        Self {
            bot,
            ctx,
            chat_id,
            rx,
            shutdown,
            lease,
        }
    }

    /// Run until a callback stops the session, a callback fails, every
    /// handle is gone, or the supervisor shuts down.
    pub(crate) async fn run(mut self, started: Started<B::State>) {
        let mut state = started.state;
        let mut timer = InactivityTimer::new(started.timeout);
        info!(timeout = ?started.timeout, "chat session started");

        let reason = loop {
            let event = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => Event::Shutdown,
                command = self.rx.recv() => match command {
                    Some(command) => Event::Command(command),
                    None => Event::Abandoned,
                },
                () = timer.expired() => Event::Timeout,
            };

            let (result, phase) = match event {
                Event::Shutdown => break StopReason::Shutdown,
                Event::Abandoned => break StopReason::Abandoned,
                Event::Command(Command::Update(update)) => {
                    let step = self.bot.handle_update(update, &self.ctx, state);
                    (guarded(step).await, Phase::Update)
                }
                Event::Command(Command::Info(message)) => {
                    let step = self.bot.handle_info(message, &self.ctx, &self.chat_id, state);
                    (guarded(step).await, Phase::Info)
                }
                Event::Timeout => {
                    debug!("inactivity timeout elapsed");
                    let step = self.bot.handle_timeout(&self.ctx, &self.chat_id, state);
                    (guarded(step).await, Phase::Timeout)
                }
            };

            match result {
                Ok(Next::Continue { state: next, timer: request }) => {
                    state = next;
                    timer.apply(request, phase != Phase::Info);
                }
                Ok(Next::Stop { .. }) => break StopReason::Requested(phase),
                Err(reason) => {
                    error!(%reason, callback = phase.as_str(), "chat session callback failed");
                    break StopReason::Crashed;
                }
            }
        };

        // Identity and slot are free before senders see the mailbox closed.
        self.lease.release();
        self.rx.close();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "chat session stopped with queued messages, dropping them");
        }
        info!(reason = reason.as_str(), "chat session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_rearms_window_on_activity() {
        let mut timer = InactivityTimer::new(Some(Duration::from_millis(50)));
        let first = timer.deadline.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        timer.apply(Timer::Unchanged, true);
        assert_eq!(timer.deadline.unwrap(), first + Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_unchanged_out_of_band_keeps_deadline() {
        let mut timer = InactivityTimer::new(Some(Duration::from_millis(50)));
        let first = timer.deadline.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        timer.apply(Timer::Unchanged, false);
        assert_eq!(timer.deadline.unwrap(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_arm_and_clear() {
        let mut timer = InactivityTimer::new(None);
        assert!(timer.deadline.is_none());

        timer.apply(Timer::Arm(Duration::from_secs(1)), false);
        assert_eq!(timer.window, Some(Duration::from_secs(1)));
        assert!(timer.deadline.is_some());

        timer.apply(Timer::Clear, true);
        assert!(timer.window.is_none());
        assert!(timer.deadline.is_none());

        // Nothing to restart once cleared.
        timer.apply(Timer::Unchanged, true);
        assert!(timer.deadline.is_none());
    }

    #[test]
    fn lease_releases_once() {
        let registry = Arc::new(ChatRegistry::<SessionHandle<()>>::new());
        let live = Arc::new(AtomicUsize::new(1));
        let chat_id = ConversationId::from(7);
        let instance = Uuid::now_v7();
        let (tx, _rx) = mpsc::channel(1);
        registry
            .register(chat_id.clone(), SessionHandle::new(chat_id.clone(), instance, tx))
            .unwrap();

        let mut lease = SessionLease::new(Arc::clone(&registry), chat_id.clone(), instance, Arc::clone(&live));
        lease.release();
        assert!(registry.is_empty());
        assert_eq!(live.load(Ordering::SeqCst), 0);

        drop(lease);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_timer_never_fires() {
        let timer = InactivityTimer::new(None);
        let fired = tokio::time::timeout(Duration::from_secs(3600), timer.expired()).await;
        assert!(fired.is_err());
    }
}
