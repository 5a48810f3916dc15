//! Bounded asynchronous dispatcher for stateless bots.
//!
//! Every admitted update runs `Bot::handle_update` in its own task. A
//! `Semaphore` sized to `max_bot_concurrency` bounds how many run at once;
//! each task owns its permit, so the slot is released however the task ends.
//! With no ceiling configured, admission is unbounded.

use std::sync::Arc;

use parley_types::config::{AdmissionPolicy, DispatchConfig};
use parley_types::context::BotContext;
use parley_types::error::DispatchError;
use parley_types::update::Update;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::bot::Bot;
use crate::dispatch::Dispatch;
use crate::guard::guarded;

/// Concurrency ceiling and the semaphore enforcing it.
struct Budget {
    ceiling: usize,
    permits: Arc<Semaphore>,
}

/// Runs each update as an isolated task under a global concurrency ceiling.
pub struct AsyncDispatcher<B: Bot> {
    bot: Arc<B>,
    ctx: BotContext,
    budget: Option<Budget>,
    admission: AdmissionPolicy,
    tasks: TaskTracker,
}

impl<B: Bot> AsyncDispatcher<B> {
    /// A configured ceiling outside `1..=MAX_CAPACITY` is clamped.
    pub fn new(bot: B, ctx: BotContext, config: &DispatchConfig) -> Self {
        let ceiling = config.effective_ceiling();
        if ceiling != config.max_bot_concurrency {
            warn!(
                requested = ?config.max_bot_concurrency,
                applied = ?ceiling,
                "max_bot_concurrency out of range, clamped"
            );
        }
        let budget = ceiling.map(|ceiling| Budget {
            ceiling,
            permits: Arc::new(Semaphore::new(ceiling)),
        });
        Self {
            bot: Arc::new(bot),
            ctx,
            budget,
            admission: config.admission,
            tasks: TaskTracker::new(),
        }
    }

    /// Admit `update` and spawn its handler.
    ///
    /// Under `AdmissionPolicy::Block` this waits for a free slot; under
    /// `Reject` it fails with `Backpressure` when none is free.
    pub async fn dispatch(&self, update: Update) -> Result<(), DispatchError> {
        if self.tasks.is_closed() {
            return Err(DispatchError::ShutDown);
        }
        let permit = self.admit().await?;

        let bot = Arc::clone(&self.bot);
        let ctx = self.ctx.clone();
        let span = info_span!("update", bot = ctx.bot(), update_id = ?update.update_id());
        self.tasks.spawn(
            async move {
                let _permit = permit;
                match guarded(bot.handle_update(update, &ctx)).await {
                    Ok(()) => debug!("update handled"),
                    Err(reason) => error!(%reason, "update handler failed"),
                }
            }
            .instrument(span),
        );
        Ok(())
    }

    async fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, DispatchError> {
        let Some(budget) = &self.budget else {
            return Ok(None);
        };
        let permits = Arc::clone(&budget.permits);
        let permit = match self.admission {
            AdmissionPolicy::Block => permits
                .acquire_owned()
                .await
                .map_err(|_| DispatchError::ShutDown)?,
            AdmissionPolicy::Reject => permits.try_acquire_owned().map_err(|err| match err {
                TryAcquireError::NoPermits => DispatchError::Backpressure(budget.ceiling),
                TryAcquireError::Closed => DispatchError::ShutDown,
            })?,
        };
        Ok(Some(permit))
    }

    /// Handler units currently running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// The configured ceiling, `None` when unbounded.
    pub fn ceiling(&self) -> Option<usize> {
        self.budget.as_ref().map(|b| b.ceiling)
    }

    /// Stop admitting updates and wait for every running handler to finish.
    ///
    /// Callers blocked waiting for a slot fail with `ShutDown`.
    pub async fn shutdown(&self) {
        self.tasks.close();
        if let Some(budget) = &self.budget {
            budget.permits.close();
        }
        self.tasks.wait().await;
        debug!(bot = self.ctx.bot(), "async dispatcher shut down");
    }
}

impl<B: Bot> Dispatch for AsyncDispatcher<B> {
    async fn dispatch_update(&self, update: Update) -> Result<(), DispatchError> {
        self.dispatch(update).await
    }
}

impl<B: Bot> std::fmt::Debug for AsyncDispatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncDispatcher")
            .field("bot", &self.ctx.bot())
            .field("ceiling", &self.ceiling())
            .field("admission", &self.admission)
            .field("in_flight", &self.tasks.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
