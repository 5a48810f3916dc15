//! Shared test bots for the session, supervisor and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parley_types::context::BotContext;
use parley_types::conversation::{ConversationHandle, ConversationId};
use parley_types::update::Update;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::bot::{ChatBot, Next, Route, Started};
use crate::session::SessionHandle;

/// Build a text message update for `chat_id`.
pub(crate) fn text_update(update_id: i64, chat_id: impl Into<Value>, text: &str) -> Update {
    Update::new(json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1_700_000_000,
            "chat": {"id": chat_id.into(), "type": "private"},
            "text": text
        }
    }))
}

/// Out-of-band messages understood by [`TestBot`].
#[derive(Debug)]
pub(crate) enum Probe {
    /// Reply with a copy of the session state.
    State(oneshot::Sender<Vec<String>>),
    Stop,
    Unknown,
}

impl Probe {
    /// Read a session's state through its mailbox.
    pub(crate) async fn state_of(session: &SessionHandle<Probe>) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        session.notify(Probe::State(tx)).await.unwrap();
        rx.await.unwrap()
    }
}

#[derive(Default)]
pub(crate) struct TestBotOptions {
    pub init_delay: Option<Duration>,
    pub init_timeout: Option<Duration>,
    pub resume_timeout: Option<Duration>,
    pub fail_init: bool,
    /// How many timeouts continue before one stops the session.
    pub continue_on_timeout: usize,
    pub classify: Option<fn(Option<&str>, &Update) -> anyhow::Result<Route>>,
}

/// Chat bot whose state is the list of texts it has seen, in order.
///
/// Texts `/stop`, `/fail` and `/panic` stop, fail and crash the session.
pub(crate) struct TestBot {
    options: TestBotOptions,
    inits: AtomicUsize,
    resumes: AtomicUsize,
    timeouts: AtomicUsize,
}

impl TestBot {
    pub(crate) fn new(options: TestBotOptions) -> Self {
        Self {
            options,
            inits: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            timeouts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub(crate) fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    pub(crate) fn timeouts(&self) -> usize {
        self.timeouts.load(Ordering::SeqCst)
    }
}

impl ChatBot for TestBot {
    type State = Vec<String>;
    type Message = Probe;

    fn classify(&self, kind: Option<&str>, update: &Update) -> anyhow::Result<Route> {
        match self.options.classify {
            Some(classify) => classify(kind, update),
            None => Ok(crate::bot::default_route(update)),
        }
    }

    async fn init(&self, _chat: &ConversationHandle) -> anyhow::Result<Started<Vec<String>>> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.options.init_delay {
            tokio::time::sleep(delay).await;
        }
        if self.options.fail_init {
            anyhow::bail!("init refused");
        }
        Ok(Started {
            state: Vec::new(),
            timeout: self.options.init_timeout,
        })
    }

    async fn handle_update(
        &self,
        update: Update,
        _ctx: &BotContext,
        mut state: Vec<String>,
    ) -> anyhow::Result<Next<Vec<String>>> {
        let text = update
            .payload()
            .and_then(|m| m.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match text.as_str() {
            "/stop" => Ok(Next::stop(state)),
            "/fail" => anyhow::bail!("handler failed"),
            "/panic" => panic!("handler panicked"),
            _ => {
                state.push(text);
                Ok(Next::cont(state))
            }
        }
    }

    async fn handle_timeout(
        &self,
        _ctx: &BotContext,
        _chat_id: &ConversationId,
        state: Vec<String>,
    ) -> anyhow::Result<Next<Vec<String>>> {
        let seen = self.timeouts.fetch_add(1, Ordering::SeqCst) + 1;
        if seen <= self.options.continue_on_timeout {
            Ok(Next::cont(state))
        } else {
            Ok(Next::stop(state))
        }
    }

    async fn handle_info(
        &self,
        message: Probe,
        _ctx: &BotContext,
        _chat_id: &ConversationId,
        state: Vec<String>,
    ) -> anyhow::Result<Next<Vec<String>>> {
        match message {
            Probe::State(reply) => {
                let _ = reply.send(state.clone());
                Ok(Next::cont(state))
            }
            Probe::Stop => Ok(Next::stop(state)),
            Probe::Unknown => Ok(Next::cont(state)),
        }
    }

    async fn resume(
        &self,
        _chat: &ConversationHandle,
        seed: Vec<String>,
    ) -> anyhow::Result<Started<Vec<String>>> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(Started {
            state: seed,
            timeout: self.options.resume_timeout,
        })
    }
}
