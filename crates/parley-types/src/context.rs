//! The calling context handed to every handler invocation.

use secrecy::{ExposeSecret, SecretString};

use std::fmt;
use std::sync::Arc;

/// Credential and identity of the bot an update was received for.
///
/// Application handlers pass this to their outbound API client; the core
/// only carries it and uses `bot` as log metadata. Cloning is cheap: the
/// token is shared.
#[derive(Clone)]
pub struct BotContext {
    bot: String,
    token: Arc<SecretString>,
}

impl BotContext {
    pub fn new(bot: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            bot: bot.into(),
            token: Arc::new(SecretString::from(token.into())),
        }
    }

    /// The bot name used as the `bot` log field.
    pub fn bot(&self) -> &str {
        &self.bot
    }

    /// The API token, for outbound clients.
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl fmt::Debug for BotContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotContext")
            .field("bot", &self.bot)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
