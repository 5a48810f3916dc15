use std::fmt;

use parley_types::conversation::ConversationId;
use parley_types::error::SessionError;
use parley_types::update::Update;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::registry::SessionAddress;

/// Mailbox item of a session.
pub(crate) enum Command<M> {
    Update(Update),
    Info(M),
}

/// Address of a running chat session.
///
/// Cheap to clone. Messages sent through any clone are processed in the order
/// they were queued, one at a time. Sending waits while the mailbox is full.
pub struct SessionHandle<M> {
    chat_id: ConversationId,
    instance: Uuid,
    tx: mpsc::Sender<Command<M>>,
}

impl<M: Send + 'static> SessionHandle<M> {
    pub(crate) fn new(chat_id: ConversationId, instance: Uuid, tx: mpsc::Sender<Command<M>>) -> Self {
        Self {
            chat_id,
            instance,
            tx,
        }
    }

    pub fn chat_id(&self) -> &ConversationId {
        &self.chat_id
    }

    /// Queue an update for serialized processing.
    pub async fn deliver(&self, update: Update) -> Result<(), SessionError> {
        self.send_update(update)
            .await
            .map_err(|_| SessionError::Closed(self.chat_id.clone()))
    }

    /// Queue an update, handing it back if the session has stopped.
    pub(crate) async fn send_update(&self, update: Update) -> Result<(), Update> {
        match self.tx.reserve().await {
            Ok(permit) => {
                permit.send(Command::Update(update));
                Ok(())
            }
            Err(_) => Err(update),
        }
    }

    /// Queue an out-of-band message for `ChatBot::handle_info`.
    pub async fn notify(&self, message: M) -> Result<(), SessionError> {
        self.tx
            .send(Command::Info(message))
            .await
            .map_err(|_| SessionError::Closed(self.chat_id.clone()))
    }

    /// Resolves once the session has stopped accepting messages.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

impl<M: Send + 'static> SessionAddress for SessionHandle<M> {
    fn instance(&self) -> Uuid {
        self.instance
    }

    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl<M> Clone for SessionHandle<M> {
    fn clone(&self) -> Self {
        Self {
            chat_id: self.chat_id.clone(),
            instance: self.instance,
            tx: self.tx.clone(),
        }
    }
}

impl<M> fmt::Debug for SessionHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("chat_id", &self.chat_id)
            .field("instance", &self.instance)
            .field("alive", &!self.tx.is_closed())
            .finish()
    }
}
