//! In-process update source.
//!
//! A webhook handler or long-poll loop pushes decoded updates into an
//! [`UpdateSender`]; the paired [`ChannelSource`] becomes the stream that
//! `parley_core::drive` feeds into a dispatcher. The channel is bounded, so a
//! dispatcher that blocks on admission holds producers back as well.

use parley_types::config::MAX_CAPACITY;
use parley_types::error::DispatchError;
use parley_types::update::Update;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

/// Producer half. Cheap to clone; the stream ends once every sender is dropped.
#[derive(Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<Update>,
    capacity: usize,
}

impl UpdateSender {
    /// Queue an update, waiting while the channel is full.
    ///
    /// Fails with `ShutDown` once the consuming side is gone.
    pub async fn push(&self, update: Update) -> Result<(), DispatchError> {
        self.tx.send(update).await.map_err(|_| {
            tracing::debug!("update source consumer dropped, discarding update");
            DispatchError::ShutDown
        })
    }

    /// Queue an update without waiting. A full channel is `Backpressure`.
    pub fn try_push(&self, update: Update) -> Result<(), DispatchError> {
        self.tx.try_send(update).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DispatchError::Backpressure(self.capacity),
            mpsc::error::TrySendError::Closed(_) => DispatchError::ShutDown,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for UpdateSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateSender")
            .field("capacity", &self.capacity)
            .field("queued", &(self.capacity - self.tx.capacity()))
            .finish()
    }
}

/// Consumer half of the in-process update channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Update>,
}

impl ChannelSource {
    /// Create a channel holding at most `capacity` undispatched updates.
    ///
    /// The capacity is clamped into `1..=MAX_CAPACITY`.
    pub fn new(capacity: usize) -> (UpdateSender, ChannelSource) {
        let capacity = capacity.clamp(1, MAX_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);
        (UpdateSender { tx, capacity }, ChannelSource { rx })
    }

    /// Stream of pushed updates, in push order.
    pub fn into_stream(self) -> impl Stream<Item = Update> + Send + Unpin {
        ReceiverStream::new(self.rx)
    }
}
