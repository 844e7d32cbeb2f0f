use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::models::event::DispatchEvent;

/// One-way event channel to observers. Emitting never blocks and never
/// fails; events published with no subscriber are dropped.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<DispatchEvent>,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer);
        Self { tx }
    }

    pub fn emit(&self, event: DispatchEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }

    /// Async stream over future events; lagged slots are skipped.
    pub fn stream(
        &self,
    ) -> impl tokio_stream::Stream<Item = DispatchEvent> + Send + Unpin + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| result.ok())
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
