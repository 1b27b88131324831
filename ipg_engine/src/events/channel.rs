//! Stateless pub-sub for engine events.
//!
//! An [`EventHandler`] owns the receiving end of a bounded channel and runs an async callback for every event it
//! receives. Any number of [`EventProducer`]s can publish into it. The handler stops once every producer has been
//! dropped and the jobs it already started have finished.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer { sender: self.sender.clone() }
    }

    pub async fn start_handler(self) {
        let Self { mut receiver, sender, handler } = self;
        // Only producers may keep the channel open
        drop(sender);
        debug!("📬️ Event handler started");
        let mut jobs = JoinSet::new();
        while let Some(event) = receiver.recv().await {
            let handler = Arc::clone(&handler);
            jobs.spawn(async move { handler(event).await });
            // Reap finished jobs so the set does not grow without bound
            while let Some(done) = jobs.try_join_next() {
                if let Err(e) = done {
                    warn!("📬️ An event hook failed. {e}");
                }
            }
        }
        while let Some(done) = jobs.join_next().await {
            if let Err(e) = done {
                warn!("📬️ An event hook failed. {e}");
            }
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    /// Publishes an event, waiting for buffer space if the handler is behind.
    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            warn!("📬️ Event dropped: the handler is no longer running");
        }
    }
}
