//! Simple stateless pub-sub event handler
//!
//! Components subscribe to exchange events and react to them. The handlers have no access to the internal state of
//! the engine; all they receive is the event itself. Handlers can be async, and each event is handled on its own task.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    name: &'static str,
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(name: &'static str, buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { name, listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for the outstanding handler jobs to finish.
    pub async fn start_handler(mut self) {
        let name = self.name;
        debug!("📬️ Starting {name} event handler");
        // Without the internal sender, the channel closes when the last subscriber is dropped
        drop(self.sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling {name} event");
            let handler = Arc::clone(&self.handler);
            jobs.spawn(async move { (handler)(ev).await });
            while let Some(done) = jobs.try_join_next() {
                log_job_result(name, done);
            }
        }
        debug!("📬️ {name} event channel closed. Waiting for {} jobs to complete", jobs.len());
        while let Some(done) = jobs.join_next().await {
            log_job_result(name, done);
        }
        debug!("📬️ {name} event handler has shut down");
    }
}

fn log_job_result(name: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ {name} event handled"),
        Err(e) => warn!("📬️ A {name} event handler failed: {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}
