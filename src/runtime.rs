//! Runtime for routing messages
//!
//! One worker task per thread, fed through an mpsc channel: messages of a
//! thread are routed one at a time in delivery order while different threads
//! proceed concurrently.

#[cfg(test)]
pub mod testing;

use crate::router::MessageRouter;
use crate::transport::{InboundMessage, Transport, TransportError};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

const INBOUND_QUEUE: usize = 128;
const IDLE_SWEEP: Duration = Duration::from_secs(60);

/// Handle to a thread's worker
struct ThreadHandle {
    tx: mpsc::UnboundedSender<InboundMessage>,
    /// Messages queued or being routed
    pending: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl ThreadHandle {
    fn send(&self, message: InboundMessage) -> Result<(), InboundMessage> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(message).map_err(|mpsc::error::SendError(message)| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            message
        })
    }

    fn is_idle(&self) -> bool {
        self.tx.is_closed() || self.pending.load(Ordering::SeqCst) == 0
    }
}

/// Manager for all per-thread workers
pub struct RouterManager {
    router: Arc<MessageRouter>,
    workers: RwLock<HashMap<String, ThreadHandle>>,
}

impl RouterManager {
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self {
            router,
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Queue a message on its thread's worker, starting one if needed.
    /// Never waits on a worker, so a stalled thread cannot hold up others.
    pub async fn dispatch(&self, message: InboundMessage) {
        let message = match self.workers.read().await.get(&message.thread_id) {
            Some(handle) => match handle.send(message) {
                Ok(()) => return,
                Err(message) => message,
            },
            None => message,
        };

        let thread_id = message.thread_id.clone();
        let mut workers = self.workers.write().await;
        let message = match workers.get(&thread_id) {
            Some(handle) => match handle.send(message) {
                Ok(()) => return,
                Err(message) => {
                    // The worker stopped after a panic; give the thread a fresh one
                    tracing::warn!(thread_id = %thread_id, "Worker gone, restarting");
                    message
                }
            },
            None => message,
        };

        let handle = self.spawn_worker(&thread_id);
        if handle.send(message).is_err() {
            tracing::error!(thread_id = %thread_id, "Failed to queue message");
        }
        workers.insert(thread_id, handle);
    }

    fn spawn_worker(&self, thread_id: &str) -> ThreadHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(run_worker(
            thread_id.to_string(),
            Arc::clone(&self.router),
            Arc::clone(&pending),
            rx,
        ));
        tracing::debug!(thread_id = %thread_id, "Started thread worker");
        ThreadHandle { tx, pending, task }
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Drop workers with nothing queued; returns how many were stopped.
    /// Dispatch holds the map lock while queueing, so no message can slip
    /// in between the check and the removal.
    pub async fn reap_idle(&self) -> usize {
        let mut workers = self.workers.write().await;
        let before = workers.len();
        workers.retain(|thread_id, handle| {
            let idle = handle.is_idle();
            if idle {
                tracing::debug!(thread_id = %thread_id, "Stopping idle worker");
            }
            !idle
        });
        before - workers.len()
    }

    /// Stop accepting messages and wait for queued ones to finish
    pub async fn shutdown(&self) {
        let workers: Vec<(String, ThreadHandle)> = self.workers.write().await.drain().collect();
        for (thread_id, ThreadHandle { tx, task, .. }) in workers {
            drop(tx);
            if let Err(e) = task.await {
                tracing::warn!(thread_id = %thread_id, error = %e, "Worker ended abnormally");
            }
        }
    }

    /// Route messages from the transport until Ctrl-C
    pub async fn run(&self, transport: Arc<dyn Transport>) -> Result<(), TransportError> {
        self.run_until(transport, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Route messages from the transport until it stops or `shutdown` resolves
    pub async fn run_until(
        &self,
        transport: Arc<dyn Transport>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TransportError> {
        let (tx, mut rx) = mpsc::channel(INBOUND_QUEUE);
        let mut listener = tokio::spawn(async move { transport.listen(tx).await });
        tokio::pin!(shutdown);
        let mut sweep = tokio::time::interval(IDLE_SWEEP);
        sweep.tick().await;

        tracing::info!("Listening for messages");
        let mut stopped = None;
        let mut interrupted = false;
        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => self.dispatch(message).await,
                    None => break,
                },
                result = &mut listener, if stopped.is_none() => {
                    stopped = Some(result);
                }
                _ = sweep.tick() => {
                    let reaped = self.reap_idle().await;
                    if reaped > 0 {
                        tracing::debug!(reaped, "Stopped idle workers");
                    }
                }
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    listener.abort();
                    interrupted = true;
                    break;
                }
            }
        }

        self.shutdown().await;

        if interrupted {
            return Ok(());
        }
        let result = match stopped {
            Some(result) => result,
            None => listener.await,
        };
        match result {
            Ok(result) => result,
            Err(e) => Err(TransportError::Rejected(format!("listener task failed: {e}"))),
        }
    }
}

async fn run_worker(
    thread_id: String,
    router: Arc<MessageRouter>,
    pending: Arc<AtomicUsize>,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
) {
    while let Some(message) = rx.recv().await {
        let message_id = message.message_id.clone();
        let routed = AssertUnwindSafe(router.route(message)).catch_unwind().await;
        if routed.is_err() {
            tracing::error!(
                thread_id = %thread_id,
                message_id = %message_id,
                "Routing panicked, stopping worker"
            );
            return;
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::debug!(thread_id = %thread_id, "Thread worker stopped");
}
