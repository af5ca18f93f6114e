//! Dispatcher: drains the inbound event queue and handles each event in its
//! own task.
//!
//! The webhook handler only enqueues. The dispatch loop takes one event at a
//! time off the queue and spawns it into a `JoinSet`, so a slow provider call
//! holds up only the event that made it. A semaphore caps how many events are
//! in flight; while the cap is reached the queue fills and the webhook starts
//! dropping events.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::channels::{InboundEvent, ReplySink};
use crate::error::{ChannelError, Error};

use super::dialogue::DialoguePolicy;

/// Best-effort reply when handling an event failed.
pub const ERROR_NOTICE: &str =
    "申し訳ありません。エラーが発生しました。しばらくしてからもう一度お試しください。";

/// Runs the dialogue policy for queued events and delivers the replies.
pub struct Dispatcher {
    policy: Arc<DialoguePolicy>,
    sink: Arc<dyn ReplySink>,
    max_in_flight: usize,
}

impl Dispatcher {
    pub fn new(policy: Arc<DialoguePolicy>, sink: Arc<dyn ReplySink>, max_in_flight: usize) -> Self {
        Self {
            policy,
            sink,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Create the bounded queue and spawn the dispatch loop.
    ///
    /// The loop exits once every sender is dropped and the queue is drained,
    /// after waiting for the events still in flight.
    pub fn spawn(self, capacity: usize) -> (mpsc::Sender<InboundEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        info!(max_in_flight = self.max_in_flight, capacity, "Dispatcher started");
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    async fn run(self, mut rx: mpsc::Receiver<InboundEvent>) {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_joined(joined),
                next = rx.recv() => {
                    let Some(event) = next else {
                        break;
                    };
                    // Never closed, so this only waits for a finished event.
                    let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                        break;
                    };
                    let policy = Arc::clone(&self.policy);
                    let sink = Arc::clone(&self.sink);
                    tasks.spawn(async move {
                        run_event(policy, sink, event).await;
                        drop(permit);
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_joined(joined);
        }
        debug!("Dispatcher stopped");
    }
}

fn log_joined(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Event task failed");
    }
}

/// Where handling an event failed.
enum Failure {
    Handle(Error),
    Deliver(ChannelError),
    Panic(JoinError),
}

/// Handle one event and report any failure to the user.
///
/// The policy and the delivery run in a nested task so a panic in either is
/// caught here and still gets an error notice.
async fn run_event(policy: Arc<DialoguePolicy>, sink: Arc<dyn ReplySink>, event: InboundEvent) {
    let task_sink = Arc::clone(&sink);
    let task_event = event.clone();

    let outcome = tokio::spawn(async move {
        let segments = policy
            .handle(&task_event.user_id, &task_event.text)
            .await
            .map_err(Failure::Handle)?;
        debug!(user_id = %task_event.user_id, segments = segments.len(), "Reply ready");
        task_sink
            .deliver(&task_event, segments)
            .await
            .map_err(Failure::Deliver)
    })
    .await
    .unwrap_or_else(|join_err| Err(Failure::Panic(join_err)));

    let Err(failure) = outcome else {
        return;
    };

    // The reply token is single use. Once delivery has started it may be spent,
    // so the notice goes out by push instead.
    let notice_event = match failure {
        Failure::Handle(e) => {
            error!(user_id = %event.user_id, error = %e, "Failed to handle event");
            event
        }
        Failure::Deliver(e) => {
            error!(user_id = %event.user_id, error = %e, "Failed to deliver reply");
            InboundEvent {
                reply_token: None,
                ..event
            }
        }
        Failure::Panic(e) => {
            error!(user_id = %event.user_id, error = %e, "Event handler panicked");
            InboundEvent {
                reply_token: None,
                ..event
            }
        }
    };

    if let Err(e) = sink
        .deliver(&notice_event, vec![ERROR_NOTICE.to_string()])
        .await
    {
        warn!(user_id = %notice_event.user_id, error = %e, "Could not deliver error notice");
    }
}
