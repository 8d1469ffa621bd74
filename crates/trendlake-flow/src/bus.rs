//! The notification bus.
//!
//! At-least-once, ordered-per-publisher pub/sub carrying "artifact written"
//! events between stages. The trait mirrors a durable cloud bus; the
//! in-memory implementation exists for tests, local runs, and as the
//! reference for the delivery contract:
//!
//! - Every subscriber receives every event published to its topic after it
//!   subscribed (fan-out).
//! - Delivery per subscriber is FIFO, which preserves single-publisher
//!   ordering. There is no ordering across topics or publishers.
//! - A handler failure is retried with bounded exponential backoff when
//!   retryable; exhausted or non-retryable failures route the event to the
//!   dead-letter queue. Events are never silently dropped.
//!
//! Handlers must be idempotent: duplicate delivery of the same event is
//! part of the contract, not an edge case.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, Notify};

use trendlake_core::{Stage, StageEvent};

use crate::error::{Error, Result};
use crate::metrics;
use crate::retry::RetryPolicy;

/// Returns the topic carrying one stage's artifact events.
#[must_use]
pub const fn stage_topic(stage: Stage) -> &'static str {
    match stage {
        Stage::Metadata => "artifacts.metadata",
        Stage::Transcripts => "artifacts.transcripts",
        Stage::TextAnalysis => "artifacts.text",
    }
}

/// A subscriber's event callback.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable handler name for logs, metrics, and dead-letter entries.
    fn name(&self) -> &str;

    /// Processes one event.
    ///
    /// Must be idempotent and safe to invoke concurrently for different
    /// events.
    ///
    /// # Errors
    ///
    /// Retryable errors cause redelivery after backoff; anything else
    /// dead-letters the event.
    async fn handle(&self, event: &StageEvent) -> Result<()>;
}

/// Pub/sub channel between stages.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Publishes an event to every current subscriber of `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bus`] if the bus cannot accept the event.
    async fn publish(&self, topic: &str, event: StageEvent) -> Result<()>;

    /// Registers a handler for `topic`.
    ///
    /// Only events published after subscription are delivered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bus`] if the subscription cannot be registered.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> Result<()>;
}

/// An event that exhausted its retries, held for manual inspection.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Topic the event was published to.
    pub topic: String,
    /// Handler that failed.
    pub handler: String,
    /// The event itself.
    pub event: StageEvent,
    /// The final error.
    pub error: String,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// When the event was dead-lettered.
    pub failed_at: DateTime<Utc>,
}

/// Holds dead-lettered events until an operator drains them.
#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
}

impl DeadLetterQueue {
    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn push(&self, entry: DeadLetter) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| Error::bus("dead-letter lock poisoned"))?
            .push(entry);
        Ok(())
    }

    /// Removes and returns all entries in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn drain(&self) -> Result<Vec<DeadLetter>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::bus("dead-letter lock poisoned"))?;
        Ok(std::mem::take(&mut *entries))
    }

    /// Returns the number of held entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| Error::bus("dead-letter lock poisoned"))?
            .len())
    }

    /// Returns true if no entries are held.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    notify: Notify,
}

impl InFlight {
    fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

struct Subscription {
    sender: mpsc::UnboundedSender<StageEvent>,
}

/// In-memory notification bus.
///
/// Single-process only; production deployments put a durable queue behind
/// the same trait. Each subscriber runs on its own worker task, so handler
/// backoff for one subscriber never delays another.
pub struct InMemoryBus {
    retry: RetryPolicy,
    dead_letters: Arc<DeadLetterQueue>,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    in_flight: Arc<InFlight>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl InMemoryBus {
    /// Creates a bus with the given redelivery policy.
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            dead_letters: Arc::new(DeadLetterQueue::default()),
            subscriptions: RwLock::new(HashMap::new()),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Returns the dead-letter queue.
    #[must_use]
    pub fn dead_letters(&self) -> Arc<DeadLetterQueue> {
        Arc::clone(&self.dead_letters)
    }

    /// Waits until every published event has been fully processed
    /// (handled, or dead-lettered).
    ///
    /// Test and shutdown helper; new publishes made while waiting extend
    /// the wait.
    pub async fn settled(&self) {
        loop {
            let notified = self.in_flight.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn spawn_worker(
        &self,
        topic: String,
        handler: Arc<dyn EventHandler>,
        mut receiver: mpsc::UnboundedReceiver<StageEvent>,
    ) {
        let retry = self.retry;
        let dead_letters = Arc::clone(&self.dead_letters);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                deliver(&topic, handler.as_ref(), &event, retry, &dead_letters).await;
                in_flight.decrement();
            }
        });
    }
}

async fn deliver(
    topic: &str,
    handler: &dyn EventHandler,
    event: &StageEvent,
    retry: RetryPolicy,
    dead_letters: &DeadLetterQueue,
) {
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        match handler.handle(event).await {
            Ok(()) => return,
            Err(e) if e.is_retryable() && retry.allows_retry(attempt) => {
                metrics::record_redelivery(handler.name());
                tracing::warn!(
                    topic,
                    handler = handler.name(),
                    event_id = %event.event_id,
                    attempt,
                    error = %e,
                    "handler failed, redelivering after backoff"
                );
                tokio::time::sleep(retry.delay_for(attempt)).await;
            }
            Err(e) => {
                metrics::record_dead_letter(handler.name());
                tracing::error!(
                    topic,
                    handler = handler.name(),
                    event_id = %event.event_id,
                    attempts = attempt,
                    error = %e,
                    "event dead-lettered"
                );
                let entry = DeadLetter {
                    topic: topic.to_string(),
                    handler: handler.name().to_string(),
                    event: event.clone(),
                    error: e.to_string(),
                    attempts: attempt,
                    failed_at: Utc::now(),
                };
                if let Err(push_err) = dead_letters.push(entry) {
                    tracing::error!(error = %push_err, "failed to record dead letter");
                }
                return;
            }
        }
    }
}

#[async_trait]
impl NotificationBus for InMemoryBus {
    async fn publish(&self, topic: &str, event: StageEvent) -> Result<()> {
        let subscriptions = self
            .subscriptions
            .read()
            .map_err(|_| Error::bus("subscription lock poisoned"))?;

        let Some(subscribers) = subscriptions.get(topic) else {
            tracing::debug!(topic, event_id = %event.event_id, "no subscribers for topic");
            return Ok(());
        };

        for subscription in subscribers {
            self.in_flight.increment();
            if subscription.sender.send(event.clone()).is_err() {
                // Worker is gone; this delivery will never complete.
                self.in_flight.decrement();
                tracing::warn!(topic, "subscriber worker has shut down");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.spawn_worker(topic.to_string(), handler, receiver);

        self.subscriptions
            .write()
            .map_err(|_| Error::bus("subscription lock poisoned"))?
            .entry(topic.to_string())
            .or_default()
            .push(Subscription { sender });
        Ok(())
    }
}
