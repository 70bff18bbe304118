//! In-Process Message Bus
//!
//! Fan-out publish/subscribe over bounded `tokio::mpsc` channels. Every
//! subscriber of a subject receives every message published on it after
//! it subscribed. Publishing to a subject nobody listens on is a no-op,
//! the same as on a NATS server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::domain::error::{PipelineError, Result};
use crate::ports::message_bus::{BusMessage, MessageBus, Subscription};

/// Per-subscription buffer.
const SUBSCRIPTION_BUFFER: usize = 1024;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<BusMessage>,
}

#[derive(Default)]
pub struct InMemoryBus {
    subjects: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a subject.
    pub async fn subscriber_count(&self, subject: &str) -> usize {
        self.subjects.read().await.get(subject).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, subject: &str, reply: Option<&str>, payload: Vec<u8>) -> Result<()> {
        let senders: Vec<(u64, mpsc::Sender<BusMessage>)> = self
            .subjects
            .read()
            .await
            .get(subject)
            .map(|subs| subs.iter().map(|s| (s.id, s.sender.clone())).collect())
            .unwrap_or_default();

        if senders.is_empty() {
            trace!(subject, "No subscribers, message dropped");
            return Ok(());
        }

        let message = BusMessage {
            subject: subject.to_string(),
            reply: reply.map(str::to_string),
            payload,
        };

        let mut closed = Vec::new();
        for (id, sender) in senders {
            if sender.send(message.clone()).await.is_err() {
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            let mut subjects = self.subjects.write().await;
            if let Some(subs) = subjects.get_mut(subject) {
                subs.retain(|s| !closed.contains(&s.id));
                if subs.is_empty() {
                    subjects.remove(subject);
                }
            }
            debug!(subject, dropped = closed.len(), "Pruned closed subscriptions");
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        if subject.is_empty() {
            return Err(PipelineError::BusMalformed("empty subject".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subjects
            .write()
            .await
            .entry(subject.to_string())
            .or_default()
            .push(Subscriber { id, sender });

        Ok(Subscription {
            id,
            subject: subject.to_string(),
            receiver,
        })
    }

    async fn unsubscribe(&self, id: u64) -> Result<()> {
        let mut subjects = self.subjects.write().await;
        subjects.retain(|_, subs| {
            subs.retain(|s| s.id != id);
            !subs.is_empty()
        });
        Ok(())
    }

    fn new_inbox(&self) -> String {
        format!("_INBOX.{}", Uuid::new_v4().simple())
    }
}
