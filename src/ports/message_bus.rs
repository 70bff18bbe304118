//! Message Bus Port - Pub/Sub Transport Interface
//!
//! The transport only moves opaque payloads between subjects. Envelopes,
//! correlation and timeouts are layered on top by the `Messenger`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::error::Result;

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
  /// Subject the message was published on.
  pub subject: String,
  /// Subject replies should be published to, if any.
  pub reply: Option<String>,
  /// Raw payload.
  pub payload: Vec<u8>,
}

/// An active subscription.
///
/// Dropping the receiver stops delivery; `MessageBus::unsubscribe`
/// closes the channel from the publishing side so listeners drain.
#[derive(Debug)]
pub struct Subscription {
  /// Identifier for `unsubscribe`.
  pub id: u64,
  /// Subject subscribed to.
  pub subject: String,
  /// Delivered messages.
  pub receiver: mpsc::Receiver<BusMessage>,
}

/// Reliable fan-out publish and subscribe.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
  /// Deliver a payload to every current subscriber of `subject`.
  async fn publish(&self, subject: &str, reply: Option<&str>, payload: Vec<u8>) -> Result<()>;

  /// Start receiving messages published on `subject`.
  async fn subscribe(&self, subject: &str) -> Result<Subscription>;

  /// Stop a subscription and close its channel.
  async fn unsubscribe(&self, id: u64) -> Result<()>;

  /// A fresh, unique subject for collecting replies.
  fn new_inbox(&self) -> String;
}
