//! Messenger - Request/Reply and Bulk Requests over the Bus
//!
//! Wraps the raw `MessageBus` with the `Message` envelope:
//! - `request`: one message, one reply on a private inbox, with a timeout
//! - `bulk_request`: N messages on one subject, N replies correlated by
//!   `reply_to_id`; entries still missing at the deadline come back as
//!   `BusTimeout` failures so the caller always gets a complete map
//! - `listen`: drain a subject through a worker pool, replying to each
//!   request with whatever the handler returns

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::error::{PipelineError, Result};
use crate::domain::message::{Code, Message, Subject};
use crate::ports::message_bus::{BusMessage, MessageBus};
use crate::usecases::worker_pool;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout of cleanup batches.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout of the download batch.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(400);

/// Timeout of compute batches.
pub const COMPUTE_TIMEOUT: Duration = Duration::from_secs(500);

/// Request handler: request envelope in, reply envelope out.
pub type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, Message> + Send + Sync>;

#[derive(Clone)]
pub struct Messenger {
  bus: Arc<dyn MessageBus>,
  metrics: Arc<MetricsRegistry>,
}

/// A running subject listener.
pub struct Listener {
  pub subject: Subject,
  subscription_id: u64,
  pool: JoinHandle<()>,
  drain: JoinHandle<()>,
}

impl Listener {
  /// Unsubscribe and wait for in-flight requests to finish.
  pub async fn stop(self, bus: &dyn MessageBus) -> Result<()> {
    bus.unsubscribe(self.subscription_id).await?;
    if let Err(e) = self.pool.await {
      error!(subject = %self.subject, error = %e, "Listener pool panicked");
    }
    if let Err(e) = self.drain.await {
      error!(subject = %self.subject, error = %e, "Listener drain panicked");
    }
    debug!(subject = %self.subject, "Listener stopped");
    Ok(())
  }
}

impl Messenger {
  pub fn new(bus: Arc<dyn MessageBus>, metrics: Arc<MetricsRegistry>) -> Self {
    Self { bus, metrics }
  }

  pub fn bus(&self) -> &Arc<dyn MessageBus> {
    &self.bus
  }

  pub fn metrics(&self) -> &Arc<MetricsRegistry> {
    &self.metrics
  }

  /// Send one request and wait for its reply.
  ///
  /// # Errors
  /// `BusTimeout` when no reply arrives in time, `BusMalformed` when the
  /// reply is not a valid envelope. Error replies are returned as `Ok`
  /// messages carrying their code.
  pub async fn request(&self, subject: Subject, data: impl Into<String>, wait: Duration) -> Result<Message> {
    let inbox = self.bus.new_inbox();
    let mut sub = self.bus.subscribe(&inbox).await?;

    let payload = Message::request(data).to_bytes()?;
    self.bus.publish(subject.as_str(), Some(&inbox), payload).await?;

    let outcome = timeout(wait, sub.receiver.recv()).await;
    self.bus.unsubscribe(sub.id).await?;

    let reply = match outcome {
      Ok(Some(reply)) => Message::reply_from_bytes(&reply.payload)?,
      Ok(None) => return Err(PipelineError::BusMalformed(format!("inbox for {subject} closed"))),
      Err(_) => {
        return Err(PipelineError::BusTimeout {
          subject: subject.to_string(),
          timeout_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
        });
      }
    };
    self.metrics.record_bus_request(subject.as_str(), reply.code_or_blank().label());
    Ok(reply)
  }

  /// Send one request per `(id, data)` pair and collect every reply.
  ///
  /// The returned map always has one entry per id.
  pub async fn bulk_request(
    &self,
    subject: Subject,
    jobs: Vec<(String, String)>,
    wait: Duration,
  ) -> Result<HashMap<String, Message>> {
    let deadline = Instant::now() + wait;
    let inbox = self.bus.new_inbox();
    let mut sub = self.bus.subscribe(&inbox).await?;

    let mut pending: HashSet<String> = jobs.iter().map(|(id, _)| id.clone()).collect();
    let total = pending.len();

    let bus = Arc::clone(&self.bus);
    let reply_to = inbox.clone();
    let publisher: JoinHandle<Result<()>> = tokio::spawn(async move {
      for (id, data) in jobs {
        let payload = Message::request(data).correlated(Some(id)).to_bytes()?;
        bus.publish(subject.as_str(), Some(&reply_to), payload).await?;
      }
      Ok(())
    });

    let mut replies = HashMap::with_capacity(total);
    while !pending.is_empty() {
      match timeout_at(deadline, sub.receiver.recv()).await {
        Ok(Some(raw)) => match Message::reply_from_bytes(&raw.payload) {
          Ok(reply) => {
            let Some(id) = reply.reply_to_id.clone() else {
              warn!(subject = %subject, "Bulk reply without reply_to_id");
              continue;
            };
            if pending.remove(&id) {
              self.metrics.record_bus_request(subject.as_str(), reply.code_or_blank().label());
              replies.insert(id, reply);
            }
          }
          Err(e) => warn!(subject = %subject, error = %e, "Malformed bulk reply"),
        },
        Ok(None) | Err(_) => break,
      }
    }

    self.bus.unsubscribe(sub.id).await?;
    match publisher.await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => warn!(subject = %subject, error = %e, "Bulk publish failed"),
      Err(e) => error!(subject = %subject, error = %e, "Bulk publisher panicked"),
    }

    if !pending.is_empty() {
      warn!(subject = %subject, missing = pending.len(), total, "Bulk request timed out");
      let timed_out = PipelineError::BusTimeout {
        subject: subject.to_string(),
        timeout_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
      };
      for id in pending {
        self.metrics.record_bus_request(subject.as_str(), Code::GenericError.label());
        replies.insert(id.clone(), Message::failure(&timed_out).correlated(Some(id)));
      }
    }

    Ok(replies)
  }

  /// Publish without waiting for a reply.
  pub async fn publish(&self, subject: Subject, data: impl Into<String>) -> Result<()> {
    let payload = Message::request(data).to_bytes()?;
    self.bus.publish(subject.as_str(), None, payload).await
  }

  /// Send a reply; requests without a reply subject are answered into the void.
  pub async fn reply(&self, reply_to: Option<&str>, message: &Message) -> Result<()> {
    let Some(reply_to) = reply_to else {
      debug!("Request had no reply subject, dropping reply");
      return Ok(());
    };
    self.bus.publish(reply_to, None, message.to_bytes()?).await
  }

  /// Serve a subject with `width` concurrent workers.
  pub async fn listen(&self, subject: Subject, width: usize, handler: Handler) -> Result<Listener> {
    let sub = self.bus.subscribe(subject.as_str()).await?;
    let subscription_id = sub.id;
    let (codes_tx, mut codes_rx) = mpsc::channel::<Code>(1);

    let messenger = self.clone();
    let pool = worker_pool::spawn(
      width,
      sub.receiver,
      codes_tx,
      move |incoming: BusMessage| {
        let messenger = messenger.clone();
        let handler = Arc::clone(&handler);
        async move { messenger.handle(incoming, handler).await }
      },
      move || debug!(subject = %subject, "Listener workers drained"),
    );

    let metrics = Arc::clone(&self.metrics);
    let drain = tokio::spawn(async move {
      while let Some(code) = codes_rx.recv().await {
        metrics.record_bus_request(subject.as_str(), code.label());
      }
    });

    info!(subject = %subject, width, "Listening");
    Ok(Listener {
      subject,
      subscription_id,
      pool,
      drain,
    })
  }

  async fn handle(&self, incoming: BusMessage, handler: Handler) -> Code {
    let reply = match Message::from_bytes(&incoming.payload) {
      Ok(request) => {
        let reply_to_id = request.reply_to_id.clone();
        let reply = match AssertUnwindSafe(handler(request)).catch_unwind().await {
          Ok(reply) => reply,
          Err(_) => {
            error!(subject = %incoming.subject, "Handler panicked");
            Message::with_code(Code::GenericError, "handler panicked")
          }
        };
        reply.correlated(reply_to_id)
      }
      Err(e) => Message::failure(&e),
    };

    let code = reply.code_or_blank();
    if let Err(e) = self.reply(incoming.reply.as_deref(), &reply).await {
      warn!(subject = %incoming.subject, error = %e, "Failed to send reply");
    }
    code
  }
}

/// Wrap an async closure as a `Handler`.
pub fn handler<F, Fut>(f: F) -> Handler
where
  F: Fn(Message) -> Fut + Send + Sync + 'static,
  Fut: std::future::Future<Output = Message> + Send + 'static,
{
  Arc::new(move |msg| Box::pin(f(msg)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::bus::InMemoryBus;

  fn messenger() -> (Messenger, Arc<InMemoryBus>) {
    let bus = Arc::new(InMemoryBus::new());
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    (Messenger::new(bus.clone(), metrics), bus)
  }

  #[tokio::test]
  async fn test_request_reply() {
    let (messenger, bus) = messenger();
    let listener = messenger
      .listen(
        Subject::Status,
        2,
        handler(|msg: Message| async move { Message::ok(format!("echo:{}", msg.data)) }),
      )
      .await
      .unwrap();

    let reply = messenger.request(Subject::Status, "us", DEFAULT_TIMEOUT).await.unwrap();
    assert!(reply.is_ok());
    assert_eq!(reply.data, "echo:us");

    listener.stop(bus.as_ref()).await.unwrap();
  }

  #[tokio::test]
  async fn test_request_timeout() {
    let (messenger, _bus) = messenger();
    let err = messenger
      .request(Subject::Regions, "", Duration::from_millis(20))
      .await
      .unwrap_err();
    assert!(matches!(err, PipelineError::BusTimeout { .. }));
  }

  #[tokio::test]
  async fn test_bulk_request_partial_timeout() {
    let (messenger, bus) = messenger();
    let listener = messenger
      .listen(
        Subject::ComputeLiveAuctions,
        4,
        handler(|msg: Message| async move {
          if msg.data.starts_with("slow") {
            tokio::time::sleep(Duration::from_secs(1)).await;
          }
          Message::ok(msg.data)
        }),
      )
      .await
      .unwrap();

    let jobs = vec![
      ("a".to_string(), "fast-a".to_string()),
      ("b".to_string(), "fast-b".to_string()),
      ("c".to_string(), "slow-c".to_string()),
    ];
    let replies = messenger
      .bulk_request(Subject::ComputeLiveAuctions, jobs, Duration::from_millis(300))
      .await
      .unwrap();

    assert_eq!(replies.len(), 3);
    assert!(replies["a"].is_ok());
    assert_eq!(replies["b"].data, "fast-b");
    assert_eq!(replies["c"].code, Some(Code::GenericError));
    assert_eq!(replies["c"].reply_to_id.as_deref(), Some("c"));

    listener.stop(bus.as_ref()).await.unwrap();
  }

  #[tokio::test]
  async fn test_malformed_request_gets_parse_error() {
    let (messenger, bus) = messenger();
    let listener = messenger
      .listen(Subject::Boot, 1, handler(|_msg: Message| async move { Message::blank() }))
      .await
      .unwrap();

    let inbox = bus.new_inbox();
    let mut sub = bus.subscribe(&inbox).await.unwrap();
    bus.publish("boot", Some(&inbox), b"not json".to_vec()).await.unwrap();
    let reply = Message::reply_from_bytes(&sub.receiver.recv().await.unwrap().payload).unwrap();
    assert_eq!(reply.code, Some(Code::ParseError));

    listener.stop(bus.as_ref()).await.unwrap();
  }

  #[tokio::test]
  async fn test_panicking_handler_does_not_kill_listener() {
    let (messenger, bus) = messenger();
    let listener = messenger
      .listen(
        Subject::PriceListHistory,
        2,
        handler(|msg: Message| async move {
          if msg.data == "boom" {
            panic!("handler failed");
          }
          Message::ok(msg.data)
        }),
      )
      .await
      .unwrap();

    // More panics than workers
    for _ in 0..5 {
      let reply = messenger
        .request(Subject::PriceListHistory, "boom", DEFAULT_TIMEOUT)
        .await
        .unwrap();
      assert_eq!(reply.code, Some(Code::GenericError));
    }

    let reply = messenger
      .request(Subject::PriceListHistory, "fine", DEFAULT_TIMEOUT)
      .await
      .unwrap();
    assert!(reply.is_ok());
    assert_eq!(reply.data, "fine");

    listener.stop(bus.as_ref()).await.unwrap();
  }
}
