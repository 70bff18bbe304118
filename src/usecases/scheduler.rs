//! Periodic Tasks
//!
//! A ticker paired with a `stop` / `stopped` channel pair. On stop the
//! in-flight tick finishes, no further tick starts, the ticker is dropped
//! and `stopped` is signalled.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub struct PeriodicTask {
  name: &'static str,
  stop_tx: oneshot::Sender<()>,
  stopped_rx: oneshot::Receiver<()>,
}

impl PeriodicTask {
  /// Run `tick` now and then every `every` until stopped.
  pub fn spawn<F, Fut>(name: &'static str, every: Duration, mut tick: F) -> Self
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
  {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let (stopped_tx, stopped_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      info!(task = name, every_secs = every.as_secs(), "Periodic task started");

      loop {
        tokio::select! {
          biased;
          _ = &mut stop_rx => break,
          _ = ticker.tick() => {
            debug!(task = name, "Tick");
            tick().await;
          }
        }
      }

      drop(ticker);
      let _ = stopped_tx.send(());
    });

    Self {
      name,
      stop_tx,
      stopped_rx,
    }
  }

  /// Signal stop and wait for the acknowledgement.
  pub async fn stop(self) {
    let _ = self.stop_tx.send(());
    let _ = self.stopped_rx.await;
    info!(task = self.name, "Periodic task stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn test_ticks_until_stopped() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let task = PeriodicTask::spawn("count", Duration::from_millis(10), move || {
      let counter = Arc::clone(&counter);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
      }
    });

    tokio::time::sleep(Duration::from_millis(55)).await;
    task.stop().await;
    let seen = ticks.load(Ordering::SeqCst);
    assert!(seen >= 2);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), seen);
  }

  #[tokio::test]
  async fn test_stop_waits_for_in_flight_tick() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);
    let task = PeriodicTask::spawn("slow", Duration::from_secs(60), move || {
      let flag = Arc::clone(&flag);
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        flag.store(true, Ordering::SeqCst);
      }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    task.stop().await;
    assert!(finished.load(Ordering::SeqCst));
  }
}
