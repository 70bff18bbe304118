//! Worker Pool - Fixed-width Fan-out Primitive
//!
//! N workers consume one input channel and emit on one output channel.
//! Once every worker has exited (input closed and drained, or output
//! closed) the post-work callback runs exactly once and the output sender
//! is dropped, which closes the output for the consumer.
//!
//! Channels are built with capacity 1 so producers block until a worker
//! is free. A job that panics is logged and dropped; its worker keeps
//! consuming.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Pool width for CPU-bound stages.
pub const CPU_WIDTH: usize = 2;

/// Pool width for upstream acquisition.
pub const ACQUIRE_WIDTH: usize = 4;

/// Pool width for storage-bound stages.
pub const STORAGE_WIDTH: usize = 8;

/// Pool width for bus listeners.
pub const LISTENER_WIDTH: usize = 16;

/// Spawn `width` workers reading `input` and writing to `output`.
///
/// The returned handle completes after `post_work` has run.
pub fn spawn<I, O, W, Fut, P>(
  width: usize,
  input: mpsc::Receiver<I>,
  output: mpsc::Sender<O>,
  worker: W,
  post_work: P,
) -> JoinHandle<()>
where
  I: Send + 'static,
  O: Send + 'static,
  W: Fn(I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = O> + Send + 'static,
  P: FnOnce() + Send + 'static,
{
  let input = Arc::new(Mutex::new(input));
  let worker = Arc::new(worker);

  let handles: Vec<JoinHandle<()>> = (0..width.max(1))
    .map(|_| {
      let input = Arc::clone(&input);
      let worker = Arc::clone(&worker);
      let output = output.clone();
      tokio::spawn(async move {
        loop {
          // Only the receive holds the lock; work runs unlocked
          let next = input.lock().await.recv().await;
          let Some(job) = next else { break };
          let out = match AssertUnwindSafe(worker(job)).catch_unwind().await {
            Ok(out) => out,
            Err(_) => {
              warn!("Worker job panicked, dropping its output");
              continue;
            }
          };
          if output.send(out).await.is_err() {
            break;
          }
        }
      })
    })
    .collect();
  drop(output);

  tokio::spawn(async move {
    for handle in handles {
      if let Err(e) = handle.await {
        error!(error = %e, "Worker task panicked");
      }
    }
    post_work();
  })
}

/// Run `worker` over every item with at most `width` in flight and
/// collect the outputs (in completion order).
pub async fn fan_out<I, O, W, Fut>(width: usize, items: Vec<I>, worker: W) -> Vec<O>
where
  I: Send + 'static,
  O: Send + 'static,
  W: Fn(I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = O> + Send + 'static,
{
  let expected = items.len();
  let (in_tx, in_rx) = mpsc::channel(1);
  let (out_tx, mut out_rx) = mpsc::channel(1);

  let producer = tokio::spawn(async move {
    for item in items {
      if in_tx.send(item).await.is_err() {
        break;
      }
    }
  });
  let pool = spawn(width, in_rx, out_tx, worker, || {});

  let mut results = Vec::with_capacity(expected);
  while let Some(out) = out_rx.recv().await {
    results.push(out);
  }

  if let Err(e) = producer.await {
    error!(error = %e, "Fan-out producer panicked");
  }
  if let Err(e) = pool.await {
    error!(error = %e, "Fan-out pool panicked");
  }
  results
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[tokio::test]
  async fn test_post_work_runs_once_after_workers() {
    let (in_tx, in_rx) = mpsc::channel::<u32>(1);
    let (out_tx, mut out_rx) = mpsc::channel::<u32>(1);
    let post_runs = Arc::new(AtomicUsize::new(0));
    let post = Arc::clone(&post_runs);

    let pool = spawn(4, in_rx, out_tx, |n| async move { n * 2 }, move || {
      post.fetch_add(1, Ordering::SeqCst);
    });

    tokio::spawn(async move {
      for n in 0..10 {
        in_tx.send(n).await.unwrap();
      }
    });

    let mut outputs = Vec::new();
    while let Some(out) = out_rx.recv().await {
      outputs.push(out);
    }
    pool.await.unwrap();

    outputs.sort_unstable();
    assert_eq!(outputs, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    assert_eq!(post_runs.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_width_bounds_concurrency() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (in_flight_w, peak_w) = (Arc::clone(&in_flight), Arc::clone(&peak));
    let results = fan_out(3, (0..12).collect::<Vec<u32>>(), move |n| {
      let in_flight = Arc::clone(&in_flight_w);
      let peak = Arc::clone(&peak_w);
      async move {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        in_flight.fetch_sub(1, Ordering::SeqCst);
        n
      }
    })
    .await;

    assert_eq!(results.len(), 12);
    assert!(peak.load(Ordering::SeqCst) <= 3);
  }

  #[tokio::test]
  async fn test_panicking_job_keeps_worker_alive() {
    let results = fan_out(1, (0..6).collect::<Vec<u32>>(), |n| async move {
      if n % 2 == 0 {
        panic!("job {n} failed");
      }
      n
    })
    .await;

    let mut results = results;
    results.sort_unstable();
    assert_eq!(results, vec![1, 3, 5]);
  }

  #[tokio::test]
  async fn test_empty_input() {
    let results: Vec<u32> = fan_out(4, Vec::<u32>::new(), |n| async move { n }).await;
    assert!(results.is_empty());
  }
}
