//! Upstream HTTP Client - Rate-limited REST Client
//!
//! Wraps reqwest with a concurrency semaphore, a requests-per-second
//! quota and retries with exponential backoff on 5xx/429 responses and
//! transport failures. Other non-200 statuses are returned immediately
//! as `UpstreamRefused`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::error::{PipelineError, Result};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Configuration for the upstream HTTP client.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
  /// Upstream quota.
  pub requests_per_second: u32,
}

impl Default for ApiClientConfig {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(30),
      max_concurrent: 16,
      max_retries: 3,
      retry_base_delay: Duration::from_millis(200),
      requests_per_second: 100,
    }
  }
}

/// Rate-limited HTTP client for the upstream game API.
pub struct ApiClient {
  /// Underlying HTTP client.
  http: Client,
  /// Client configuration.
  config: ApiClientConfig,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Requests-per-second limiter.
  limiter: DirectLimiter,
}

impl ApiClient {
  /// Create a new client.
  pub fn new(config: ApiClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(8)
      .build()
      .map_err(|e| PipelineError::Internal(format!("failed to build HTTP client: {e}")))?;

    let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    Ok(Self {
      http,
      limiter: RateLimiter::direct(Quota::per_second(rps)),
      config,
      semaphore,
    })
  }

  /// The underlying reqwest client (shared with the token provider).
  pub fn http(&self) -> &Client {
    &self.http
  }

  /// GET a URL and return the body bytes.
  pub async fn get_bytes(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<u8>> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|_| PipelineError::Internal("upstream semaphore closed".to_string()))?;

    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis(), "Retrying request");
        sleep(delay).await;
      }

      self.limiter.until_ready().await;

      match self.http.get(url).query(query).send().await {
        Ok(response) => match response.status() {
          StatusCode::OK => {
            let body = response
              .bytes()
              .await
              .map_err(|e| PipelineError::UpstreamUnreachable(e.to_string()))?;
            return Ok(body.to_vec());
          }
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(url, "Rate limited by upstream, backing off");
            last_error = Some(PipelineError::UpstreamRefused {
              status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
              url: url.to_string(),
            });
          }
          status if status.is_server_error() => {
            warn!(url, status = %status, "Upstream server error, retrying");
            last_error = Some(PipelineError::UpstreamRefused {
              status: status.as_u16(),
              url: url.to_string(),
            });
          }
          status => {
            return Err(PipelineError::UpstreamRefused {
              status: status.as_u16(),
              url: url.to_string(),
            });
          }
        },
        Err(e) => {
          warn!(error = %e, attempt, "Request failed");
          last_error = Some(PipelineError::UpstreamUnreachable(e.to_string()));
        }
      }
    }

    Err(last_error.unwrap_or_else(|| PipelineError::UpstreamUnreachable(format!("max retries exceeded: {url}"))))
  }

  /// GET a URL and decode its JSON body.
  pub async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
    let body = self.get_bytes(url, query).await?;
    serde_json::from_slice(&body).map_err(|e| PipelineError::UpstreamParse(format!("{url}: {e}")))
  }
}
