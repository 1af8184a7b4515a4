//! Shared HTTP plumbing for the source fetchers.
//!
//! Every request carries a timeout. Rate limiting (429) is retried with
//! exponential backoff plus jitter; any other failure is returned to the
//! fetcher, which stops paginating and keeps what it already gathered.

use crate::error::{RegistryError, Result};
use rand::Rng;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

const USER_AGENT: &str = concat!("pubregistry/", env!("CARGO_PKG_VERSION"));

/// Records gathered by one fetcher, plus any failure that cut it short.
#[derive(Debug)]
pub struct Fetched<T> {
    pub records: Vec<T>,
    pub failures: Vec<RegistryError>,
}

impl<T> Fetched<T> {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl<T> Default for Fetched<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Build an HTTP client with a per-request timeout.
pub fn build_client(timeout: Duration, contact: Option<&str>) -> Result<Client> {
    let user_agent = match contact {
        Some(mail) if !mail.is_empty() => format!("{} (mailto:{})", USER_AGENT, mail),
        _ => USER_AGENT.to_string(),
    };
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| RegistryError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// GET a URL and return its body, retrying on 429.
pub async fn get_text(client: &Client, url: &str, max_retries: u32) -> Result<String> {
    let mut retries = 0;

    loop {
        let response = client.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.text().await?);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retries < max_retries {
                let jitter = rand::thread_rng().gen_range(0..250);
                let backoff = Duration::from_secs(2u64.saturating_pow(retries)) + Duration::from_millis(jitter);
                warn!(
                    retries = retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(backoff).await;
                retries += 1;
                continue;
            }
            return Err(RegistryError::RateLimited(60));
        }

        return Err(RegistryError::Api {
            code: status.as_u16(),
            message: format!("{} returned {}", url, status),
        });
    }
}
