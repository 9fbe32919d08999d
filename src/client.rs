//! hh.ru API client.
//!
//! Requests are issued one at a time. Transient failures are retried with
//! exponential backoff; 429 responses are waited out using the server's
//! `Retry-After` hint without spending the retry budget. When every attempt
//! fails the caller gets `None` (or an empty list) instead of an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RETRY_AFTER};
use serde_json::Value;

use crate::config::ApiSettings;
use crate::error::AppError;

/// Delay source for retries. Production code sleeps on the tokio timer.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, delay: Duration);
}

pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

enum Attempt {
    Done(Value),
    RateLimited(Option<Duration>),
    Failed(String),
}

pub struct HhClient {
    http: reqwest::Client,
    settings: ApiSettings,
    pause: Arc<dyn Pause>,
}

impl HhClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            settings: settings.clone(),
            pause: Arc::new(TokioPause),
        })
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    /// GET one JSON document. `None` once the retry budget is spent.
    pub async fn fetch_page(&self, endpoint: &str, query: &[(&str, String)]) -> Option<Value> {
        let url = format!(
            "{}{}",
            self.settings.base_url,
            endpoint.trim_start_matches('/')
        );
        let mut failures = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            match self.attempt(&url, query).await {
                Attempt::Done(body) => return Some(body),
                Attempt::RateLimited(hint) => {
                    if rate_limit_waits >= self.settings.max_rate_limit_waits {
                        tracing::warn!(
                            endpoint,
                            waits = rate_limit_waits,
                            "Still rate limited, giving up"
                        );
                        return None;
                    }
                    rate_limit_waits += 1;
                    let delay = hint
                        .unwrap_or(self.settings.backoff_base)
                        .min(self.settings.max_retry_after);
                    tracing::warn!(
                        endpoint,
                        delay_secs = delay.as_secs_f64(),
                        "Rate limited by the API, waiting"
                    );
                    self.pause.pause(delay).await;
                }
                Attempt::Failed(reason) => {
                    if failures >= self.settings.max_retries {
                        tracing::warn!(
                            endpoint,
                            attempts = failures + 1,
                            "Request failed, giving up: {reason}"
                        );
                        return None;
                    }
                    let delay = self.backoff(failures);
                    failures += 1;
                    tracing::warn!(
                        endpoint,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying: {reason}"
                    );
                    self.pause.pause(delay).await;
                }
            }
        }
    }

    /// Collect `items` from consecutive pages until the server runs out of
    /// pages or the page ceiling is hit.
    #[tracing::instrument(skip(self, params))]
    pub async fn paginate(&self, endpoint: &str, params: &[(&str, String)]) -> Vec<Value> {
        let mut items = Vec::new();

        for page in 0..self.settings.max_pages {
            let mut query = params.to_vec();
            query.push(("page", page.to_string()));
            query.push(("per_page", self.settings.per_page.to_string()));

            let Some(mut body) = self.fetch_page(endpoint, &query).await else {
                tracing::warn!(page, "Stopping pagination after a failed page");
                break;
            };

            let pages = body.get("pages").and_then(Value::as_u64).unwrap_or(0);
            let page_items = match body.get_mut("items").map(Value::take) {
                Some(Value::Array(list)) => list,
                _ => {
                    tracing::warn!(page, "Response has no 'items' list");
                    break;
                }
            };

            let count = page_items.len();
            items.extend(page_items);
            tracing::debug!(page, count, pages, "Fetched page");

            if count == 0 || u64::from(page) + 1 >= pages {
                break;
            }
            if page + 1 == self.settings.max_pages {
                tracing::info!(
                    max_pages = self.settings.max_pages,
                    reported_pages = pages,
                    "Page ceiling reached"
                );
            }
        }

        items
    }

    pub async fn employer(&self, employer_id: &str) -> Option<Value> {
        self.fetch_page(&format!("employers/{employer_id}"), &[]).await
    }

    pub async fn employer_vacancies(&self, employer_id: &str) -> Vec<Value> {
        self.paginate("vacancies", &[("employer_id", employer_id.to_string())])
            .await
    }

    async fn attempt(&self, url: &str, query: &[(&str, String)]) -> Attempt {
        let resp = match self.http.get(url).query(query).send().await {
            Ok(resp) => resp,
            Err(e) => return Attempt::Failed(format!("request error: {e}")),
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::RateLimited(retry_after(resp.headers()));
        }
        if !status.is_success() {
            return Attempt::Failed(format!("HTTP {status}"));
        }

        match resp.json::<Value>().await {
            Ok(body) => Attempt::Done(body),
            Err(e) => Attempt::Failed(format!("invalid JSON body: {e}")),
        }
    }

    /// `backoff_base * 2^n`, capped, plus up to 10% jitter.
    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        let delay = self
            .settings
            .backoff_base
            .saturating_mul(factor)
            .min(self.settings.backoff_max);
        let jitter_ms = (delay.as_millis() / 10) as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Only the delay-seconds form is understood; HTTP dates fall back to the
/// regular backoff.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: Duration, max: Duration) -> HhClient {
        let settings = ApiSettings {
            backoff_base: base,
            backoff_max: max,
            ..ApiSettings::default()
        };
        HhClient::new(&settings).unwrap()
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let client = client(Duration::from_millis(100), Duration::from_millis(1000));

        let first = client.backoff(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));

        let third = client.backoff(2);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(440));

        let capped = client.backoff(40);
        assert!(capped >= Duration::from_millis(1000) && capped <= Duration::from_millis(1100));
    }

    #[test]
    fn zero_backoff_stays_zero() {
        let client = client(Duration::ZERO, Duration::ZERO);
        assert_eq!(client.backoff(3), Duration::ZERO);
    }

    #[test]
    fn retry_after_reads_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 5 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(5)));
    }

    #[test]
    fn retry_after_ignores_http_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }
}
