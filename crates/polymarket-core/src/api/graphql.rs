//! GraphQL request execution with timeout, retry classification, and
//! bounded exponential backoff.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::IndexerConfig;
use crate::{Error, Result};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const RATE_LIMIT_BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Thin asynchronous GraphQL request issuer.
///
/// Retries are handled internally: transport failures, timeouts, and
/// indexer-side unavailability back off and retry up to the configured
/// attempt count; malformed queries surface immediately. The final failure
/// surfaces the most recent error verbatim.
pub struct GraphqlClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

impl GraphqlClient {
    pub fn new(config: &IndexerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.subgraph_url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// Execute a query. Returns the parsed `data` object, or `None` when
    /// the response carries no data.
    pub async fn execute(&self, query: &str, variables: Value) -> Result<Option<Value>> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt, last_error.as_ref());
                debug!(attempt, ?delay, "retrying indexer request");
                tokio::time::sleep(delay).await;
            }

            match self.attempt(query, &variables).await {
                Ok(data) => return Ok(data),
                Err(err) if err.is_retryable() => {
                    warn!(attempt, error = %err, "indexer request failed");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.expect("at least one attempt was made"))
    }

    async fn attempt(&self, query: &str, variables: &Value) -> Result<Option<Value>> {
        let mut request = self
            .http
            .post(&self.url)
            .json(&GraphqlRequest { query, variables });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        // On expiry the in-flight request is dropped, which aborts it.
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(Error::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(Error::IndexerUnavailable(format!("HTTP {status}")));
        }

        let body: GraphqlResponse = tokio::time::timeout(self.timeout, response.json())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        if let Some(errors) = body.errors {
            if let Some(first) = errors.first() {
                return Err(classify_error_message(&first.message));
            }
        }

        Ok(body.data.filter(|data| !data.is_null()))
    }
}

/// Sort a response-level error message into the retryable or fatal class.
fn classify_error_message(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("429")
    {
        Error::RateLimited { retry_after: None }
    } else if lower.contains("unavailable")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("overloaded")
        || lower.contains("try again")
    {
        Error::IndexerUnavailable(message.to_string())
    } else {
        Error::Query(message.to_string())
    }
}

fn backoff_delay(attempt: u32, last_error: Option<&Error>) -> Duration {
    if let Some(hint) = last_error.and_then(Error::retry_after) {
        return hint;
    }

    let base = match last_error {
        Some(Error::RateLimited { .. }) => RATE_LIMIT_BACKOFF_BASE,
        _ => BACKOFF_BASE,
    };
    let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(exp).min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_classification() {
        assert!(matches!(
            classify_error_message("indexer is temporarily unavailable"),
            Error::IndexerUnavailable(_)
        ));
        assert!(matches!(
            classify_error_message("upstream request timed out"),
            Error::IndexerUnavailable(_)
        ));
        assert!(matches!(
            classify_error_message("Rate limit exceeded for key"),
            Error::RateLimited { .. }
        ));
        assert!(matches!(
            classify_error_message("Unknown field `foo` on type `Query`"),
            Error::Query(_)
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let err = Error::IndexerUnavailable("down".into());
        assert_eq!(backoff_delay(1, Some(&err)), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, Some(&err)), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, Some(&err)), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, Some(&err)), BACKOFF_CAP);
    }

    #[test]
    fn test_rate_limit_backoff_uses_larger_base() {
        let err = Error::RateLimited { retry_after: None };
        assert_eq!(backoff_delay(1, Some(&err)), Duration::from_secs(5));
        assert_eq!(backoff_delay(2, Some(&err)), Duration::from_secs(10));
    }

    #[test]
    fn test_server_hint_wins() {
        let err = Error::RateLimited {
            retry_after: Some(Duration::from_secs(42)),
        };
        assert_eq!(backoff_delay(1, Some(&err)), Duration::from_secs(42));
    }
}
