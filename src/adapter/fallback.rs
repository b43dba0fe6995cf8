//! Endpoint fallback chain with capped exponential backoff.
//!
//! A source may expose several undocumented endpoints for the same data.
//! [`fetch_json_with_fallback`] walks them in order within a fixed attempt
//! budget:
//!
//! | Outcome | Next step |
//! |---|---|
//! | 2xx with JSON body | done |
//! | 401 / 403 | abort, no retry |
//! | 404 / 410 / other 4xx | next variant at once (endpoint shape gone) |
//! | 429, 5xx, transport failure, non-JSON body | back off, then next variant |
//!
//! The attempt budget counts every request; once the variants run out the
//! last one is retried.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpTransport};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay schedule between attempts: `base × 2^attempt`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay after the failed attempt with index `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max_delay)
    }
}

/// How a failed attempt affects the walk through the chain.
enum Step {
    Abort(Error),
    Skip(Error),
    Backoff(Error, Option<Duration>),
}

/// Fetch JSON from the first variant that answers.
///
/// `service` names the source in authentication errors.
///
/// # Errors
///
/// `Auth` immediately on 401/403; otherwise the error of the last attempt.
pub async fn fetch_json_with_fallback(
    transport: &dyn HttpTransport,
    clock: &dyn Clock,
    policy: &BackoffPolicy,
    service: &str,
    variants: &[HttpRequest],
) -> Result<Value> {
    if variants.is_empty() {
        return Err(Error::InvalidArgument("no endpoint variants".to_string()));
    }

    let mut variant = 0usize;
    let mut last_error = Error::Transport("no attempt made".to_string());

    for attempt in 0..policy.max_attempts {
        let request = variants[variant].clone();
        let url = request.url.clone();
        debug!(service, attempt, variant, url = %url, "fetch attempt");

        let step = match transport.send(request).await {
            Ok(resp) if resp.is_success() => match resp.parse_json::<Value>() {
                Ok(value) => return Ok(value),
                Err(e) => Step::Backoff(
                    Error::Transport(format!("non-JSON body from {url}: {e}")),
                    None,
                ),
            },
            Ok(resp) => match resp.status {
                401 | 403 => Step::Abort(Error::auth(service, resp.status, resp.body_snippet())),
                429 => {
                    let retry_after = resp.retry_after();
                    Step::Backoff(Error::RateLimited { retry_after }, retry_after)
                }
                404 | 410 => Step::Skip(Error::not_found(url.as_str())),
                400..=499 => Step::Skip(Error::Validation(format!(
                    "{} from {url}: {}",
                    resp.status,
                    resp.body_snippet()
                ))),
                status => Step::Backoff(Error::Transport(format!("HTTP {status} from {url}")), None),
            },
            Err(e) => Step::Backoff(e.into(), None),
        };

        let has_next_attempt = attempt + 1 < policy.max_attempts;
        match step {
            Step::Abort(err) => {
                warn!(service, url = %url, "authentication rejected; not retrying");
                return Err(err);
            }
            Step::Skip(err) => {
                debug!(service, url = %url, error = %err, "endpoint variant unavailable");
                last_error = err;
                if variant + 1 >= variants.len() {
                    break;
                }
                variant += 1;
            }
            Step::Backoff(err, retry_after) => {
                debug!(service, url = %url, error = %err, "retryable failure");
                last_error = err;
                if has_next_attempt {
                    let backoff = policy.delay_for(attempt);
                    let delay = retry_after.map_or(backoff, |ra| ra.max(backoff));
                    clock.sleep(delay).await;
                }
                variant = (variant + 1).min(variants.len() - 1);
            }
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::http::{HttpMethod, HttpResponse, MockTransport};
    use serde_json::json;

    const A: &str = "https://src.test/a";
    const B: &str = "https://src.test/b";
    const C: &str = "https://src.test/c";

    fn variants() -> Vec<HttpRequest> {
        vec![HttpRequest::get(A), HttpRequest::get(B), HttpRequest::get(C)]
    }

    async fn run(transport: &MockTransport, clock: &ManualClock) -> Result<Value> {
        fetch_json_with_fallback(transport, clock, &BackoffPolicy::default(), "test", &variants())
            .await
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_not_found_moves_to_next_variant_without_sleeping() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, A, 404, json!({}));
        transport.push_json(HttpMethod::Get, B, 404, json!({}));
        transport.push_json(HttpMethod::Get, C, 200, json!({"ok": 1}));
        let clock = ManualClock::at_epoch(0);

        let value = run(&transport, &clock).await.unwrap();
        assert_eq!(value["ok"], 1);
        assert!(clock.sleeps().is_empty());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_immediately() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, A, 401, json!({"detail": "expired"}));
        let clock = ManualClock::at_epoch(0);

        let err = run(&transport, &clock).await.unwrap_err();
        assert!(matches!(err, Error::Auth { status: 401, .. }));
        assert_eq!(transport.requests().len(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_back_off_exponentially() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Get, A, HttpResponse::status(502));
        transport.push_transport_error(HttpMethod::Get, B, "timed out");
        transport.push_response(HttpMethod::Get, C, HttpResponse::status(500));
        let clock = ManualClock::at_epoch(0);

        let err = run(&transport, &clock).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            A,
            HttpResponse::status(429).with_header("Retry-After", "30"),
        );
        transport.push_json(HttpMethod::Get, B, 200, json!([]));
        let clock = ManualClock::at_epoch(0);

        run(&transport, &clock).await.unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn test_non_json_body_is_retryable() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            A,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"<html>challenge</html>".to_vec(),
            },
        );
        transport.push_json(HttpMethod::Get, B, 200, json!({"ok": true}));
        let clock = ManualClock::at_epoch(0);

        let value = run(&transport, &clock).await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_all_variants_missing_is_not_found() {
        let transport = MockTransport::new();
        for url in [A, B, C] {
            transport.push_json(HttpMethod::Get, url, 404, json!({}));
        }
        let clock = ManualClock::at_epoch(0);
        let err = run(&transport, &clock).await.unwrap_err();
        match err {
            Error::NotFound { resource } => assert_eq!(resource, C),
            other => panic!("expected not found, got {other:?}"),
        }
    }
}
