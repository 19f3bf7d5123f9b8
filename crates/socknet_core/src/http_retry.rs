/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rand::{thread_rng, Rng};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Sends the request built by `build`, retrying transport errors, 429 and 5xx
/// with exponential backoff plus jitter. The last response is returned as is.
pub async fn send_with_retry<F>(mut build: F, attempts: u32) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = attempts.clamp(1, 5);
    let mut backoff = Duration::from_millis(200);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if should_retry_status(status) && attempt < max_attempts {
                    debug!(%status, attempt, "peer busy, retrying");
                    sleep_with_jitter(backoff).await;
                    backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
                    continue;
                }
                return Ok(resp);
            }
            Err(e) => {
                if attempt >= max_attempts {
                    return Err(e.into());
                }
                debug!(attempt, "peer request failed, retrying: {e}");
                sleep_with_jitter(backoff).await;
                backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
            }
        }
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn sleep_with_jitter(base: Duration) {
    let jitter_ms: u64 = thread_rng().gen_range(0..=200);
    tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn only_throttling_and_server_errors_retry() {
        assert!(should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(!should_retry_status(StatusCode::BAD_REQUEST));
        assert!(!should_retry_status(StatusCode::OK));
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;
        let client = reqwest::Client::new();
        let url = format!("{}/flaky", server.uri());
        let resp = send_with_retry(|| client.get(&url), 2).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
