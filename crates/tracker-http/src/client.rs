//! The tracker HTTP client.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::error::{HttpClientError, RequestShape};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryConfig;
use crate::wire::{ChangeEvent, RemoteTask, ScrollPage};

/// The server accepts at most this many keys in one `get_tasks_batch` call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Typed client for the remote tracker REST API.
///
/// Every outbound request passes through the shared [`RateLimiter`] and the
/// [`RetryConfig`] backoff policy; callers never see raw `reqwest` errors for
/// expected network/server failures.
pub struct TrackerHttpClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    org_id: String,
    scroll_page_size: u32,
    scroll_ttl_secs: u32,
    rate_limiter: RateLimiter,
    retry: RetryConfig,
}

impl TrackerHttpClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        org_id: impl Into<String>,
        scroll_page_size: u32,
        rate_limiter: RateLimiter,
    ) -> Result<Self, HttpClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|source| HttpClientError::Transport {
                shape: RequestShape {
                    method: "BUILD".into(),
                    path: "client".into(),
                    query: None,
                },
                source,
            })?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
            org_id: org_id.into(),
            // scroll page size is kept conservative by default: the
            // remote server has demonstrated 504s at large page sizes.
            scroll_page_size: scroll_page_size.min(100).max(1),
            scroll_ttl_secs: 60,
            rate_limiter,
            retry: RetryConfig::default(),
        })
    }

    #[cfg(test)]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", format!("OAuth {}", self.token)),
            ("X-Org-Id", self.org_id.clone()),
        ]
    }

    /// Executes one HTTP request with the rate-limit gate and retry/backoff
    /// policy. `build` is called fresh on every attempt since
    /// `reqwest::RequestBuilder` is consumed by `.send()`.
    async fn execute<F>(&self, shape: RequestShape, build: F) -> Result<reqwest::Response, HttpClientError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            self.rate_limiter.acquire().await;

            let response = build().send().await;

            match response {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        self.rate_limiter.double_delay();
                    }
                    if is_retryable(status) && self.retry.should_retry(attempt) {
                        warn!(%shape, %status, attempt, "retrying after transient HTTP error");
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt + 1)).await;
                        attempt += 1;
                        continue;
                    }
                    if is_retryable(status) {
                        return Err(HttpClientError::RetriesExhausted {
                            shape,
                            attempts: attempt + 1,
                            status: status.as_u16(),
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return Err(HttpClientError::Permanent {
                        shape,
                        detail: format!("HTTP {status}: {body}"),
                    });
                }
                Err(source) => {
                    if source.is_timeout() && self.retry.should_retry(attempt) {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt + 1)).await;
                        attempt += 1;
                        continue;
                    }
                    if source.is_timeout() {
                        return Err(HttpClientError::Timeout { shape });
                    }
                    return Err(HttpClientError::Transport { shape, source });
                }
            }
        }
    }

    /// Fetches a single task by key.
    pub async fn get_task(&self, key: &str) -> Result<RemoteTask, HttpClientError> {
        let path = format!("/v2/issues/{key}");
        let shape = RequestShape {
            method: "GET".into(),
            path: path.clone(),
            query: Some("expand=links".into()),
        };
        let url = format!("{}{}", self.base_url, path);
        let headers = self.auth_headers();

        let response = self
            .execute(shape.clone(), || {
                let mut req = self.http.request(Method::GET, &url).query(&[("expand", "links")]);
                for (k, v) in &headers {
                    req = req.header(*k, v);
                }
                req
            })
            .await?;

        response
            .json::<RemoteTask>()
            .await
            .map_err(|e| decode_error(shape, e))
    }

    /// Fetches up to [`MAX_BATCH_SIZE`] tasks in one round-trip. Callers are
    /// responsible for chunking larger key sets; this amortizes round-trips
    /// across concurrent workers.
    pub async fn get_tasks_batch(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, RemoteTask>, HttpClientError> {
        debug_assert!(keys.len() <= MAX_BATCH_SIZE);

        let path = "/v2/issues/_bulk".to_string();
        let shape = RequestShape {
            method: "POST".into(),
            path: path.clone(),
            query: None,
        };
        let url = format!("{}{}", self.base_url, path);
        let headers = self.auth_headers();
        let body = serde_json::json!({ "keys": keys });

        let response = self
            .execute(shape.clone(), || {
                let mut req = self.http.request(Method::POST, &url).json(&body);
                for (k, v) in &headers {
                    req = req.header(*k, v);
                }
                req
            })
            .await?;

        let tasks: Vec<RemoteTask> = response
            .json()
            .await
            .map_err(|e| decode_error(shape, e))?;

        Ok(tasks.into_iter().map(|t| (t.key.clone(), t)).collect())
    }

    /// Fetches the ordered changelog for one task.
    pub async fn get_changelog(&self, key: &str) -> Result<Vec<ChangeEvent>, HttpClientError> {
        let path = format!("/v2/issues/{key}/changelog");
        let shape = RequestShape {
            method: "GET".into(),
            path: path.clone(),
            query: None,
        };
        let url = format!("{}{}", self.base_url, path);
        let headers = self.auth_headers();

        let response = self
            .execute(shape.clone(), || {
                let mut req = self.http.request(Method::GET, &url);
                for (k, v) in &headers {
                    req = req.header(*k, v);
                }
                req
            })
            .await?;

        response
            .json()
            .await
            .map_err(|e| decode_error(shape, e))
    }

    /// Opens a scroll search and lazily yields task keys as pages arrive.
    /// Stops when a page returns fewer items than the page size, or when
    /// the consumer drops the stream (e.g. `limit` reached).
    pub fn search<'a>(
        &'a self,
        query: &'a str,
        limit: Option<usize>,
    ) -> BoxStream<'a, Result<String, HttpClientError>> {
        let page_size = self.scroll_page_size;

        let state = ScrollState {
            scroll_id: None,
            exhausted: false,
            yielded: 0,
        };

        let stream = stream::unfold(state, move |mut state| async move {
            if state.exhausted {
                return None;
            }
            if let Some(limit) = limit {
                if state.yielded >= limit {
                    return None;
                }
            }

            match self.fetch_scroll_page(query, state.scroll_id.as_deref()).await {
                Ok(page) => {
                    let got = page.issues.len();
                    state.exhausted = got < page_size as usize || page.scroll_id.is_none();
                    state.scroll_id = page.scroll_id;

                    let mut keys: Vec<String> = page.issues.into_iter().map(|i| i.key).collect();
                    if let Some(limit) = limit {
                        let remaining = limit.saturating_sub(state.yielded);
                        keys.truncate(remaining);
                    }
                    state.yielded += keys.len();

                    Some((stream::iter(keys.into_iter().map(Ok)), state))
                }
                Err(e) => {
                    state.exhausted = true;
                    Some((stream::iter(vec![Err(e)]), state))
                }
            }
        })
        .flatten();

        Box::pin(stream)
    }

    async fn fetch_scroll_page(
        &self,
        query: &str,
        scroll_id: Option<&str>,
    ) -> Result<ScrollPage, HttpClientError> {
        let path = "/v2/issues/_search".to_string();
        let shape = RequestShape {
            method: "POST".into(),
            path: path.clone(),
            query: Some(query.to_string()),
        };
        let url = format!("{}{}", self.base_url, path);
        let headers = self.auth_headers();
        let page_size = self.scroll_page_size;
        let ttl = self.scroll_ttl_secs;

        let body = serde_json::json!({ "query": query });
        let scroll_id = scroll_id.map(str::to_string);

        let response = self
            .execute(shape.clone(), || {
                let mut req = self
                    .http
                    .request(Method::POST, &url)
                    .query(&[("perPage", page_size.to_string()), ("scrollTTLMillis", (ttl as u64 * 1000).to_string())])
                    .json(&body);
                if let Some(ref id) = scroll_id {
                    req = req.header("X-Scroll-Id", id.clone());
                } else {
                    req = req.query(&[("scrollType", "sorted")]);
                }
                for (k, v) in &headers {
                    req = req.header(*k, v);
                }
                req
            })
            .await?;

        let scroll_id_header = response
            .headers()
            .get("X-Scroll-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let issues: Vec<crate::wire::ScrollIssue> =
            response.json().await.map_err(|e| decode_error(shape, e))?;

        debug!(count = issues.len(), "fetched scroll page");

        Ok(ScrollPage {
            issues,
            scroll_id: scroll_id_header,
        })
    }
}

struct ScrollState {
    scroll_id: Option<String>,
    exhausted: bool,
    yielded: usize,
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn decode_error(shape: RequestShape, source: reqwest::Error) -> HttpClientError {
    HttpClientError::Permanent {
        shape,
        detail: format!("failed to decode response body: {source}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> TrackerHttpClient {
        TrackerHttpClient::new(
            server.uri(),
            "tok",
            "org",
            100,
            RateLimiter::new(StdDuration::from_millis(0)),
        )
        .unwrap()
        .with_retry_config(RetryConfig {
            max_attempts: 3,
            initial_delay: StdDuration::from_millis(1),
            max_delay: StdDuration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        })
    }

    fn sample_task_json(key: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("id-{key}"),
            "key": key,
            "summary": "a task",
            "description": null,
            "status": {"key": "open", "display": "Open"},
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z",
        })
    }

    #[tokio::test]
    async fn get_task_decodes_a_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/issues/UP-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_task_json("UP-1")))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let task = client.get_task("UP-1").await.unwrap();
        assert_eq!(task.key, "UP-1");
        assert_eq!(task.status.key, "open");
    }

    #[tokio::test]
    async fn get_task_retries_a_transient_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/issues/UP-1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/issues/UP-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_task_json("UP-1")))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let task = client.get_task("UP-1").await.unwrap();
        assert_eq!(task.key, "UP-1");
    }

    #[tokio::test]
    async fn get_task_permanent_4xx_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/issues/UP-404"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.get_task("UP-404").await.unwrap_err();
        assert!(matches!(err, HttpClientError::Permanent { .. }));
    }

    #[tokio::test]
    async fn search_walks_scroll_pages_until_a_short_page() {
        let server = MockServer::start().await;

        // First call has no X-Scroll-Id header (initial request).
        Mock::given(method("POST"))
            .and(path("/v2/issues/_search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([
                        {"id": "1", "key": "UP-1"},
                        {"id": "2", "key": "UP-2"},
                    ]))
                    .insert_header("X-Scroll-Id", "scroll-abc"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        // Second (and final) page is shorter than the page size, ending the scroll.
        Mock::given(method("POST"))
            .and(path("/v2/issues/_search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([
                    {"id": "3", "key": "UP-3"},
                ])),
            )
            .mount(&server)
            .await;

        let client = TrackerHttpClient::new(
            server.uri(),
            "tok",
            "org",
            2,
            RateLimiter::new(StdDuration::from_millis(0)),
        )
        .unwrap();

        let keys: Vec<String> = client
            .search("queue: UP", None)
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(keys, vec!["UP-1", "UP-2", "UP-3"]);
    }

    #[tokio::test]
    async fn search_respects_a_limit_smaller_than_one_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/issues/_search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([
                        {"id": "1", "key": "UP-1"},
                        {"id": "2", "key": "UP-2"},
                    ]))
                    .insert_header("X-Scroll-Id", "scroll-abc"),
            )
            .mount(&server)
            .await;

        let client = TrackerHttpClient::new(
            server.uri(),
            "tok",
            "org",
            2,
            RateLimiter::new(StdDuration::from_millis(0)),
        )
        .unwrap();

        let keys: Vec<String> = client
            .search("queue: UP", Some(1))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(keys, vec!["UP-1"]);
    }
}
