use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use crate::error::FetchError;

pub const DEFAULT_USER_AGENT: &str = "gator";

/// Bounds a single fetch: a timeout plus an optional shutdown signal.
#[derive(Debug, Clone)]
pub struct Deadline {
    timeout: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Deadline {
    pub fn new(timeout: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self { timeout, shutdown: Some(shutdown) }
    }

    /// A deadline that can only expire, never be cancelled.
    pub fn after(timeout: Duration) -> Self {
        Self { timeout, shutdown: None }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn cancelled(&self) {
        match &self.shutdown {
            Some(shutdown) => shutdown_requested(shutdown).await,
            None => std::future::pending::<()>().await,
        }
    }
}

/// Resolves once `true` has been sent on the shutdown channel. Pends forever
/// if the sender is dropped without requesting shutdown.
pub async fn shutdown_requested(shutdown: &watch::Receiver<bool>) {
    let mut shutdown = shutdown.clone();
    let stopped = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !stopped {
        std::future::pending::<()>().await;
    }
}

/// Retrieves a syndication document. One attempt per call, no retries.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, deadline: &Deadline) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Request { url: url.to_string(), source }
            }
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status });
        }

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, deadline: &Deadline) -> Result<Vec<u8>, FetchError> {
        tokio::select! {
            biased;
            _ = deadline.cancelled() => Err(FetchError::Cancelled { url: url.to_string() }),
            result = tokio::time::timeout(deadline.timeout(), self.get(url)) => {
                result.unwrap_or_else(|_| Err(FetchError::Timeout { url: url.to_string() }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BODY: &str = "<rss><channel><title>t</title></channel></rss>";

    #[tokio::test]
    async fn test_returns_the_body_and_sends_the_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed")
            .match_header("user-agent", DEFAULT_USER_AGENT)
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT).unwrap();
        let url = format!("{}/feed", server.url());
        let body = fetcher.fetch(&url, &Deadline::after(Duration::from_secs(5))).await.unwrap();

        assert_eq!(body, BODY.as_bytes());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_treats_error_statuses_as_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT).unwrap();
        let url = format!("{}/missing", server.url());
        let result = fetcher.fetch(&url, &Deadline::after(Duration::from_secs(5))).await;

        match result {
            Err(FetchError::Status { status, .. }) => assert_eq!(status.as_u16(), 404),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gives_up_when_shutdown_was_requested() {
        let server = mockito::Server::new_async().await;
        let (sender, receiver) = watch::channel(false);
        sender.send(true).unwrap();

        let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT).unwrap();
        let url = format!("{}/feed", server.url());
        let result = fetcher
            .fetch(&url, &Deadline::new(Duration::from_secs(5), receiver))
            .await;

        assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_times_out_on_a_slow_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/slow")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(1500));
                w.write_all(BODY.as_bytes())
            })
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT).unwrap();
        let url = format!("{}/slow", server.url());
        let result = fetcher.fetch(&url, &Deadline::after(Duration::from_millis(200))).await;

        match result {
            Err(FetchError::Timeout { url: timed_out }) => assert_eq!(timed_out, url),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reports_unreachable_hosts_as_request_errors() {
        let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT).unwrap();
        let result = fetcher
            .fetch("http://127.0.0.1:1/feed", &Deadline::after(Duration::from_secs(5)))
            .await;

        assert!(matches!(
            result,
            Err(FetchError::Request { .. }) | Err(FetchError::Timeout { .. })
        ));
    }
}
