//! arXiv export API client.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dailypapers_shared::{DigestError, Document, RateLimiter, Result, RetryPolicy};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::MetadataSource;
use crate::feed::parse_feed;

/// Default export API endpoint.
pub const DEFAULT_API_URL: &str = "http://export.arxiv.org/api/query";

/// Identifiers per export API request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// The export API asks for no more than one request every three seconds.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(3);

const USER_AGENT: &str = concat!("dailypapers/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`ArxivClient`].
#[derive(Debug, Clone)]
pub struct ArxivOptions {
    pub api_url: String,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for ArxivOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Batched, paced metadata lookups against the arXiv export API.
pub struct ArxivClient {
    client: Client,
    api_url: Url,
    batch_size: usize,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl ArxivClient {
    pub fn new(options: ArxivOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(DigestError::config("arXiv batch size must be at least 1"));
        }

        let api_url = Url::parse(&options.api_url).map_err(|e| {
            DigestError::config(format!("invalid arXiv API url '{}': {e}", options.api_url))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| DigestError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url,
            batch_size: options.batch_size,
            limiter: Arc::new(RateLimiter::new(1, DEFAULT_MIN_INTERVAL)?),
            retry: RetryPolicy::default(),
        })
    }

    /// Share a limiter with other callers of the same API.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Query URL for one batch of identifiers.
    pub fn batch_url(&self, ids: &[String]) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("id_list", &ids.join(","))
            .append_pair("max_results", &ids.len().to_string());
        url
    }

    /// Fetch and parse a single batch. One paced request, retried per policy.
    pub async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Document>> {
        let url = self.batch_url(ids);
        let client = &self.client;
        let limiter = &self.limiter;
        let url = &url;

        let body = self
            .retry
            .run("arXiv batch", || async move {
                limiter.acquire(None).await?;
                let response = client
                    .get(url.as_str())
                    .send()
                    .await
                    .map_err(|e| DigestError::Transport(format!("arXiv request failed: {e}")))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(DigestError::Transport(format!("arXiv API: HTTP {status}")));
                }

                response
                    .bytes()
                    .await
                    .map_err(|e| DigestError::Transport(format!("arXiv response body: {e}")))
            })
            .await?;

        parse_feed(&body)
    }
}

impl MetadataSource for ArxivClient {
    #[instrument(skip_all, fields(ids = ids.len()))]
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> = Vec::with_capacity(ids.len());
        let mut seen: HashSet<String> = HashSet::new();
        let batches = ids.len().div_ceil(self.batch_size);

        for (index, batch) in ids.chunks(self.batch_size).enumerate() {
            debug!(batch = index + 1, batches, size = batch.len(), "fetching arXiv batch");

            match self.fetch_batch(batch).await {
                Ok(docs) => {
                    for doc in docs {
                        if seen.insert(doc.id.clone()) {
                            documents.push(doc);
                        }
                    }
                }
                Err(e) => {
                    warn!(batch = index + 1, error = %e, "arXiv batch failed, skipping");
                }
            }
        }

        info!(requested = ids.len(), hydrated = documents.len(), "hydration complete");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn atom(ids: &[&str]) -> String {
        let entries: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<entry><id>http://arxiv.org/abs/{id}v1</id><title>Paper {id}</title>
                    <summary>About {id}.</summary><author><name>Someone</name></author>
                    <category term="cs.CL"/></entry>"#
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <feed xmlns="http://www.w3.org/2005/Atom"><id>http://arxiv.org/api/test</id>
            <title>test</title><updated>2025-01-03T00:00:00Z</updated>{entries}</feed>"#
        )
    }

    fn test_client(server: &MockServer, batch_size: usize) -> ArxivClient {
        ArxivClient::new(ArxivOptions {
            api_url: format!("{}/api/query", server.uri()),
            batch_size,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
        .with_limiter(Arc::new(
            RateLimiter::new(100, Duration::from_secs(1)).unwrap(),
        ))
        .with_retry(RetryPolicy::none())
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn fetch_uses_fixture_response() {
        let server = MockServer::start().await;
        let body = std::fs::read_to_string("../../../fixtures/atom/arxiv-batch.xml").unwrap();
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("id_list", "2501.00001,2501.00002,2501.00003"))
            .and(query_param("max_results", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, DEFAULT_BATCH_SIZE);
        let docs = client
            .fetch(&ids(&["2501.00001", "2501.00002", "2501.00003"]))
            .await
            .unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].id, "2501.00001");
        assert_eq!(docs[2].authors, vec!["Edsger Dijkstra", "Barbara Liskov"]);
    }

    #[tokio::test]
    async fn ids_are_split_into_batches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("id_list", "a1,a2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom(&["a1", "a2"])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("id_list", "a3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom(&["a3"])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, 2);
        let docs = client.fetch(&ids(&["a1", "a2", "a3"])).await.unwrap();

        let got: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(got, vec!["a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn failed_batch_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("id_list", "a1,a2"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("id_list", "a3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom(&["a3"])))
            .mount(&server)
            .await;

        let client = test_client(&server, 2);
        let docs = client.fetch(&ids(&["a1", "a2", "a3"])).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a3");
    }

    #[tokio::test]
    async fn unknown_ids_are_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom(&["a1"])))
            .mount(&server)
            .await;

        let client = test_client(&server, 10);
        let docs = client.fetch(&ids(&["a1", "missing"])).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let result = ArxivClient::new(ArxivOptions {
            batch_size: 0,
            ..ArxivOptions::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn batch_url_carries_ids() {
        let client = ArxivClient::new(ArxivOptions::default()).unwrap();
        let url = client.batch_url(&ids(&["2501.00001", "2501.00002"]));
        assert_eq!(
            url.as_str(),
            "http://export.arxiv.org/api/query?id_list=2501.00001%2C2501.00002&max_results=2"
        );
    }
}
