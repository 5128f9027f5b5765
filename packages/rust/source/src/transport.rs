//! Rendering/transport collaborators for the ranked listing.
//!
//! The collector only sees [`RenderTransport`]. Two implementations ship:
//! - [`StaticTransport`]: plain HTTP GET, for server-rendered listings
//! - [`HeadlessTransport`]: a Browserless-compatible `/function` endpoint
//!   that runs the page in a headless browser and scrolls it

use std::future::Future;
use std::time::Duration;

use dailypapers_shared::{DigestError, Result, RetryPolicy};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

/// User-Agent string for listing requests.
const USER_AGENT: &str = concat!("dailypapers/", env!("CARGO_PKG_VERSION"));

/// Default timeout in seconds for a single HTTP request.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Access to a page whose content grows as more is requested.
///
/// Every method may fail with a transport error; the collector maps any such
/// failure to an aborted collection.
pub trait RenderTransport: Send {
    /// Open `url` and return its initial rendered content.
    fn load(&mut self, url: &Url) -> impl Future<Output = Result<String>> + Send;

    /// Ask the page to load more content (the scroll-to-bottom equivalent).
    fn trigger_more(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// The full content as currently rendered.
    fn current_content(&mut self) -> impl Future<Output = Result<String>> + Send;
}

/// Build a reqwest client with appropriate settings.
fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(timeout)
        .build()
        .map_err(|e| DigestError::Transport(format!("failed to build HTTP client: {e}")))
}

/// Parse `raw` as a base URL for relative joins.
///
/// A trailing slash is added so that a path prefix (`http://host/browserless`)
/// survives `Url::join`.
pub(crate) fn parse_base_url(raw: &str, what: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).map_err(|e| DigestError::config(format!("invalid {what} '{raw}': {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Read a successful response body, mapping HTTP failures to transport errors.
async fn read_body(response: reqwest::Response, what: &str) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(DigestError::Transport(format!("{what}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| DigestError::Transport(format!("{what}: failed to read body: {e}")))
}

// ---------------------------------------------------------------------------
// StaticTransport
// ---------------------------------------------------------------------------

/// Plain HTTP transport. `trigger_more` has nothing to do, so a collection
/// over this transport converges once the stagnation limit is hit.
pub struct StaticTransport {
    client: Client,
    retry: RetryPolicy,
    current: Option<Url>,
}

impl StaticTransport {
    /// Create a transport with default timeout and retry policy.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            retry: RetryPolicy::default(),
            current: None,
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let client = &self.client;
        self.retry
            .run("listing fetch", || async move {
                let response = client
                    .get(url.as_str())
                    .send()
                    .await
                    .map_err(|e| DigestError::Transport(format!("{url}: {e}")))?;
                read_body(response, url.as_str()).await
            })
            .await
    }
}

impl RenderTransport for StaticTransport {
    #[instrument(skip_all, fields(url = %url))]
    async fn load(&mut self, url: &Url) -> Result<String> {
        let body = self.fetch(url).await?;
        self.current = Some(url.clone());
        Ok(body)
    }

    async fn trigger_more(&mut self) -> Result<()> {
        Ok(())
    }

    async fn current_content(&mut self) -> Result<String> {
        let url = self
            .current
            .clone()
            .ok_or_else(|| DigestError::Transport("no page loaded".into()))?;
        self.fetch(&url).await
    }
}

// ---------------------------------------------------------------------------
// HeadlessTransport
// ---------------------------------------------------------------------------

/// Script run by the headless browser: open the page, wait for the first
/// entries, scroll `context.scrolls` times, return the rendered HTML.
const RENDER_SCRIPT: &str = r#"export default async function ({ page, context }) {
  await page.goto(context.url, { waitUntil: "domcontentloaded", timeout: 60000 });
  await page.waitForSelector(context.readySelector, { timeout: context.waitMs }).catch(() => {});
  for (let i = 0; i < context.scrolls; i++) {
    await page.evaluate(() => window.scrollTo(0, document.body.scrollHeight));
    await new Promise((resolve) => setTimeout(resolve, context.settleMs));
  }
  return { data: await page.content(), type: "text/html" };
}"#;

/// Selector the render script waits for before scrolling.
const READY_SELECTOR: &str = "div.panel.paper";

/// Headless-browser transport backed by a Browserless-compatible endpoint.
///
/// The remote session is stateless, so each `current_content` re-renders the
/// page and replays every scroll requested so far.
pub struct HeadlessTransport {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    retry: RetryPolicy,
    settle: Duration,
    ready_wait: Duration,
    current: Option<Url>,
    scrolls: u32,
}

impl HeadlessTransport {
    /// Create a transport for the given endpoint (e.g. `http://localhost:3000`).
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let base = parse_base_url(endpoint, "render endpoint")?;
        let endpoint = base
            .join("function")
            .map_err(|e| DigestError::config(format!("invalid render endpoint '{endpoint}': {e}")))?;

        Ok(Self {
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS * 2))?,
            endpoint,
            token,
            retry: RetryPolicy::default(),
            settle: Duration::from_millis(1500),
            ready_wait: Duration::from_secs(30),
            current: None,
            scrolls: 0,
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pause between in-browser scrolls.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// How long the script waits for the first entries.
    pub fn with_ready_wait(mut self, wait: Duration) -> Self {
        self.ready_wait = wait;
        self
    }

    /// Scroll steps requested so far.
    pub fn scrolls(&self) -> u32 {
        self.scrolls
    }

    async fn render(&self, url: &Url) -> Result<String> {
        let mut endpoint = self.endpoint.clone();
        if let Some(token) = &self.token {
            endpoint.query_pairs_mut().append_pair("token", token);
        }

        let body = serde_json::json!({
            "code": RENDER_SCRIPT,
            "context": {
                "url": url.as_str(),
                "scrolls": self.scrolls,
                "settleMs": self.settle.as_millis() as u64,
                "waitMs": self.ready_wait.as_millis() as u64,
                "readySelector": READY_SELECTOR,
            },
        });

        debug!(%url, scrolls = self.scrolls, "rendering listing");

        let client = &self.client;
        let endpoint = &endpoint;
        let body = &body;
        self.retry
            .run("listing render", || async move {
                let response = client
                    .post(endpoint.as_str())
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| DigestError::Transport(format!("render {url}: {e}")))?;
                read_body(response, "render endpoint").await
            })
            .await
    }
}

impl RenderTransport for HeadlessTransport {
    #[instrument(skip_all, fields(url = %url))]
    async fn load(&mut self, url: &Url) -> Result<String> {
        self.scrolls = 0;
        let body = self.render(url).await?;
        self.current = Some(url.clone());
        Ok(body)
    }

    async fn trigger_more(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Err(DigestError::Transport("no page loaded".into()));
        }
        self.scrolls += 1;
        Ok(())
    }

    async fn current_content(&mut self) -> Result<String> {
        let url = self
            .current
            .clone()
            .ok_or_else(|| DigestError::Transport("no page loaded".into()))?;
        self.render(&url).await
    }
}
