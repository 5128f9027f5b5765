//! Runtime choice between the plain HTTP and headless render transports.

use dailypapers_shared::Result;
use dailypapers_source::{HeadlessTransport, RenderTransport, StaticTransport};
use url::Url;

pub(crate) enum ListingTransport {
    Static(StaticTransport),
    Headless(HeadlessTransport),
}

impl ListingTransport {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Self::Static(_) => "http",
            Self::Headless(_) => "headless",
        }
    }
}

impl RenderTransport for ListingTransport {
    async fn load(&mut self, url: &Url) -> Result<String> {
        match self {
            Self::Static(t) => t.load(url).await,
            Self::Headless(t) => t.load(url).await,
        }
    }

    async fn trigger_more(&mut self) -> Result<()> {
        match self {
            Self::Static(t) => t.trigger_more().await,
            Self::Headless(t) => t.trigger_more().await,
        }
    }

    async fn current_content(&mut self) -> Result<String> {
        match self {
            Self::Static(t) => t.current_content().await,
            Self::Headless(t) => t.current_content().await,
        }
    }
}
