//! ISP detection for the relay fallback.

use super::error::NotifyError;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

/// Default "what is my ISP" page.
pub const ISP_LOOKUP_URL: &str = "http://www.showmyisp.com/";

static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static VALUE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.td2").unwrap());

/// Reports the name of the ISP this machine is connecting through.
#[async_trait]
pub trait IspLookup: Send + Sync {
    async fn isp_name(&self) -> Result<String, NotifyError>;
}

/// Scrapes the ISP name from a lookup page.
pub struct WebIspLookup {
    client: Client,
    url: String,
}

impl WebIspLookup {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IspLookup for WebIspLookup {
    async fn isp_name(&self) -> Result<String, NotifyError> {
        debug!(url = %self.url, "Looking up ISP");

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Network {
                message: format!("ISP lookup returned status {}", response.status()),
            });
        }

        let html = response.text().await?;
        let isp = parse_isp_name(&html).ok_or_else(|| NotifyError::Network {
            message: "ISP lookup page has no ISP field".to_string(),
        })?;

        info!(isp = %isp, "Detected ISP");
        Ok(isp)
    }
}

/// Finds the value cell next to the `ISP` label cell.
pub fn parse_isp_name(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let label = document
        .select(&CELL_SELECTOR)
        .find(|td| td.text().collect::<String>().trim() == "ISP")?;
    let row = label.parent().and_then(ElementRef::wrap)?;

    row.select(&VALUE_SELECTOR)
        .next()
        .map(|td| td.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
}
