// HTTP adapter for the dealer-gamma service

use std::time::Duration;

use reqwest::{StatusCode, Url};
use tracing::{debug, instrument, warn};

use super::{GammaProvider, RawDataset};
use crate::config::ApiSettings;
use crate::engine::types::Symbol;
use crate::error::ProviderError;

const API_KEY_HEADER: &str = "X-API-Key";

pub struct ThfClient {
    client: reqwest::Client,
    base_url: Url,            // e.g. "https://api.thf-labs.com/v1"
    api_key: Option<String>,
}

impl ThfClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, ProviderError> {
        Self::with_builder(settings, reqwest::Client::builder())
    }

    fn with_builder(settings: &ApiSettings, builder: reqwest::ClientBuilder) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| ProviderError::Other(format!("invalid base url {:?}: {}", settings.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Other(format!("invalid base url {:?}", settings.base_url)));
        }
        let client = builder
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Other(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// `{base_url}/dealer-gamma/{symbol}` with the symbol percent-encoded as one path segment.
    pub fn gamma_url(&self, symbol: &Symbol) -> Url {
        let mut url = self.base_url.clone();
        // base was checked in `with_builder`, so it always has path segments
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("dealer-gamma").push(symbol.as_str());
        }
        url
    }
}

// 401/403 mean the key is wrong or missing; anything else non-2xx is reported with its body.
fn status_error(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let reason = status.canonical_reason().unwrap_or("access denied");
            ProviderError::Unauthorized(reason.to_string())
        }
        _ => ProviderError::Status { status: status.as_u16(), body: body.trim().to_string() },
    }
}

#[async_trait::async_trait]
impl GammaProvider for ThfClient {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn get_gamma_data(&self, symbol: &Symbol) -> Result<RawDataset, ProviderError> {
        let url = self.gamma_url(symbol);
        debug!(%url, "requesting dealer gamma");

        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "dealer gamma request rejected");
            return Err(status_error(status, body));
        }

        let value: serde_json::Value = res.json().await?;
        Ok(RawDataset(value))
    }
}
