use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use web3::types::Address;

use crate::types::{Result, TokenData, ETH_ADDRESS};

/// Lookup of display metadata for a token address.
#[async_trait]
pub trait TokenMetadataProvider: Send + Sync {
    async fn token_data(&self, address: Address) -> Result<TokenData>;
}

pub fn eth_token_data() -> TokenData {
    TokenData {
        address: ETH_ADDRESS,
        name: "Ethereum Network Token".to_string(),
        symbol: "ETH".to_string(),
        decimals: 18,
        logo_url: "https://icons.iconarchive.com/icons/cjdowner/cryptocurrency-flat/64/Ethereum-ETH-icon.png"
            .to_string(),
        color: Some("#627EEA".to_string()),
        overlay_text_color: Some("#fff".to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenDataResponse {
    name: String,
    symbol: String,
    #[serde(default)]
    decimals: u8,
    #[serde(rename = "logoURL", default)]
    logo_url: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    overlay_text_color: Option<String>,
}

impl TokenDataResponse {
    fn into_token_data(self, address: Address) -> TokenData {
        TokenData {
            address,
            name: self.name,
            symbol: self.symbol,
            decimals: self.decimals,
            logo_url: self.logo_url,
            color: self.color,
            overlay_text_color: self.overlay_text_color,
        }
    }
}

/// Token metadata from an HTTP service, cached per address for the session.
pub struct HttpTokenMetadata {
    http_client: Client,
    base_url: url::Url,
    cache: Arc<Mutex<HashMap<Address, TokenData>>>,
}

impl HttpTokenMetadata {
    pub fn new(base_url: url::Url) -> Self {
        log::info!("[HttpTokenMetadata::new] Using metadata service: {}", base_url);
        Self {
            http_client: Client::new(),
            base_url,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn request_url(&self, address: Address) -> url::Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("address", &format!("{:?}", address));
        url
    }

    async fn fetch(&self, address: Address) -> Result<TokenData> {
        let url = self.request_url(address);
        log::debug!("[HttpTokenMetadata::fetch] GET {}", url);

        let response = self
            .http_client
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        let body: TokenDataResponse = response.json().await?;
        Ok(body.into_token_data(address))
    }
}

#[async_trait]
impl TokenMetadataProvider for HttpTokenMetadata {
    async fn token_data(&self, address: Address) -> Result<TokenData> {
        if address == ETH_ADDRESS {
            return Ok(eth_token_data());
        }

        if let Some(token) = self.cache.lock().await.get(&address) {
            return Ok(token.clone());
        }

        // Failures are not cached, so the next lookup tries again.
        let token = self.fetch(address).await?;
        self.cache.lock().await.insert(address, token.clone());
        Ok(token)
    }
}
