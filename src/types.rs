use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use web3::types::Address;

use crate::filter::MatchMode;

#[derive(Debug, Error)]
pub enum Error {
    #[error("web3 error: {0}")]
    Web3(#[from] web3::Error),
    #[error("abi error: {0}")]
    Abi(#[from] ethabi::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected contract output: {0}")]
    Decode(String),
    #[error("rate out of range: {0}")]
    RateOverflow(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub const DEFAULT_RPC_ENDPOINT: &str = "https://eth.llamarpc.com";
pub const DEFAULT_AAVE_LENDING_POOL: &str = "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9";
pub const DEFAULT_COMPOUND_COMPTROLLER: &str = "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b";
pub const DEFAULT_TOKEN_METADATA_URL: &str = "https://app.rari.capital/api/tokenData";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Stand-in address for native ETH, which has no token contract.
pub const ETH_ADDRESS: Address = web3::types::H160([0u8; 20]);

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_endpoint: String,
    pub aave_lending_pool: Address,
    pub compound_comptroller: Address,
    pub token_metadata_url: url::Url,
    pub poll_interval: Duration,
    pub search_mode: MatchMode,
}

impl Config {
    /// Reads configuration from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let rpc_endpoint = get("RPC_ENDPOINT", DEFAULT_RPC_ENDPOINT);
        // Reject garbage early instead of on the first poll.
        url::Url::parse(&rpc_endpoint)?;

        let aave_lending_pool = parse_address(
            "AAVE_LENDING_POOL",
            &get("AAVE_LENDING_POOL", DEFAULT_AAVE_LENDING_POOL),
        )?;
        let compound_comptroller = parse_address(
            "COMPOUND_COMPTROLLER",
            &get("COMPOUND_COMPTROLLER", DEFAULT_COMPOUND_COMPTROLLER),
        )?;
        let token_metadata_url =
            url::Url::parse(&get("TOKEN_METADATA_URL", DEFAULT_TOKEN_METADATA_URL))?;

        let interval_raw = get("POLL_INTERVAL_SECS", &DEFAULT_POLL_INTERVAL_SECS.to_string());
        let interval_secs: u64 = interval_raw.trim().parse().map_err(|_| {
            Error::Config(format!("POLL_INTERVAL_SECS is not a number: {}", interval_raw))
        })?;
        if interval_secs == 0 {
            return Err(Error::Config("POLL_INTERVAL_SECS must be positive".into()));
        }

        let search_mode = get("SEARCH_MODE", "prefix").parse::<MatchMode>()?;

        Ok(Self {
            rpc_endpoint,
            aave_lending_pool,
            compound_comptroller,
            token_metadata_url,
            poll_interval: Duration::from_secs(interval_secs),
            search_mode,
        })
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| Error::Config(format!("{} is not an address ({}): {}", key, value, e)))
}

/// Annual rates as decimal fractions, so 0.035 means 3.50%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestRates {
    pub lending: Decimal,
    pub borrowing: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketInfo {
    pub token_address: Address,
    pub rates: InterestRates,
}

/// Latest published market list of one source. `None` until the first cycle succeeds.
pub type MarketSnapshot = Option<Arc<Vec<MarketInfo>>>;

/// Display metadata for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub logo_url: String,
    pub color: Option<String>,
    pub overlay_text_color: Option<String>,
}

/// One merged row. `data` stays `None` while the metadata lookup is outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub address: Address,
    pub data: Option<TokenData>,
}

impl TokenEntry {
    pub fn pending(address: Address) -> Self {
        Self { address, data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.rpc_endpoint, DEFAULT_RPC_ENDPOINT);
        assert_eq!(
            config.aave_lending_pool,
            DEFAULT_AAVE_LENDING_POOL.parse::<Address>().unwrap()
        );
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.search_mode, MatchMode::Prefix);
        assert_eq!(config.token_metadata_url.as_str(), DEFAULT_TOKEN_METADATA_URL);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("RPC_ENDPOINT", "http://localhost:8545"),
            ("POLL_INTERVAL_SECS", "12"),
            ("SEARCH_MODE", "contains"),
            ("COMPOUND_COMPTROLLER", "0x0000000000000000000000000000000000000001"),
        ]))
        .unwrap();

        assert_eq!(config.rpc_endpoint, "http://localhost:8545");
        assert_eq!(config.poll_interval, Duration::from_secs(12));
        assert_eq!(config.search_mode, MatchMode::Contains);
        assert_eq!(config.compound_comptroller, Address::from_low_u64_be(1));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("POLL_INTERVAL_SECS", "0")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("POLL_INTERVAL_SECS", "soon")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("AAVE_LENDING_POOL", "0x1234")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("RPC_ENDPOINT", "not a url")])),
            Err(Error::Url(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("SEARCH_MODE", "fuzzy")])),
            Err(Error::Config(_))
        ));
    }
}
