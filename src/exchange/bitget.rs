//! Bitget REST client
//!
//! Public market data through the v2 spot endpoints. The account balance needs
//! signed requests and is only attempted when credentials are present in the
//! environment.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ExchangeClient, BALANCE_SENTINEL, MAX_CANDLE_PAGE, PRICE_SENTINEL};
use crate::config::ExchangeConfig;
use crate::utils::helpers::{compact_symbol, current_timestamp_millis};
use crate::utils::types::PriceBar;

type HmacSha256 = Hmac<Sha256>;

const SUCCESS_CODE: &str = "00000";
const QUOTE_COIN: &str = "USDT";
/// Envelope shared by every v2 response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: String,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self) -> Result<T> {
        if self.code != SUCCESS_CODE {
            return Err(anyhow!("Bitget error {}: {}", self.code, self.msg));
        }
        self.data.ok_or_else(|| anyhow!("Bitget response without data"))
    }
}

#[derive(Debug, Deserialize)]
struct Ticker {
    #[serde(rename = "lastPr")]
    last_price: String,
}

#[derive(Debug, Deserialize)]
struct Asset {
    coin: String,
    #[serde(default)]
    available: String,
    #[serde(default)]
    frozen: String,
    #[serde(default)]
    locked: String,
}

impl Asset {
    fn total(&self) -> f64 {
        [&self.available, &self.frozen, &self.locked]
            .iter()
            .filter_map(|v| v.parse::<f64>().ok())
            .sum()
    }
}

/// API credentials for signed endpoints
#[derive(Clone)]
pub struct BitgetCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl BitgetCredentials {
    /// Read the variables named in the config; any missing one disables signing
    pub fn from_env(config: &ExchangeConfig) -> Option<Self> {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Some(Self {
            api_key: read(&config.api_key_env)?,
            secret: read(&config.api_secret_env)?,
            passphrase: read(&config.passphrase_env)?,
        })
    }

    /// Base64 HMAC-SHA256 over `timestamp + METHOD + path[?query] + body`
    pub fn sign(&self, timestamp: i64, method: &str, request_path: &str, body: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| anyhow!("HMAC init failed: {}", e))?;
        mac.update(format!("{}{}{}{}", timestamp, method.to_uppercase(), request_path, body).as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for BitgetCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetCredentials")
            .field("api_key", &"***")
            .finish()
    }
}

pub struct BitgetClient {
    api_url: String,
    credentials: Option<BitgetCredentials>,
    client: reqwest::Client,
}

impl BitgetClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let credentials = BitgetCredentials::from_env(config);
        if credentials.is_none() {
            debug!("No Bitget credentials in environment, balance will read as 0");
        }
        Self::with_credentials(config, credentials)
    }

    pub fn with_credentials(config: &ExchangeConfig, credentials: Option<BitgetCredentials>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let url = format!(
            "{}/api/v2/spot/market/tickers?symbol={}",
            self.api_url,
            compact_symbol(symbol)
        );
        let response: ApiResponse<Vec<Ticker>> = self.client
            .get(&url)
            .send()
            .await?
            .json()
            .await?;

        let ticker = response
            .into_data()?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No ticker for {}", symbol))?;
        ticker
            .last_price
            .parse::<f64>()
            .with_context(|| format!("Unparseable price {:?}", ticker.last_price))
    }

    async fn fetch_balance(&self, credentials: &BitgetCredentials) -> Result<f64> {
        let request_path = format!("/api/v2/spot/account/assets?coin={}", QUOTE_COIN);
        let timestamp = current_timestamp_millis();
        let signature = credentials.sign(timestamp, "GET", &request_path, "")?;

        let response: ApiResponse<Vec<Asset>> = self.client
            .get(format!("{}{}", self.api_url, request_path))
            .header("ACCESS-KEY", &credentials.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp.to_string())
            .header("ACCESS-PASSPHRASE", &credentials.passphrase)
            .header("locale", "en-US")
            .send()
            .await?
            .json()
            .await?;

        Ok(response
            .into_data()?
            .iter()
            .filter(|a| a.coin.eq_ignore_ascii_case(QUOTE_COIN))
            .map(Asset::total)
            .sum())
    }

    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<PriceBar>> {
        let url = format!(
            "{}/api/v2/spot/market/candles?symbol={}&granularity={}&limit={}",
            self.api_url,
            compact_symbol(symbol),
            granularity(timeframe),
            candle_page(limit)
        );
        let response: ApiResponse<Vec<Vec<String>>> = self.client
            .get(&url)
            .send()
            .await?
            .json()
            .await?;

        let mut bars = response
            .into_data()?
            .iter()
            .map(|row| parse_candle(row))
            .collect::<Result<Vec<_>>>()?;
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

#[async_trait]
impl ExchangeClient for BitgetClient {
    async fn get_price(&self, symbol: &str) -> f64 {
        match self.fetch_price(symbol).await {
            Ok(price) => {
                debug!("{} last price {:.4}", symbol, price);
                price
            }
            Err(e) => {
                warn!("Failed to fetch {} price: {}", symbol, e);
                PRICE_SENTINEL
            }
        }
    }

    async fn get_balance(&self) -> f64 {
        let Some(credentials) = &self.credentials else {
            return BALANCE_SENTINEL;
        };
        match self.fetch_balance(credentials).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Failed to fetch balance: {}", e);
                BALANCE_SENTINEL
            }
        }
    }

    async fn get_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Vec<PriceBar> {
        match self.fetch_candles(symbol, timeframe, limit).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!("Failed to fetch {} {} candles: {}", symbol, timeframe, e);
                Vec::new()
            }
        }
    }
}

/// Page size actually requested; out-of-range limits are clamped with a warning
fn candle_page(limit: usize) -> usize {
    let page = limit.clamp(1, MAX_CANDLE_PAGE);
    if page != limit {
        warn!("Candle limit {} clamped to {}", limit, page);
    }
    page
}

/// Map a short timeframe ("15m", "1h", "1d") to the v2 granularity name
pub fn granularity(timeframe: &str) -> String {
    match timeframe {
        "1m" => "1min".to_string(),
        "3m" => "3min".to_string(),
        "5m" => "5min".to_string(),
        "15m" => "15min".to_string(),
        "30m" => "30min".to_string(),
        "1d" => "1day".to_string(),
        "1w" => "1week".to_string(),
        other => other.to_string(),
    }
}

/// `[ts, open, high, low, close, base_volume, ...]`, all strings
fn parse_candle(row: &[String]) -> Result<PriceBar> {
    if row.len() < 6 {
        return Err(anyhow!("Candle row too short: {} fields", row.len()));
    }
    let num = |i: usize| -> Result<f64> {
        row[i]
            .parse::<f64>()
            .with_context(|| format!("Bad candle field {}: {:?}", i, row[i]))
    };
    let timestamp = row[0]
        .parse::<i64>()
        .with_context(|| format!("Bad candle timestamp {:?}", row[0]))?;
    Ok(PriceBar::new(timestamp, num(1)?, num(2)?, num(3)?, num(4)?, num(5)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> BitgetCredentials {
        BitgetCredentials {
            api_key: "key".into(),
            secret: "secret".into(),
            passphrase: "pass".into(),
        }
    }

    #[test]
    fn test_granularity() {
        assert_eq!(granularity("15m"), "15min");
        assert_eq!(granularity("1h"), "1h");
        assert_eq!(granularity("1d"), "1day");
    }

    #[test]
    fn test_candle_page_bounds() {
        assert_eq!(candle_page(50), 50);
        assert_eq!(candle_page(1000), 1000);
        assert_eq!(candle_page(2500), 1000);
        assert_eq!(candle_page(0), 1);
    }

    #[test]
    fn test_parse_candle() {
        let row: Vec<String> = ["1700000000000", "1.0", "2.0", "0.5", "1.5", "100", "150", "150"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let bar = parse_candle(&row).unwrap();
        assert_eq!(bar.timestamp, 1_700_000_000_000);
        assert_eq!(bar.close, 1.5);
        assert_eq!(bar.volume, 100.0);

        assert!(parse_candle(&row[..3]).is_err());
    }

    #[test]
    fn test_signature_is_deterministic_base64() {
        let a = creds().sign(1_700_000_000_000, "get", "/api/v2/spot/account/assets?coin=USDT", "").unwrap();
        let b = creds().sign(1_700_000_000_000, "GET", "/api/v2/spot/account/assets?coin=USDT", "").unwrap();
        assert_eq!(a, b);
        assert_eq!(BASE64.decode(&a).unwrap().len(), 32);

        let c = creds().sign(1_700_000_000_001, "GET", "/api/v2/spot/account/assets?coin=USDT", "").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_error_envelope() {
        let json = r#"{"code":"40001","msg":"bad symbol","data":null}"#;
        let response: ApiResponse<Vec<Ticker>> = serde_json::from_str(json).unwrap();
        assert!(response.into_data().is_err());
    }

    #[test]
    fn test_asset_total() {
        let asset = Asset {
            coin: "USDT".into(),
            available: "10.5".into(),
            frozen: "1".into(),
            locked: String::new(),
        };
        assert!((asset.total() - 11.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unreachable_market_returns_sentinels() {
        let config = ExchangeConfig {
            api_url: "http://127.0.0.1:9".into(),
            request_timeout_ms: 500,
            ..ExchangeConfig::default()
        };
        let client = BitgetClient::with_credentials(&config, Some(creds())).unwrap();
        assert_eq!(client.get_price("SOL/USDT").await, PRICE_SENTINEL);
        assert_eq!(client.get_balance().await, BALANCE_SENTINEL);
        assert!(client.get_candles("SOL/USDT", "15m", 10).await.is_empty());
    }
}
