//! The few node calls the async transaction builder depends on.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{event, Level};
use url::Url;

use crate::builder::constants::MAX_SAFE_GAS_PRICE;
use crate::errors::{Error, Result};

/// How long a gas price estimate is reused.
const GAS_PRICE_CACHE_TTL: Duration = Duration::from_secs(20);
/// Utilization (percent) below which the network is not congested.
const CONGESTION_UTILIZATION: u64 = 70;

#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Consensus protocol version in effect at the top block.
    async fn protocol_version(&self) -> Result<u64>;
    async fn height(&self) -> Result<u64>;
    async fn next_nonce(&self, account: &str) -> Result<u64>;
    /// Gas price to use, zero when the network is not congested.
    async fn gas_price(&self) -> Result<u128>;
    /// Broadcast a signed transaction, returning its hash.
    async fn post_transaction(&self, tx: &str) -> Result<String>;
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct Protocol {
    version: u64,
    effective_at_height: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct Status {
    node_version: String,
    protocols: Vec<Protocol>,
    top_block_height: u64,
}

#[derive(Deserialize, Debug)]
struct Height {
    height: u64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct NextNonce {
    next_nonce: u64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GasPrice {
    min_gas_price: u128,
    utilization: u64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PostedTx {
    tx_hash: String,
}

#[derive(Deserialize, Debug)]
struct NodeError {
    reason: String,
}

/// Gas price to offer given the minimal gas price of recent blocks.
pub fn increased_gas_price(min_gas_price: u128, utilization: u64) -> u128 {
    if utilization < CONGESTION_UTILIZATION {
        return 0;
    }
    let gas_price = (min_gas_price * 101 + 50) / 100;
    if gas_price > MAX_SAFE_GAS_PRICE {
        event!(
            Level::WARN,
            "Estimated gas price {} exceeds the maximum safe value, limiting to {}",
            gas_price,
            MAX_SAFE_GAS_PRICE
        );
        return MAX_SAFE_GAS_PRICE;
    }
    gas_price
}

/// Recent gas prices are served by 6.x nodes from 6.13 (and 6.12 dev builds).
fn supports_gas_prices(node_version: &str) -> bool {
    if node_version.starts_with("6.12.0+") {
        return true;
    }
    let mut parts = node_version
        .split(|c: char| c == '.' || c == '-' || c == '+')
        .map(|part| part.parse::<u64>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    major == 6 && minor >= 13
}

/// A node reached over its REST api.
pub struct HttpNode {
    client: reqwest::Client,
    url: Url,
    gas_price_cache: Mutex<Option<(Instant, u128)>>,
}

impl HttpNode {
    pub fn new(url: &str) -> Result<Self> {
        Ok(HttpNode {
            client: reqwest::Client::new(),
            url: Url::parse(url)?,
            gas_price_cache: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.url.join(path)?)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        event!(Level::TRACE, "GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::parse(response).await
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let reason = match response.json::<NodeError>().await {
                Ok(error) => error.reason,
                Err(_) => status.to_string(),
            };
            return Err(Error::Node(reason));
        }
        Ok(response.json::<T>().await?)
    }

    async fn status(&self) -> Result<Status> {
        self.get("v3/status").await
    }
}

#[async_trait]
impl NodeApi for HttpNode {
    async fn protocol_version(&self) -> Result<u64> {
        let status = self.status().await?;
        status
            .protocols
            .iter()
            .filter(|protocol| protocol.effective_at_height <= status.top_block_height)
            .max_by_key(|protocol| protocol.effective_at_height)
            .map(|protocol| protocol.version)
            .ok_or_else(|| Error::Node(String::from("Node reports no active protocol")))
    }

    async fn height(&self) -> Result<u64> {
        Ok(self.get::<Height>("v3/key-blocks/current/height").await?.height)
    }

    async fn next_nonce(&self, account: &str) -> Result<u64> {
        let path = format!("v3/accounts/{}/next-nonce", account);
        Ok(self.get::<NextNonce>(&path).await?.next_nonce)
    }

    async fn gas_price(&self) -> Result<u128> {
        let mut cache = self.gas_price_cache.lock().await;
        if let Some((time, gas_price)) = *cache {
            if time.elapsed() < GAS_PRICE_CACHE_TTL {
                return Ok(gas_price);
            }
        }
        let status = self.status().await?;
        if !supports_gas_prices(&status.node_version) {
            return Ok(0);
        }
        let prices: Vec<GasPrice> = self.get("v3/recent-gas-prices").await?;
        let gas_price = prices
            .first()
            .map(|price| increased_gas_price(price.min_gas_price, price.utilization))
            .unwrap_or(0);
        *cache = Some((Instant::now(), gas_price));
        Ok(gas_price)
    }

    async fn post_transaction(&self, tx: &str) -> Result<String> {
        let url = self.endpoint("v3/transactions")?;
        event!(Level::DEBUG, "posting transaction {}", tx);
        let response = self
            .client
            .post(url)
            .json(&json!({ "tx": tx }))
            .send()
            .await?;
        Ok(Self::parse::<PostedTx>(response).await?.tx_hash)
    }
}
