//! JSON-RPC balance client

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;

use super::stats::round_to;
use super::FetchError;

const WEI_PER_ETH: f64 = 1e18;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// `eth_getBalance` over HTTP JSON-RPC
#[derive(Debug)]
pub struct BalanceClient {
    http_client: reqwest::Client,
    rpc_url: String,
    /// Successful RPC calls since start
    calls: AtomicU64,
}

impl BalanceClient {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            rpc_url: rpc_url.into(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Latest balance of `address` in ETH, rounded to 4 decimals
    pub async fn balance(&self, address: &str) -> Result<f64, FetchError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_getBalance",
            "params": [address, "latest"],
            "id": 1,
        });

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Deserialization(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(FetchError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let hex = body
            .result
            .ok_or_else(|| FetchError::Deserialization("missing result".to_string()))?;
        let wei = parse_quantity(&hex)?;

        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(wei_to_eth(wei))
    }
}

/// Parse a JSON-RPC hex quantity such as `0x1bc16d674ec80000`
pub fn parse_quantity(hex: &str) -> Result<u128, FetchError> {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .ok_or_else(|| FetchError::Deserialization(format!("not a hex quantity: {}", hex)))?;

    if digits.is_empty() {
        return Ok(0);
    }

    u128::from_str_radix(digits, 16)
        .map_err(|e| FetchError::Deserialization(format!("bad quantity {}: {}", hex, e)))
}

pub fn wei_to_eth(wei: u128) -> f64 {
    round_to(wei as f64 / WEI_PER_ETH, 4)
}
