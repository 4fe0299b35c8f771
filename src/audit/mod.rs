//! Audit Module
//!
//! Token safety checks run before any capital is committed:
//! - Address format
//! - Deployed bytecode exists
//! - Simulated `approve` to a well-known router succeeds (honeypot probe)

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AuditConfig;

/// `approve(address,uint256)`
const APPROVE_SELECTOR: &str = "095ea7b3";
/// Sender used for simulated calls
const PROBE_SENDER: &str = "0x000000000000000000000000000000000000dead";
/// 1e6 tokens at 18 decimals
const PROBE_AMOUNT: u128 = 1_000_000 * 1_000_000_000_000_000_000;

/// Verdict of a token audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub is_safe: bool,
    pub reason: String,
}

impl AuditReport {
    pub fn safe(reason: impl Into<String>) -> Self {
        Self { is_safe: true, reason: reason.into() }
    }

    pub fn unsafe_because(reason: impl Into<String>) -> Self {
        Self { is_safe: false, reason: reason.into() }
    }
}

/// Safety auditor consulted by the AUDIT stage. Failures are reported as an
/// unsafe verdict, never as an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SafetyAuditor: Send + Sync {
    async fn audit(&self, token: &str) -> AuditReport;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Auditor for EVM tokens over plain JSON-RPC
pub struct EvmAuditor {
    rpc_url: String,
    router_address: String,
    client: reqwest::Client,
}

impl EvmAuditor {
    pub fn new(config: &AuditConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            rpc_url: config.rpc_url.clone(),
            router_address: config.router_address.clone(),
            client,
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self.client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(anyhow!("{} failed ({}): {}", method, err.code, err.message));
        }
        response.result.ok_or_else(|| anyhow!("{} returned no result", method))
    }

    async fn has_code(&self, token: &str) -> Result<bool> {
        let code = self.rpc("eth_getCode", json!([token, "latest"])).await?;
        let code = code.as_str().unwrap_or_default();
        Ok(!hex_payload(code).is_empty())
    }

    /// `Ok(true)` when the simulated approve neither reverts nor returns false
    async fn simulate_approve(&self, token: &str) -> Result<bool> {
        let data = approve_calldata(&self.router_address, PROBE_AMOUNT)?;
        let call = json!({
            "from": PROBE_SENDER,
            "to": token,
            "data": data,
        });

        match self.rpc("eth_call", json!([call, "latest"])).await {
            Ok(result) => {
                let output = hex::decode(hex_payload(result.as_str().unwrap_or_default()))
                    .unwrap_or_default();
                Ok(!(output.len() == 32 && output.iter().all(|b| *b == 0)))
            }
            Err(e) => {
                debug!("Approve simulation reverted: {}", e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl SafetyAuditor for EvmAuditor {
    async fn audit(&self, token: &str) -> AuditReport {
        info!("Auditing token {}", token);

        if !is_address(token) {
            return AuditReport::unsafe_because("Invalid contract address");
        }

        match self.has_code(token).await {
            Ok(true) => {}
            Ok(false) => return AuditReport::unsafe_because("Ghost contract (no bytecode)"),
            Err(e) => {
                warn!("RPC node unreachable during audit: {}", e);
                return AuditReport::unsafe_because(format!("No connection to RPC node: {}", e));
            }
        }

        match self.simulate_approve(token).await {
            Ok(true) => AuditReport::safe("EVM audit passed: bytecode present and approve simulation succeeded"),
            Ok(false) => AuditReport::unsafe_because("Approve simulation failed (possible honeypot)"),
            Err(e) => AuditReport::unsafe_because(format!("Approve simulation unavailable: {}", e)),
        }
    }
}

/// `0x` followed by 40 hex digits
pub fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .map(|h| h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

fn hex_payload(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

/// ABI-encoded `approve(spender, amount)`
pub fn approve_calldata(spender: &str, amount: u128) -> Result<String> {
    if !is_address(spender) {
        return Err(anyhow!("Invalid spender address {}", spender));
    }
    let spender = hex::decode(&spender[2..]).context("Spender is not hex")?;
    Ok(format!(
        "0x{}{:0>64}{:064x}",
        APPROVE_SELECTOR,
        hex::encode(spender),
        amount
    ))
}
