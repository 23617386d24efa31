//! Async JSON-RPC HTTP provider for a development node.
//!
//! Supports configurable timeouts, exponential backoff retry, and
//! rate-limit awareness (HTTP 429 + Retry-After). Receipt polling is also
//! configured here: the recorder itself never times out.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ethereum_types::{Address, H256};
use serde_json::{Value, json};
use tracing::debug;

use super::{ChainReader, Submit};
use crate::error::RpcError;
use crate::types::{BlockId, Log, Receipt, TransactionRequest};

/// Configuration for RPC client behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// Per-request timeout (default: 30s).
    pub timeout: Duration,
    /// TCP connect timeout (default: 10s).
    pub connect_timeout: Duration,
    /// Maximum retry attempts for transient errors (default: 3).
    pub max_retries: u32,
    /// Base backoff duration, doubled each retry (default: 1s).
    pub base_backoff: Duration,
    /// Delay between receipt polls (default: 100ms).
    pub receipt_poll_interval: Duration,
    /// How many times to ask for a receipt before reporting it absent (default: 1).
    pub receipt_poll_attempts: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            receipt_poll_interval: Duration::from_millis(100),
            receipt_poll_attempts: 1,
        }
    }
}

/// Minimal Ethereum JSON-RPC provider over async HTTP.
pub struct HttpProvider {
    http: reqwest::Client,
    url: String,
    config: RpcConfig,
}

impl HttpProvider {
    pub fn new(url: &str) -> Self {
        Self::with_config(url, RpcConfig::default())
    }

    pub fn with_config(url: &str, config: RpcConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            url: url.to_string(),
            config,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Submit a transaction. Never retried: a lost answer may still mean
    /// the node accepted it, and resending would duplicate the call.
    pub async fn eth_send_transaction(&self, request: &TransactionRequest) -> Result<H256, RpcError> {
        let method = "eth_sendTransaction";
        let body = request_body(method, json!([transaction_object(request)]));
        let result = self.rpc_call_once(method, &body).await?;
        parse_h256(method, &result)
    }

    /// Single receipt lookup, `None` while the transaction is unknown or pending.
    pub async fn eth_get_transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", json!([format!("0x{hash:x}")]))
            .await?;
        parse_receipt(&result)
    }

    pub async fn eth_call(&self, to: Address, data: &[u8], block: BlockId) -> Result<Bytes, RpcError> {
        let call = json!({
            "to": format!("0x{to:x}"),
            "data": format!("0x{}", hex::encode(data)),
        });
        let result = self
            .rpc_call("eth_call", json!([call, block_param(block)]))
            .await?;
        parse_bytes("eth_call", &result)
    }

    pub async fn eth_get_latest_block_hash(&self) -> Result<H256, RpcError> {
        let result = self
            .rpc_call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        if result.is_null() {
            return Err(RpcError::parse(
                "eth_getBlockByNumber",
                "result",
                "block not found",
            ));
        }
        let hash = result
            .get("hash")
            .ok_or_else(|| RpcError::parse("eth_getBlockByNumber", "hash", "missing"))?;
        parse_h256("eth_getBlockByNumber", hash)
    }

    /// Execute a JSON-RPC call with retry and backoff.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = request_body(method, params);

        let max_attempts = self.config.max_retries + 1; // 1 initial + N retries
        let mut attempt = 0;
        loop {
            let err = match self.rpc_call_once(method, &body).await {
                Ok(val) => return Ok(val),
                Err(err) => err,
            };
            attempt += 1;
            if !err.is_retryable() || attempt >= max_attempts {
                if attempt > 1 {
                    return Err(RpcError::RetryExhausted {
                        method: method.into(),
                        attempts: attempt,
                        last_error: Box::new(err),
                    });
                }
                return Err(err);
            }

            // Respect Retry-After for 429s, otherwise base * 2^(attempt-1)
            let backoff = err
                .retry_after_secs()
                .map(Duration::from_secs)
                .unwrap_or_else(|| self.config.base_backoff * 2u32.saturating_pow(attempt - 1));
            debug!(method, attempt, ?backoff, error = %err, "retrying RPC call");
            tokio::time::sleep(backoff).await;
        }
    }

    /// Single attempt at an RPC call (no retry).
    async fn rpc_call_once(&self, method: &str, body: &Value) -> Result<Value, RpcError> {
        let response = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout {
                        method: method.into(),
                        elapsed_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    RpcError::ConnectionFailed {
                        url: self.url.clone(),
                        cause: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            // Extract Retry-After header for 429 responses
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(|v| format!("retry-after:{v}"))
                .unwrap_or_default();

            let body_text = response.text().await.unwrap_or_default();
            let display_body = if retry_after.is_empty() {
                body_text
            } else {
                retry_after
            };

            return Err(RpcError::HttpError {
                method: method.into(),
                status: status.as_u16(),
                body: display_body,
            });
        }

        let json_response: Value = response
            .json()
            .await
            .map_err(|e| RpcError::parse(method, "response_body", e.to_string()))?;

        if let Some(error) = json_response.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(RpcError::JsonRpcError {
                method: method.into(),
                code,
                message,
            });
        }

        json_response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::parse(method, "result", "missing result field"))
    }
}

fn request_body(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    })
}

#[async_trait]
impl Submit for HttpProvider {
    async fn send_transaction(&self, request: TransactionRequest) -> Result<H256, RpcError> {
        self.eth_send_transaction(&request).await
    }
}

#[async_trait]
impl ChainReader for HttpProvider {
    async fn get_transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError> {
        let attempts = self.config.receipt_poll_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(receipt) = self.eth_get_transaction_receipt(hash).await? {
                return Ok(Some(receipt));
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.receipt_poll_interval).await;
            }
        }
        Ok(None)
    }

    async fn call(&self, to: Address, data: Bytes, block: BlockId) -> Result<Bytes, RpcError> {
        self.eth_call(to, &data, block).await
    }

    async fn latest_block_hash(&self) -> Result<H256, RpcError> {
        self.eth_get_latest_block_hash().await
    }
}

fn transaction_object(request: &TransactionRequest) -> Value {
    let mut tx = json!({
        "from": format!("0x{:x}", request.from),
        "data": format!("0x{}", hex::encode(&request.data)),
        "value": format!("0x{:x}", request.value),
    });
    if let Some(to) = request.to {
        tx["to"] = json!(format!("0x{to:x}"));
    }
    tx
}

/// EIP-1898 block parameter; historical reads are pinned by hash.
fn block_param(block: BlockId) -> Value {
    match block {
        BlockId::Hash(hash) => json!({ "blockHash": format!("0x{hash:x}") }),
        BlockId::Latest => json!("latest"),
    }
}

// --- Parsing helpers ---

fn hex_str<'a>(method: &str, field: &str, val: &'a Value) -> Result<&'a str, RpcError> {
    let s = val
        .as_str()
        .ok_or_else(|| RpcError::parse(method, field, "expected hex string"))?;
    Ok(s.strip_prefix("0x").unwrap_or(s))
}

fn parse_bytes(method: &str, val: &Value) -> Result<Bytes, RpcError> {
    let s = hex_str(method, "bytes", val)?;
    hex::decode(s)
        .map(Bytes::from)
        .map_err(|e| RpcError::parse(method, "bytes", e.to_string()))
}

fn parse_u64(method: &str, field: &str, val: &Value) -> Result<u64, RpcError> {
    let s = hex_str(method, field, val)?;
    u64::from_str_radix(s, 16).map_err(|e| RpcError::parse(method, field, e.to_string()))
}

fn parse_h256(method: &str, val: &Value) -> Result<H256, RpcError> {
    let bytes = hex::decode(hex_str(method, "H256", val)?)
        .map_err(|e| RpcError::parse(method, "H256", e.to_string()))?;
    if bytes.len() != 32 {
        return Err(RpcError::parse(
            method,
            "H256",
            format!("expected 32 bytes, got {}", bytes.len()),
        ));
    }
    Ok(H256::from_slice(&bytes))
}

fn parse_address(method: &str, val: &Value) -> Result<Address, RpcError> {
    let bytes = hex::decode(hex_str(method, "Address", val)?)
        .map_err(|e| RpcError::parse(method, "Address", e.to_string()))?;
    if bytes.len() != 20 {
        return Err(RpcError::parse(
            method,
            "Address",
            format!("expected 20 bytes, got {}", bytes.len()),
        ));
    }
    Ok(Address::from_slice(&bytes))
}

fn field<'a>(val: &'a Value, name: &str) -> Result<&'a Value, RpcError> {
    val.get(name)
        .ok_or_else(|| RpcError::parse("eth_getTransactionReceipt", name, "missing"))
}

/// A `null` result or a receipt without a block hash means "not mined yet".
fn parse_receipt(val: &Value) -> Result<Option<Receipt>, RpcError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    if val.is_null() || val.get("blockHash").is_none_or(Value::is_null) {
        return Ok(None);
    }
    let logs = field(val, "logs")?
        .as_array()
        .ok_or_else(|| RpcError::parse(METHOD, "logs", "expected array"))?
        .iter()
        .map(parse_log)
        .collect::<Result<Vec<_>, _>>()?;
    // Pre-Byzantium receipts carry no status; treat them as successful
    let status = match val.get("status") {
        Some(s) if !s.is_null() => parse_u64(METHOD, "status", s)? == 1,
        _ => true,
    };
    Ok(Some(Receipt {
        transaction_hash: parse_h256(METHOD, field(val, "transactionHash")?)?,
        block_hash: parse_h256(METHOD, field(val, "blockHash")?)?,
        block_number: parse_u64(METHOD, "blockNumber", field(val, "blockNumber")?)?,
        status,
        logs,
    }))
}

fn parse_log(val: &Value) -> Result<Log, RpcError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    let topics = field(val, "topics")?
        .as_array()
        .ok_or_else(|| RpcError::parse(METHOD, "topics", "expected array"))?
        .iter()
        .map(|t| parse_h256(METHOD, t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Log {
        address: parse_address(METHOD, field(val, "address")?)?,
        topics,
        data: parse_bytes(METHOD, field(val, "data")?)?,
    })
}
