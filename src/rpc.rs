//! JSON-RPC client for Ethereum nodes
//!
//! Provides the `ChainClient` boundary used by the locator, the fetcher pool
//! and the classification cache, and an HTTP implementation of it.

use crate::types::{decode_hex, Block, Header, Receipt};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Chain access needed by the analysis pipeline.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Full block with transaction objects.
    async fn block_by_number(&self, number: u64) -> Result<Block>;

    /// Receipt for a transaction, `None` if the node has none.
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>>;

    /// Header (number and timestamp) of a block.
    async fn header_by_number(&self, number: u64) -> Result<Header>;

    /// Header of the chain head.
    async fn latest_header(&self) -> Result<Header>;

    /// Contract code at the latest block. Empty for externally owned accounts.
    async fn code_at(&self, address: Address) -> Result<Vec<u8>>;

    /// Read-only `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>>;
}

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Make a JSON-RPC call.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error from {}: {}", method, error);
        }

        json.get("result")
            .cloned()
            .with_context(|| format!("{} response missing 'result' field", method))
    }

    /// Fetch `eth_getBlockByNumber` and fail on a `null` result.
    async fn get_block_value(&self, block: &str, full_tx: bool) -> Result<Value> {
        let result = self
            .request("eth_getBlockByNumber", json!([block, full_tx]))
            .await?;
        if result.is_null() {
            anyhow::bail!("Block {} not found", block);
        }
        Ok(result)
    }

    /// Decode a hex string result into bytes.
    fn hex_result(result: Value, what: &str) -> Result<Vec<u8>> {
        let s = result
            .as_str()
            .with_context(|| format!("{} response is not a string", what))?;
        decode_hex(s).with_context(|| format!("Failed to decode {} hex", what))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn block_by_number(&self, number: u64) -> Result<Block> {
        let result = self
            .get_block_value(&format!("0x{:x}", number), true)
            .await?;
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize block {}", number))
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        let result = self
            .request("eth_getTransactionReceipt", json!([format!("0x{:x}", tx_hash)]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .with_context(|| format!("Failed to deserialize receipt {:?}", tx_hash))
    }

    async fn header_by_number(&self, number: u64) -> Result<Header> {
        let result = self
            .get_block_value(&format!("0x{:x}", number), false)
            .await?;
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize header {}", number))
    }

    async fn latest_header(&self) -> Result<Header> {
        let result = self.get_block_value("latest", false).await?;
        serde_json::from_value(result).context("Failed to deserialize latest header")
    }

    async fn code_at(&self, address: Address) -> Result<Vec<u8>> {
        let result = self
            .request("eth_getCode", json!([format!("0x{:x}", address), "latest"]))
            .await?;
        Self::hex_result(result, "code")
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let params = json!([
            {
                "to": format!("0x{:x}", to),
                "data": format!("0x{}", hex::encode(&data)),
            },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        Self::hex_result(result, "eth_call")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, U256};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_rpc(rpc_method: &str, result: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result })),
            )
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_address_formatting() {
        let addr = address!("0742d35cc6634c0532925a3b844bc9e7595f0beb");
        assert_eq!(format!("0x{:x}", addr), "0x0742d35cc6634c0532925a3b844bc9e7595f0beb");
    }

    #[tokio::test]
    async fn test_block_by_number() {
        let server = mock_rpc(
            "eth_getBlockByNumber",
            json!({
                "number": "0x10",
                "timestamp": "0x64",
                "baseFeePerGas": "0x7",
                "transactions": [{
                    "hash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                    "from": "0x0000000000000000000000000000000000000001",
                    "to": "0x0000000000000000000000000000000000000002",
                    "value": "0x3e8",
                    "gasPrice": "0x2",
                    "input": "0x"
                }]
            }),
        )
        .await;
        let rpc = RpcClient::new(server.uri());
        let block = rpc.block_by_number(16).await.unwrap();
        assert_eq!(block.number, 16);
        assert_eq!(block.timestamp, 100);
        assert_eq!(block.base_fee_per_gas, Some(U256::from(7u64)));
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].value, U256::from(1000u64));
    }

    #[tokio::test]
    async fn test_missing_block_is_error() {
        let server = mock_rpc("eth_getBlockByNumber", Value::Null).await;
        let rpc = RpcClient::new(server.uri());
        assert!(rpc.block_by_number(99).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_receipt_is_none() {
        let server = mock_rpc("eth_getTransactionReceipt", Value::Null).await;
        let rpc = RpcClient::new(server.uri());
        let receipt = rpc.transaction_receipt(B256::ZERO).await.unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn test_rpc_error_is_propagated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "execution reverted" }
            })))
            .mount(&server)
            .await;
        let rpc = RpcClient::new(server.uri());
        let err = rpc
            .call(Address::ZERO, vec![0x18, 0x16, 0x0d, 0xdd])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("execution reverted"));
    }

    #[tokio::test]
    async fn test_code_at_decodes_hex() {
        let server = mock_rpc("eth_getCode", json!("0x6080")).await;
        let rpc = RpcClient::new(server.uri());
        let code = rpc.code_at(Address::ZERO).await.unwrap();
        assert_eq!(code, vec![0x60, 0x80]);
    }
}
