use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub enum RpcError {
    Generic,
    StatusCode(u16),
    Message(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            RpcError::Message(e) => write!(f, "{}", e),
            RpcError::StatusCode(e) => write!(f, "error status code {}", e),
            RpcError::Generic => write!(f, "unknown error"),
        }
    }
}

pub struct EthRpc {
    pub url: String,
    pub client: Client,
    request_id: AtomicU64,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub data: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub contract_address: Option<String>,
    // "0x1" on success, "0x0" on revert.
    pub status: Option<String>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        match self.status.as_deref() {
            Some(status) => parse_hex_quantity(status).map(|s| s == 1).unwrap_or(false),
            // Pre-Byzantium chains omit the status field.
            None => self.contract_address.is_some(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize, Debug)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl EthRpc {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.into(),
            client: Client::builder().build().unwrap(),
            request_id: AtomicU64::new(1),
        }
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: JsonValue) -> Result<T, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let res = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|e| RpcError::Message(e.to_string()))?;

        if !res.status().is_success() {
            return Err(RpcError::StatusCode(res.status().as_u16()));
        }

        let response: RpcResponse<T> = res.json().map_err(|e| RpcError::Message(e.to_string()))?;
        if let Some(error) = response.error {
            return Err(RpcError::Message(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }
        response.result.ok_or(RpcError::Generic)
    }

    pub fn get_accounts(&self) -> Result<Vec<String>, RpcError> {
        self.call("eth_accounts", json!([]))
    }

    pub fn get_chain_id(&self) -> Result<u64, RpcError> {
        let quantity: String = self.call("eth_chainId", json!([]))?;
        parse_hex_quantity(&quantity)
    }

    pub fn get_block_number(&self) -> Result<u64, RpcError> {
        let quantity: String = self.call("eth_blockNumber", json!([]))?;
        parse_hex_quantity(&quantity)
    }

    pub fn get_transaction_count(&self, address: &str) -> Result<u64, RpcError> {
        let quantity: String =
            self.call("eth_getTransactionCount", json!([address, "latest"]))?;
        parse_hex_quantity(&quantity)
    }

    /// Submits a transaction signed by the node (the sending account
    /// must be managed and unlocked node-side). Returns the
    /// transaction hash.
    pub fn send_transaction(&self, transaction: &TransactionRequest) -> Result<String, RpcError> {
        self.call("eth_sendTransaction", json!([transaction]))
    }

    pub fn get_transaction_receipt(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.call("eth_getTransactionReceipt", json!([transaction_hash]))
    }

    /// Imports a raw private key into the node keystore. Returns the
    /// address of the imported account.
    pub fn import_raw_key(&self, private_key: &str, passphrase: &str) -> Result<String, RpcError> {
        self.call("personal_importRawKey", json!([private_key, passphrase]))
    }

    pub fn unlock_account(
        &self,
        address: &str,
        passphrase: &str,
        duration_secs: u64,
    ) -> Result<bool, RpcError> {
        self.call(
            "personal_unlockAccount",
            json!([address, passphrase, duration_secs]),
        )
    }
}

pub fn to_hex_quantity(value: u64) -> String {
    format!("{:#x}", value)
}

pub fn parse_hex_quantity(quantity: &str) -> Result<u64, RpcError> {
    let hex_part = quantity.strip_prefix("0x").ok_or_else(|| {
        RpcError::Message(format!("quantity '{}' is missing its 0x prefix", quantity))
    })?;
    u64::from_str_radix(hex_part, 16)
        .map_err(|e| RpcError::Message(format!("unable to parse quantity '{}' ({})", quantity, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_quantities_round_trip() {
        assert_eq!(to_hex_quantity(0), "0x0");
        assert_eq!(to_hex_quantity(31337), "0x7a69");
        assert_eq!(parse_hex_quantity("0x7a69").unwrap(), 31337);
        assert!(parse_hex_quantity("7a69").is_err());
    }

    #[test]
    fn transaction_request_omits_empty_fields() {
        let request = TransactionRequest {
            from: "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1".to_string(),
            data: "0x6080".to_string(),
            ..Default::default()
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({
                "from": "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1",
                "data": "0x6080",
            })
        );
    }

    #[test]
    fn receipt_status_drives_success() {
        let confirmed: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "status": "0x1",
        }))
        .unwrap();
        assert!(confirmed.succeeded());

        let reverted: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "contractAddress": null,
            "status": "0x0",
        }))
        .unwrap();
        assert!(!reverted.succeeded());
    }
}
