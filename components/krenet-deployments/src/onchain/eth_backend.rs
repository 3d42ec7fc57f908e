use super::{
    BackendError, ContractFactory, DeployBackend, DeployedContract, PendingDeployment,
};
use crate::types::ContractPublishSpecification;
use eth_rpc_client::{to_hex_quantity, EthRpc, TransactionRequest};
use krenet_files::{FileLocation, NetworkManifest};
use std::time::{Duration, Instant};

const KEYSTORE_PASSPHRASE: &str = "";
const UNLOCK_DURATION_SECS: u64 = 600;

/// Deploys through an Ethereum-compatible node. Transactions are
/// signed node-side with `eth_sendTransaction`: accounts configured
/// with a private key are imported into the node keystore and unlocked
/// up front, accounts without one must already be managed by the node.
pub struct EthBackend {
    rpc: EthRpc,
    project_root: FileLocation,
    artifacts_location: FileLocation,
    gas_limit: Option<u64>,
    confirmation_delay: Duration,
    confirmation_timeout: Duration,
}

impl EthBackend {
    pub fn new(
        network_manifest: &NetworkManifest,
        project_root: FileLocation,
        artifacts_location: FileLocation,
    ) -> Result<EthBackend, BackendError> {
        let rpc = EthRpc::new(&network_manifest.network.rpc_url);

        for account in network_manifest.accounts.values() {
            if let Some(ref private_key) = account.private_key {
                // Best effort: hardhat-style devnets pre-unlock their
                // accounts and expose no personal namespace, and geth
                // rejects keys it already holds.
                if let Err(e) = rpc.import_raw_key(private_key, KEYSTORE_PASSPHRASE) {
                    log::warn!("unable to import key for '{}': {}", account.label, e);
                }
                if let Err(e) = rpc.unlock_account(
                    &account.address,
                    KEYSTORE_PASSPHRASE,
                    UNLOCK_DURATION_SECS,
                ) {
                    log::warn!("unable to unlock '{}': {}", account.label, e);
                }
            }
        }

        Ok(EthBackend {
            rpc,
            project_root,
            artifacts_location,
            gas_limit: network_manifest.network.gas_limit,
            confirmation_delay: Duration::from_secs(
                network_manifest.network.confirmation_delay_secs,
            ),
            confirmation_timeout: Duration::from_secs(
                network_manifest.network.confirmation_timeout_secs,
            ),
        })
    }

    pub fn chain_id(&self) -> Result<u64, BackendError> {
        self.rpc
            .get_chain_id()
            .map_err(|e| BackendError::Signers(e.to_string()))
    }

    fn artifact_location(
        &self,
        specification: &ContractPublishSpecification,
    ) -> Result<FileLocation, BackendError> {
        let invalid = |reason: String| BackendError::InvalidArtifact {
            contract: specification.contract_name.clone(),
            reason,
        };
        match specification.artifact_path {
            // Overrides are relative to the project root.
            Some(ref path) => {
                let mut location = self.project_root.clone();
                location.append_path(path).map_err(invalid)?;
                Ok(location)
            }
            None => {
                let mut location = self.artifacts_location.clone();
                location
                    .append_path(&format!("{}.json", specification.contract_name))
                    .map_err(invalid)?;
                Ok(location)
            }
        }
    }
}

impl DeployBackend for EthBackend {
    fn get_signers(&self) -> Result<Vec<String>, BackendError> {
        self.rpc
            .get_accounts()
            .map_err(|e| BackendError::Signers(e.to_string()))
    }

    fn get_factory(
        &self,
        specification: &ContractPublishSpecification,
    ) -> Result<ContractFactory, BackendError> {
        let location = self.artifact_location(specification)?;
        if !location.exists() {
            return Err(BackendError::UnknownContract(
                specification.contract_name.clone(),
            ));
        }
        let content = location.read_content_as_utf8().map_err(|reason| {
            BackendError::InvalidArtifact {
                contract: specification.contract_name.clone(),
                reason,
            }
        })?;
        parse_artifact(&specification.contract_name, &content)
    }

    fn submit_deployment(
        &self,
        factory: &ContractFactory,
        sender: &str,
        constructor_args: &[String],
    ) -> Result<PendingDeployment, BackendError> {
        let encoded_args = encode_constructor_args(&factory.abi, constructor_args)
            .map_err(|message| BackendError::Submission {
                contract: factory.contract_name.clone(),
                message,
            })?;

        let mut init_code = factory.bytecode.clone();
        init_code.extend_from_slice(&encoded_args);

        let request = TransactionRequest {
            from: sender.to_string(),
            gas: self.gas_limit.map(to_hex_quantity),
            data: format!("0x{}", hex::encode(&init_code)),
            ..Default::default()
        };

        let transaction_hash =
            self.rpc
                .send_transaction(&request)
                .map_err(|e| BackendError::Submission {
                    contract: factory.contract_name.clone(),
                    message: e.to_string(),
                })?;

        Ok(PendingDeployment {
            contract_name: factory.contract_name.clone(),
            transaction_hash,
        })
    }

    fn wait_for_deployment(
        &self,
        pending: &PendingDeployment,
    ) -> Result<DeployedContract, BackendError> {
        let started_at = Instant::now();
        loop {
            std::thread::sleep(self.confirmation_delay);

            let receipt = self
                .rpc
                .get_transaction_receipt(&pending.transaction_hash)
                .map_err(|e| BackendError::Confirmation {
                    contract: pending.contract_name.clone(),
                    message: e.to_string(),
                })?;

            if let Some(receipt) = receipt {
                if !receipt.succeeded() {
                    return Err(BackendError::Confirmation {
                        contract: pending.contract_name.clone(),
                        message: format!(
                            "transaction {} reverted",
                            pending.transaction_hash
                        ),
                    });
                }
                let contract_address = receipt.contract_address.ok_or_else(|| {
                    BackendError::Confirmation {
                        contract: pending.contract_name.clone(),
                        message: format!(
                            "receipt for {} carries no contract address",
                            pending.transaction_hash
                        ),
                    }
                })?;
                return Ok(DeployedContract {
                    contract_name: pending.contract_name.clone(),
                    contract_address,
                    transaction_hash: pending.transaction_hash.clone(),
                });
            }

            if started_at.elapsed() > self.confirmation_timeout {
                return Err(BackendError::Confirmation {
                    contract: pending.contract_name.clone(),
                    message: format!(
                        "transaction {} still unconfirmed after {}s",
                        pending.transaction_hash,
                        self.confirmation_timeout.as_secs()
                    ),
                });
            }
        }
    }
}

fn parse_artifact(contract_name: &str, content: &str) -> Result<ContractFactory, BackendError> {
    let artifact: serde_json::Value =
        serde_json::from_str(content).map_err(|e| BackendError::InvalidArtifact {
            contract: contract_name.to_string(),
            reason: e.to_string(),
        })?;

    let abi = artifact
        .get("abi")
        .cloned()
        .ok_or_else(|| BackendError::InvalidArtifact {
            contract: contract_name.to_string(),
            reason: "missing 'abi' field".to_string(),
        })?;

    let bytecode_hex = artifact
        .get("bytecode")
        .and_then(|b| b.as_str())
        .ok_or_else(|| BackendError::InvalidArtifact {
            contract: contract_name.to_string(),
            reason: "missing 'bytecode' field".to_string(),
        })?;
    let bytecode = hex::decode(bytecode_hex.trim_start_matches("0x")).map_err(|e| {
        BackendError::InvalidArtifact {
            contract: contract_name.to_string(),
            reason: format!("bytecode is not hex: {}", e),
        }
    })?;
    if bytecode.is_empty() {
        return Err(BackendError::InvalidArtifact {
            contract: contract_name.to_string(),
            reason: "bytecode is empty (is this an abstract contract?)".to_string(),
        });
    }

    Ok(ContractFactory {
        contract_name: contract_name.to_string(),
        abi,
        bytecode,
    })
}

/// ABI-encodes constructor arguments against the constructor entry of
/// the artifact's abi. Static types only (address, uintN, bool): one
/// 32 byte word per argument.
fn encode_constructor_args(
    abi: &serde_json::Value,
    constructor_args: &[String],
) -> Result<Vec<u8>, String> {
    let inputs = constructor_inputs(abi);

    if inputs.len() != constructor_args.len() {
        return Err(format!(
            "constructor takes {} argument(s), {} provided",
            inputs.len(),
            constructor_args.len()
        ));
    }

    let mut encoded = Vec::with_capacity(constructor_args.len() * 32);
    for (arg_type, value) in inputs.iter().zip(constructor_args.iter()) {
        encoded.extend_from_slice(&encode_word(arg_type, value)?);
    }
    Ok(encoded)
}

fn constructor_inputs(abi: &serde_json::Value) -> Vec<String> {
    let entries = match abi.as_array() {
        Some(entries) => entries,
        None => return vec![],
    };
    for entry in entries.iter() {
        if entry.get("type").and_then(|t| t.as_str()) == Some("constructor") {
            if let Some(inputs) = entry.get("inputs").and_then(|i| i.as_array()) {
                return inputs
                    .iter()
                    .map(|input| {
                        input
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("")
                            .to_string()
                    })
                    .collect();
            }
        }
    }
    vec![]
}

fn encode_word(arg_type: &str, value: &str) -> Result<[u8; 32], String> {
    let mut word = [0u8; 32];
    match arg_type {
        "address" => {
            let hex_part = value
                .strip_prefix("0x")
                .ok_or(format!("address '{}' is missing its 0x prefix", value))?;
            let bytes = hex::decode(hex_part)
                .map_err(|e| format!("address '{}' is not hex: {}", value, e))?;
            if bytes.len() != 20 {
                return Err(format!("address '{}' must be 20 bytes", value));
            }
            word[12..].copy_from_slice(&bytes);
        }
        t if t.starts_with("uint") => {
            if let Some(hex_part) = value.strip_prefix("0x") {
                // Hex literals cover the full 256 bit range.
                if hex_part.is_empty() || hex_part.len() > 64 {
                    return Err(format!("'{}' is not a valid {}", value, t));
                }
                let bytes = hex::decode(format!("{:0>64}", hex_part))
                    .map_err(|e| format!("'{}' is not a valid {}: {}", value, t, e))?;
                word.copy_from_slice(&bytes);
            } else {
                let quantity = value.parse::<u128>().map_err(|e| {
                    format!(
                        "'{}' is not a valid {}: {} (decimal literals are limited to \
                         128 bits, write larger values as hex)",
                        value, t, e
                    )
                })?;
                word[16..].copy_from_slice(&quantity.to_be_bytes());
            }
        }
        "bool" => match value {
            "true" => word[31] = 1,
            "false" => {}
            _ => return Err(format!("'{}' is not a valid bool", value)),
        },
        _ => {
            return Err(format!(
                "constructor argument type '{}' is not supported",
                arg_type
            ))
        }
    }
    Ok(word)
}
