use std::collections::BTreeMap;

use toml::value::Value;

use super::FileLocation;

pub const NETWORKS_MANIFEST_PATH: &str = "settings/Networks.toml";
pub const DEFAULT_DEPLOYER_LABEL: &str = "deployer";

pub const DEFAULT_DEVNET_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_DEVNET_CHAIN_ID: u64 = 31337;

// Seconds between two receipt polls, and the point at which an
// unconfirmed deployment transaction is reported as failed.
pub const DEFAULT_DEVNET_CONFIRMATION_DELAY_SECS: u64 = 1;
pub const DEFAULT_CONFIRMATION_DELAY_SECS: u64 = 10;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigurationError {
    #[error("unable to read {0}: {1}")]
    ManifestUnreadable(String, String),
    #[error("network '{0}' not found in {NETWORKS_MANIFEST_PATH}")]
    UnknownNetwork(String),
    #[error("network '{0}' not supported (devnet, testnet, mainnet)")]
    UnsupportedNetwork(String),
    #[error("missing rpc_url for network '{0}' in {NETWORKS_MANIFEST_PATH}")]
    MissingRpcEndpoint(String),
    #[error("account '{0}' not found in {NETWORKS_MANIFEST_PATH}")]
    MissingAccount(String),
    #[error("environment variable '{0}' referenced by account '{1}' is not set")]
    MissingEnvVar(String, String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvmNetwork {
    Devnet,
    Testnet,
    Mainnet,
}

impl EvmNetwork {
    pub fn from_str(value: &str) -> Result<EvmNetwork, ConfigurationError> {
        match value.to_lowercase().as_str() {
            "devnet" => Ok(EvmNetwork::Devnet),
            "testnet" => Ok(EvmNetwork::Testnet),
            "mainnet" => Ok(EvmNetwork::Mainnet),
            _ => Err(ConfigurationError::UnsupportedNetwork(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvmNetwork::Devnet => "devnet",
            EvmNetwork::Testnet => "testnet",
            EvmNetwork::Mainnet => "mainnet",
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, EvmNetwork::Mainnet)
    }
}

impl std::fmt::Display for EvmNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct NetworksManifestFile {
    default_network: Option<String>,
    networks: Option<Value>,
    accounts: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    pub gas_limit: Option<u64>,
    pub confirmation_delay_secs: u64,
    pub confirmation_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountConfig {
    pub label: String,
    pub address: String,
    pub private_key: Option<String>,
    pub is_mainnet: bool,
}

/// One network profile plus the accounts shared across profiles,
/// extracted from `settings/Networks.toml` and validated once at load.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkManifest {
    pub network: NetworkConfig,
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl NetworkManifest {
    pub fn from_project_manifest_location(
        project_manifest_location: &FileLocation,
        network: &EvmNetwork,
    ) -> Result<NetworkManifest, ConfigurationError> {
        let mut manifest_location = project_manifest_location
            .get_parent_location()
            .map_err(ConfigurationError::Invalid)?;
        manifest_location
            .append_path(NETWORKS_MANIFEST_PATH)
            .map_err(ConfigurationError::Invalid)?;
        NetworkManifest::from_location(&manifest_location, network)
    }

    pub fn from_location(
        location: &FileLocation,
        network: &EvmNetwork,
    ) -> Result<NetworkManifest, ConfigurationError> {
        let content = location.read_content().map_err(|e| {
            ConfigurationError::ManifestUnreadable(location.to_display_string(), e)
        })?;
        let manifest_file: NetworksManifestFile = toml::from_slice(&content[..])
            .map_err(|e| ConfigurationError::Invalid(format!("unable to parse manifest: {}", e)))?;
        NetworkManifest::from_networks_manifest_file(&manifest_file, network)
    }

    pub fn from_networks_manifest_file(
        manifest_file: &NetworksManifestFile,
        network: &EvmNetwork,
    ) -> Result<NetworkManifest, ConfigurationError> {
        let profile = match &manifest_file.networks {
            Some(Value::Table(entries)) => match entries.get(network.as_str()) {
                Some(Value::Table(profile)) => Some(profile.clone()),
                _ => None,
            },
            _ => None,
        };

        let profile = match (profile, network) {
            (Some(profile), _) => profile,
            // A devnet profile can be fully defaulted (local node).
            (None, EvmNetwork::Devnet) => toml::value::Table::new(),
            (None, _) => {
                return Err(ConfigurationError::UnknownNetwork(
                    network.as_str().to_string(),
                ))
            }
        };

        let rpc_url = match profile.get("rpc_url") {
            Some(Value::String(url)) => url.clone(),
            _ if matches!(network, EvmNetwork::Devnet) => DEFAULT_DEVNET_RPC_URL.to_string(),
            _ => {
                return Err(ConfigurationError::MissingRpcEndpoint(
                    network.as_str().to_string(),
                ))
            }
        };

        let chain_id = match profile.get("chain_id") {
            Some(Value::Integer(chain_id)) => Some(*chain_id as u64),
            _ if matches!(network, EvmNetwork::Devnet) => Some(DEFAULT_DEVNET_CHAIN_ID),
            _ => None,
        };

        let gas_limit = match profile.get("gas_limit") {
            Some(Value::Integer(gas_limit)) => Some(*gas_limit as u64),
            _ => None,
        };

        let confirmation_delay_secs = match profile.get("confirmation_delay_secs") {
            Some(Value::Integer(delay)) => *delay as u64,
            _ if matches!(network, EvmNetwork::Devnet) => DEFAULT_DEVNET_CONFIRMATION_DELAY_SECS,
            _ => DEFAULT_CONFIRMATION_DELAY_SECS,
        };

        let confirmation_timeout_secs = match profile.get("confirmation_timeout_secs") {
            Some(Value::Integer(timeout)) => *timeout as u64,
            _ => DEFAULT_CONFIRMATION_TIMEOUT_SECS,
        };

        let mut accounts = BTreeMap::new();
        if let Some(Value::Table(entries)) = &manifest_file.accounts {
            for (account_name, account_settings) in entries.iter() {
                if let Value::Table(account_settings) = account_settings {
                    let address = match account_settings.get("address") {
                        Some(Value::String(address)) => {
                            validate_address(address, account_name)?
                        }
                        _ => {
                            return Err(ConfigurationError::Invalid(format!(
                                "account '{}' is missing an address",
                                account_name
                            )))
                        }
                    };

                    let private_key = match account_settings.get("private_key") {
                        Some(Value::String(raw)) => {
                            let expanded = expand_env_value(raw, account_name)?;
                            Some(validate_private_key(&expanded, account_name)?)
                        }
                        _ => None,
                    };

                    accounts.insert(
                        account_name.to_string(),
                        AccountConfig {
                            label: account_name.to_string(),
                            address,
                            private_key,
                            is_mainnet: network.is_mainnet(),
                        },
                    );
                }
            }
        }

        if !accounts.contains_key(DEFAULT_DEPLOYER_LABEL) {
            return Err(ConfigurationError::MissingAccount(
                DEFAULT_DEPLOYER_LABEL.to_string(),
            ));
        }

        Ok(NetworkManifest {
            network: NetworkConfig {
                name: network.as_str().to_string(),
                rpc_url,
                chain_id,
                gas_limit,
                confirmation_delay_secs,
                confirmation_timeout_secs,
            },
            accounts,
        })
    }

    /// Reads the `default_network` selector without loading a profile,
    /// for callers that let the manifest pick the target network.
    pub fn default_network_from_project_manifest_location(
        project_manifest_location: &FileLocation,
    ) -> Result<Option<EvmNetwork>, ConfigurationError> {
        let mut manifest_location = project_manifest_location
            .get_parent_location()
            .map_err(ConfigurationError::Invalid)?;
        manifest_location
            .append_path(NETWORKS_MANIFEST_PATH)
            .map_err(ConfigurationError::Invalid)?;
        let content = manifest_location.read_content().map_err(|e| {
            ConfigurationError::ManifestUnreadable(manifest_location.to_display_string(), e)
        })?;
        let manifest_file: NetworksManifestFile = toml::from_slice(&content[..])
            .map_err(|e| ConfigurationError::Invalid(format!("unable to parse manifest: {}", e)))?;
        match manifest_file.default_network {
            Some(name) => Ok(Some(EvmNetwork::from_str(&name)?)),
            None => Ok(None),
        }
    }

    pub fn default_deployer(&self) -> &AccountConfig {
        // Presence enforced at load time.
        &self.accounts[DEFAULT_DEPLOYER_LABEL]
    }
}

// Values written as "${VAR}" are resolved from the environment, so that
// private keys never have to live in the manifest itself.
fn expand_env_value(raw: &str, account_name: &str) -> Result<String, ConfigurationError> {
    let trimmed = raw.trim();
    if let Some(var_name) = trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        return std::env::var(var_name).map_err(|_| {
            ConfigurationError::MissingEnvVar(var_name.to_string(), account_name.to_string())
        });
    }
    Ok(trimmed.to_string())
}

fn validate_address(address: &str, account_name: &str) -> Result<String, ConfigurationError> {
    let hex_part = address.strip_prefix("0x").unwrap_or(address);
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigurationError::Invalid(format!(
            "address for account '{}' is not a valid 20 bytes hex string",
            account_name
        )));
    }
    Ok(format!("0x{}", hex_part.to_lowercase()))
}

fn validate_private_key(key: &str, account_name: &str) -> Result<String, ConfigurationError> {
    let hex_part = key.strip_prefix("0x").unwrap_or(key);
    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigurationError::Invalid(format!(
            "private key for account '{}' is not a valid 32 bytes hex string",
            account_name
        )));
    }
    Ok(hex_part.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_FIXTURE: &str = r#"
default_network = "testnet"

[networks.testnet]
rpc_url = "https://rpc.testnet.kre.io"
chain_id = 5

[accounts.deployer]
address = "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1"
private_key = "4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d"

[accounts.treasury]
address = "0xFFcf8FDEE72ac11b5c542428B35EEF5769C409f0"
"#;

    fn parse_fixture(network: &EvmNetwork) -> Result<NetworkManifest, ConfigurationError> {
        let manifest_file: NetworksManifestFile = toml::from_str(MANIFEST_FIXTURE).unwrap();
        NetworkManifest::from_networks_manifest_file(&manifest_file, network)
    }

    #[test]
    fn loads_named_profile() {
        let manifest = parse_fixture(&EvmNetwork::Testnet).unwrap();
        assert_eq!(manifest.network.rpc_url, "https://rpc.testnet.kre.io");
        assert_eq!(manifest.network.chain_id, Some(5));
        assert_eq!(
            manifest.network.confirmation_delay_secs,
            DEFAULT_CONFIRMATION_DELAY_SECS
        );
        assert_eq!(manifest.accounts.len(), 2);
        assert_eq!(
            manifest.default_deployer().address,
            "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1"
        );
    }

    #[test]
    fn devnet_profile_can_be_defaulted() {
        let manifest = parse_fixture(&EvmNetwork::Devnet).unwrap();
        assert_eq!(manifest.network.rpc_url, DEFAULT_DEVNET_RPC_URL);
        assert_eq!(manifest.network.chain_id, Some(DEFAULT_DEVNET_CHAIN_ID));
        assert_eq!(
            manifest.network.confirmation_delay_secs,
            DEFAULT_DEVNET_CONFIRMATION_DELAY_SECS
        );
    }

    #[test]
    fn unknown_profile_is_a_configuration_error() {
        let err = parse_fixture(&EvmNetwork::Mainnet).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownNetwork("mainnet".to_string())
        );
    }

    #[test]
    fn env_reference_resolves_from_environment() {
        std::env::set_var("KRENET_TEST_DEPLOYER_KEY", &"ab".repeat(32));
        let manifest_file: NetworksManifestFile = toml::from_str(
            r#"
[networks.testnet]
rpc_url = "https://rpc.testnet.kre.io"

[accounts.deployer]
address = "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1"
private_key = "${KRENET_TEST_DEPLOYER_KEY}"
"#,
        )
        .unwrap();
        let manifest =
            NetworkManifest::from_networks_manifest_file(&manifest_file, &EvmNetwork::Testnet)
                .unwrap();
        assert_eq!(
            manifest.default_deployer().private_key.as_deref(),
            Some("ab".repeat(32).as_str())
        );
    }

    #[test]
    fn missing_env_reference_is_a_configuration_error() {
        let manifest_file: NetworksManifestFile = toml::from_str(
            r#"
[networks.testnet]
rpc_url = "https://rpc.testnet.kre.io"

[accounts.deployer]
address = "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1"
private_key = "${KRENET_TEST_UNSET_VARIABLE}"
"#,
        )
        .unwrap();
        let err =
            NetworkManifest::from_networks_manifest_file(&manifest_file, &EvmNetwork::Testnet)
                .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingEnvVar(
                "KRENET_TEST_UNSET_VARIABLE".to_string(),
                "deployer".to_string()
            )
        );
    }

    #[test]
    fn missing_deployer_account_is_a_configuration_error() {
        let manifest_file: NetworksManifestFile = toml::from_str(
            r#"
[networks.testnet]
rpc_url = "https://rpc.testnet.kre.io"
"#,
        )
        .unwrap();
        let err =
            NetworkManifest::from_networks_manifest_file(&manifest_file, &EvmNetwork::Testnet)
                .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingAccount("deployer".to_string()));
    }
}
