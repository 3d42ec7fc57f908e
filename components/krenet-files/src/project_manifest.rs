use toml::value::Value;

use super::network_manifest::{ConfigurationError, EvmNetwork};
use super::FileLocation;

pub const DEFAULT_ARTIFACTS_PATH: &str = "artifacts";

#[derive(Serialize, Deserialize, Debug)]
pub struct ProjectManifestFile {
    project: ProjectConfigFile,
    contracts: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProjectConfigFile {
    name: String,
    authors: Option<Vec<String>>,
    description: Option<String>,
    artifacts_path: Option<String>,
    default_network: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub name: String,
    pub authors: Vec<String>,
    pub description: String,
    pub artifacts_location: FileLocation,
    pub default_network: Option<EvmNetwork>,
}

/// One contract entry from `Krenet.toml`. Declaration order is
/// preserved: it is the tie-break order of the deployment planner.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractConfig {
    pub name: String,
    pub artifact_path: Option<String>,
    pub constructor_args: Vec<String>,
    pub depends_on: Vec<String>,
    pub deployer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProjectManifest {
    pub project: ProjectConfig,
    pub contracts: Vec<ContractConfig>,
    pub location: FileLocation,
}

impl ProjectManifest {
    pub fn from_location(location: &FileLocation) -> Result<ProjectManifest, ConfigurationError> {
        let content = location.read_content().map_err(|e| {
            ConfigurationError::ManifestUnreadable(location.to_display_string(), e)
        })?;
        let manifest_file: ProjectManifestFile = toml::from_slice(&content[..])
            .map_err(|e| ConfigurationError::Invalid(format!("unable to parse manifest: {}", e)))?;
        ProjectManifest::from_project_manifest_file(manifest_file, location)
    }

    pub fn from_project_manifest_file(
        manifest_file: ProjectManifestFile,
        location: &FileLocation,
    ) -> Result<ProjectManifest, ConfigurationError> {
        let mut artifacts_location = location
            .get_project_root_location()
            .map_err(ConfigurationError::Invalid)?;
        artifacts_location
            .append_path(
                manifest_file
                    .project
                    .artifacts_path
                    .as_deref()
                    .unwrap_or(DEFAULT_ARTIFACTS_PATH),
            )
            .map_err(ConfigurationError::Invalid)?;

        let default_network = match manifest_file.project.default_network {
            Some(ref name) => Some(EvmNetwork::from_str(name)?),
            None => None,
        };

        let project = ProjectConfig {
            name: manifest_file.project.name.clone(),
            authors: manifest_file.project.authors.clone().unwrap_or_default(),
            description: manifest_file
                .project
                .description
                .clone()
                .unwrap_or_default(),
            artifacts_location,
            default_network,
        };

        // The `preserve_order` feature of toml keeps table entries in
        // file order, which the walk below relies on.
        let mut contracts = Vec::new();
        if let Some(Value::Table(entries)) = &manifest_file.contracts {
            for (contract_name, contract_settings) in entries.iter() {
                let contract_settings = match contract_settings {
                    Value::Table(settings) => settings,
                    _ => {
                        return Err(ConfigurationError::Invalid(format!(
                            "contract '{}' entry malformed",
                            contract_name
                        )))
                    }
                };

                let artifact_path = match contract_settings.get("artifact_path") {
                    Some(Value::String(path)) => Some(path.clone()),
                    _ => None,
                };

                let constructor_args = string_array(
                    contract_settings.get("constructor_args"),
                    contract_name,
                    "constructor_args",
                )?;
                let depends_on = string_array(
                    contract_settings.get("depends_on"),
                    contract_name,
                    "depends_on",
                )?;

                let deployer = match contract_settings.get("deployer") {
                    Some(Value::String(label)) => Some(label.clone()),
                    _ => None,
                };

                contracts.push(ContractConfig {
                    name: contract_name.to_string(),
                    artifact_path,
                    constructor_args,
                    depends_on,
                    deployer,
                });
            }
        }

        Ok(ProjectManifest {
            project,
            contracts,
            location: location.clone(),
        })
    }
}

fn string_array(
    value: Option<&Value>,
    contract_name: &str,
    field: &str,
) -> Result<Vec<String>, ConfigurationError> {
    match value {
        None => Ok(vec![]),
        Some(Value::Array(items)) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items.iter() {
                match item {
                    Value::String(s) => values.push(s.clone()),
                    Value::Integer(i) => values.push(i.to_string()),
                    Value::Boolean(b) => values.push(b.to_string()),
                    _ => {
                        return Err(ConfigurationError::Invalid(format!(
                            "contract '{}': {} entries must be strings, integers or booleans",
                            contract_name, field
                        )))
                    }
                }
            }
            Ok(values)
        }
        Some(_) => Err(ConfigurationError::Invalid(format!(
            "contract '{}': {} must be an array",
            contract_name, field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_FIXTURE: &str = r#"
[project]
name = "kre-protocol"
authors = ["dev@kre.io"]
default_network = "testnet"

[contracts.MockUSDC]
constructor_args = ["1000000000000"]

[contracts.KREToken]
constructor_args = [
    "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1",
    "1000000000000",
    "${MockUSDC.address}",
]

[contracts.GoodsStore]
depends_on = ["KREToken"]
"#;

    #[test]
    fn contracts_keep_declaration_order() {
        let manifest_file: ProjectManifestFile = toml::from_str(MANIFEST_FIXTURE).unwrap();
        let location = FileLocation::from_path_string("/tmp/project/Krenet.toml").unwrap();
        let manifest =
            ProjectManifest::from_project_manifest_file(manifest_file, &location).unwrap();

        let names: Vec<&str> = manifest.contracts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["MockUSDC", "KREToken", "GoodsStore"]);
        assert_eq!(manifest.project.default_network, Some(EvmNetwork::Testnet));
        assert_eq!(
            manifest.project.artifacts_location.to_display_string(),
            "/tmp/project/artifacts"
        );
        assert_eq!(manifest.contracts[2].depends_on, vec!["KREToken"]);
    }
}
