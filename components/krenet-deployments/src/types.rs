use krenet_files::{EvmNetwork, FileLocation};
use std::collections::BTreeSet;

/// A constructor argument is either a literal value, or a reference to
/// the address of a contract deployed by an earlier step. References
/// are written `${ContractName.address}` in plan and manifest files,
/// and stay unresolved until the referenced deployment is confirmed.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ConstructorArg {
    Literal(String),
    ContractRef(String),
}

impl ConstructorArg {
    pub fn parse(raw: &str) -> Result<ConstructorArg, String> {
        let trimmed = raw.trim();
        if let Some(inner) = trimmed
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            let contract_name = inner.strip_suffix(".address").ok_or(format!(
                "unable to parse reference '{}' (expected '${{ContractName.address}}')",
                raw
            ))?;
            if contract_name.is_empty() {
                return Err(format!("unable to parse reference '{}'", raw));
            }
            return Ok(ConstructorArg::ContractRef(contract_name.to_string()));
        }
        Ok(ConstructorArg::Literal(trimmed.to_string()))
    }

    pub fn to_file_string(&self) -> String {
        match self {
            ConstructorArg::Literal(value) => value.clone(),
            ConstructorArg::ContractRef(contract_name) => {
                format!("${{{}.address}}", contract_name)
            }
        }
    }

    pub fn referenced_contract(&self) -> Option<&str> {
        match self {
            ConstructorArg::Literal(_) => None,
            ConstructorArg::ContractRef(contract_name) => Some(contract_name),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContractPublishSpecificationFile {
    pub contract_name: String,
    pub expected_sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constructor_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionSpecificationFile {
    ContractPublish(ContractPublishSpecificationFile),
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransactionsBatchSpecificationFile {
    pub id: usize,
    pub transactions: Vec<TransactionSpecificationFile>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransactionPlanSpecificationFile {
    pub batches: Vec<TransactionsBatchSpecificationFile>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeploymentSpecificationFile {
    pub id: Option<u32>,
    pub name: String,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evm_node: Option<String>,
    pub plan: Option<TransactionPlanSpecificationFile>,
}

/// One deployment step: publish `contract_name` with the given
/// constructor arguments. `depends_on` always contains every contract
/// referenced from `constructor_args`; explicit entries may add more.
#[derive(Debug, PartialEq, Clone)]
pub struct ContractPublishSpecification {
    pub contract_name: String,
    pub expected_sender: String,
    pub constructor_args: Vec<ConstructorArg>,
    pub depends_on: BTreeSet<String>,
    pub artifact_path: Option<String>,
}

impl ContractPublishSpecification {
    pub fn new(
        contract_name: &str,
        expected_sender: &str,
        raw_constructor_args: &[String],
        explicit_depends_on: &[String],
    ) -> Result<ContractPublishSpecification, String> {
        if contract_name.trim().is_empty() {
            return Err("contract name can not be empty".to_string());
        }

        let mut constructor_args = Vec::with_capacity(raw_constructor_args.len());
        for raw in raw_constructor_args.iter() {
            constructor_args.push(ConstructorArg::parse(raw)?);
        }

        let mut depends_on: BTreeSet<String> =
            explicit_depends_on.iter().cloned().collect();
        for arg in constructor_args.iter() {
            if let Some(contract_name) = arg.referenced_contract() {
                depends_on.insert(contract_name.to_string());
            }
        }

        Ok(ContractPublishSpecification {
            contract_name: contract_name.to_string(),
            expected_sender: expected_sender.to_string(),
            constructor_args,
            depends_on,
            artifact_path: None,
        })
    }

    pub fn from_specifications(
        specs: &ContractPublishSpecificationFile,
    ) -> Result<ContractPublishSpecification, String> {
        let mut spec = ContractPublishSpecification::new(
            &specs.contract_name,
            &specs.expected_sender,
            specs.constructor_args.as_deref().unwrap_or(&[]),
            specs.depends_on.as_deref().unwrap_or(&[]),
        )?;
        spec.artifact_path = specs.artifact_path.clone();
        Ok(spec)
    }

    pub fn to_specification_file(&self) -> ContractPublishSpecificationFile {
        ContractPublishSpecificationFile {
            contract_name: self.contract_name.clone(),
            expected_sender: self.expected_sender.clone(),
            constructor_args: if self.constructor_args.is_empty() {
                None
            } else {
                Some(
                    self.constructor_args
                        .iter()
                        .map(|arg| arg.to_file_string())
                        .collect(),
                )
            },
            depends_on: if self.depends_on.is_empty() {
                None
            } else {
                Some(self.depends_on.iter().cloned().collect())
            },
            artifact_path: self.artifact_path.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum TransactionSpecification {
    ContractPublish(ContractPublishSpecification),
}

#[derive(Debug, PartialEq, Clone)]
pub struct TransactionsBatchSpecification {
    pub id: usize,
    pub transactions: Vec<TransactionSpecification>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TransactionPlanSpecification {
    pub batches: Vec<TransactionsBatchSpecification>,
}

impl TransactionPlanSpecification {
    pub fn contract_publishes(
        &self,
    ) -> impl Iterator<Item = &ContractPublishSpecification> {
        self.batches.iter().flat_map(|batch| {
            batch.transactions.iter().map(|tx| match tx {
                TransactionSpecification::ContractPublish(spec) => spec,
            })
        })
    }

    pub fn to_specification_file(&self) -> TransactionPlanSpecificationFile {
        TransactionPlanSpecificationFile {
            batches: self
                .batches
                .iter()
                .map(|batch| TransactionsBatchSpecificationFile {
                    id: batch.id,
                    transactions: batch
                        .transactions
                        .iter()
                        .map(|tx| match tx {
                            TransactionSpecification::ContractPublish(spec) => {
                                TransactionSpecificationFile::ContractPublish(
                                    spec.to_specification_file(),
                                )
                            }
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct DeploymentSpecification {
    pub id: u32,
    pub name: String,
    pub network: EvmNetwork,
    pub evm_node: Option<String>,
    pub plan: TransactionPlanSpecification,
}

impl DeploymentSpecification {
    pub fn from_config_file(
        deployment_location: &FileLocation,
    ) -> Result<DeploymentSpecification, String> {
        let spec_file_content = deployment_location.read_content()?;

        let specification_file: DeploymentSpecificationFile =
            match serde_yaml::from_slice(&spec_file_content[..]) {
                Ok(res) => res,
                Err(msg) => return Err(format!("unable to read file {}", msg)),
            };

        DeploymentSpecification::from_specifications(&specification_file)
    }

    pub fn from_specifications(
        specs: &DeploymentSpecificationFile,
    ) -> Result<DeploymentSpecification, String> {
        let network = EvmNetwork::from_str(&specs.network).map_err(|e| e.to_string())?;

        let mut batches = vec![];
        if let Some(ref plan) = specs.plan {
            for batch in plan.batches.iter() {
                let mut transactions = vec![];
                for tx in batch.transactions.iter() {
                    let transaction = match tx {
                        TransactionSpecificationFile::ContractPublish(spec) => {
                            TransactionSpecification::ContractPublish(
                                ContractPublishSpecification::from_specifications(spec)?,
                            )
                        }
                    };
                    transactions.push(transaction);
                }
                batches.push(TransactionsBatchSpecification {
                    id: batch.id,
                    transactions,
                });
            }
        }

        Ok(DeploymentSpecification {
            id: specs.id.unwrap_or(0),
            name: specs.name.to_string(),
            network,
            evm_node: specs.evm_node.clone(),
            plan: TransactionPlanSpecification { batches },
        })
    }

    pub fn to_specification_file(&self) -> DeploymentSpecificationFile {
        DeploymentSpecificationFile {
            id: Some(self.id),
            name: self.name.clone(),
            network: self.network.as_str().to_string(),
            evm_node: self.evm_node.clone(),
            plan: Some(self.plan.to_specification_file()),
        }
    }

    pub fn to_file_content(&self) -> Result<Vec<u8>, String> {
        let file = self.to_specification_file();
        let content = serde_yaml::to_string(&file)
            .map_err(|e| format!("unable to serialize deployment {}", e))?;
        Ok(content.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_and_references() {
        assert_eq!(
            ConstructorArg::parse("1000000").unwrap(),
            ConstructorArg::Literal("1000000".to_string())
        );
        assert_eq!(
            ConstructorArg::parse("${MockUSDC.address}").unwrap(),
            ConstructorArg::ContractRef("MockUSDC".to_string())
        );
        assert!(ConstructorArg::parse("${MockUSDC}").is_err());
        assert!(ConstructorArg::parse("${.address}").is_err());
    }

    #[test]
    fn references_are_merged_into_depends_on() {
        let spec = ContractPublishSpecification::new(
            "KREToken",
            "deployer",
            &[
                "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1".to_string(),
                "${MockUSDC.address}".to_string(),
            ],
            &["GoodsStore".to_string()],
        )
        .unwrap();
        let depends_on: Vec<&str> = spec.depends_on.iter().map(|s| s.as_str()).collect();
        assert_eq!(depends_on, vec!["GoodsStore", "MockUSDC"]);
    }

    #[test]
    fn file_form_round_trips() {
        let spec = ContractPublishSpecification::new(
            "KREToken",
            "deployer",
            &["42".to_string(), "${MockUSDC.address}".to_string()],
            &[],
        )
        .unwrap();
        let file = spec.to_specification_file();
        let reparsed = ContractPublishSpecification::from_specifications(&file).unwrap();
        assert_eq!(spec, reparsed);
    }
}
