extern crate serde;

#[macro_use]
extern crate serde_derive;

#[cfg(feature = "onchain")]
pub mod onchain;
pub mod types;

use krenet_files::{
    EvmNetwork, FileLocation, NetworkManifest, ProjectManifest, DEFAULT_DEPLOYER_LABEL,
};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use types::{
    ContractPublishSpecification, DeploymentSpecification, TransactionPlanSpecification,
    TransactionSpecification, TransactionsBatchSpecification,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanningError {
    #[error("contract '{0}' is declared more than once")]
    DuplicateContract(String),
    #[error("contract '{contract}' depends on unknown contract '{reference}'")]
    UnknownReference { contract: String, reference: String },
    #[error("contract '{contract}' uses unknown deployer '{deployer}'")]
    UnknownDeployer { contract: String, deployer: String },
    #[error("dependency cycle between contracts: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("{0}")]
    Invalid(String),
}

/// Orders contracts into batches of equal dependency depth. Batch 0
/// holds contracts with no dependencies, batch n holds contracts whose
/// deepest dependency sits in batch n - 1. Within a batch, declaration
/// order is preserved.
pub fn order_contracts(
    contracts: Vec<ContractPublishSpecification>,
) -> Result<Vec<Vec<ContractPublishSpecification>>, PlanningError> {
    let mut known_contracts = BTreeSet::new();
    for contract in contracts.iter() {
        if !known_contracts.insert(contract.contract_name.clone()) {
            return Err(PlanningError::DuplicateContract(
                contract.contract_name.clone(),
            ));
        }
    }

    for contract in contracts.iter() {
        for reference in contract.depends_on.iter() {
            if !known_contracts.contains(reference) {
                return Err(PlanningError::UnknownReference {
                    contract: contract.contract_name.clone(),
                    reference: reference.clone(),
                });
            }
        }
    }

    let mut batches: Vec<Vec<ContractPublishSpecification>> = vec![];
    let mut settled: HashMap<String, usize> = HashMap::new();
    let mut remaining = contracts;

    while !remaining.is_empty() {
        let mut next_remaining = vec![];
        let mut batch = vec![];
        for contract in remaining.into_iter() {
            let ready = contract
                .depends_on
                .iter()
                .all(|dep| settled.contains_key(dep));
            if ready {
                batch.push(contract);
            } else {
                next_remaining.push(contract);
            }
        }

        if batch.is_empty() {
            // Every unsettled contract is waiting on another unsettled
            // contract.
            return Err(PlanningError::Cycle(
                next_remaining
                    .into_iter()
                    .map(|c| c.contract_name)
                    .collect(),
            ));
        }

        for contract in batch.iter() {
            settled.insert(contract.contract_name.clone(), batches.len());
        }
        batches.push(batch);
        remaining = next_remaining;
    }

    Ok(batches)
}

pub fn build_plan(
    contracts: Vec<ContractPublishSpecification>,
) -> Result<TransactionPlanSpecification, PlanningError> {
    let batches = order_contracts(contracts)?
        .into_iter()
        .enumerate()
        .map(|(id, contracts)| TransactionsBatchSpecification {
            id,
            transactions: contracts
                .into_iter()
                .map(TransactionSpecification::ContractPublish)
                .collect(),
        })
        .collect();
    Ok(TransactionPlanSpecification { batches })
}

/// Derives a deployment specification from the project manifest: one
/// contract-publish per declared contract, ordered by dependency depth.
pub fn generate_default_deployment(
    manifest: &ProjectManifest,
    network: &EvmNetwork,
    network_manifest: &NetworkManifest,
) -> Result<DeploymentSpecification, PlanningError> {
    let mut contracts = vec![];
    for contract_config in manifest.contracts.iter() {
        let deployer_label = contract_config
            .deployer
            .as_deref()
            .unwrap_or(DEFAULT_DEPLOYER_LABEL);
        let deployer = network_manifest.accounts.get(deployer_label).ok_or(
            PlanningError::UnknownDeployer {
                contract: contract_config.name.clone(),
                deployer: deployer_label.to_string(),
            },
        )?;

        let mut spec = ContractPublishSpecification::new(
            &contract_config.name,
            &deployer.address,
            &contract_config.constructor_args,
            &contract_config.depends_on,
        )
        .map_err(PlanningError::Invalid)?;
        spec.artifact_path = contract_config.artifact_path.clone();
        contracts.push(spec);
    }

    let plan = build_plan(contracts)?;

    Ok(DeploymentSpecification {
        id: 0,
        name: format!("{} deployment", network.as_str()),
        network: network.clone(),
        evm_node: Some(network_manifest.network.rpc_url.clone()),
        plan,
    })
}

pub fn get_default_deployment_path(
    manifest: &ProjectManifest,
    network: &EvmNetwork,
) -> Result<FileLocation, String> {
    let mut deployment_path = manifest.location.get_parent_location()?;
    deployment_path.append_path("deployments")?;
    deployment_path.append_path(&format!("default.{}-plan.yaml", network.as_str()))?;
    Ok(deployment_path)
}
