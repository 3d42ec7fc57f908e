pub mod eth_backend;

use crate::types::{ConstructorArg, ContractPublishSpecification, DeploymentSpecification};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::mpsc::{Receiver, Sender};
use thiserror::Error;

/// Compiled artifact for one contract. Plain data: the backend that
/// produced it is the only thing that can submit it.
#[derive(Debug, Clone)]
pub struct ContractFactory {
    pub contract_name: String,
    pub abi: serde_json::Value,
    pub bytecode: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PendingDeployment {
    pub contract_name: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub contract_name: String,
    pub contract_address: String,
    pub transaction_hash: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("no compiled artifact for contract '{0}'")]
    UnknownContract(String),
    #[error("artifact for contract '{contract}' is invalid: {reason}")]
    InvalidArtifact { contract: String, reason: String },
    #[error("unable to submit deployment of '{contract}': {message}")]
    Submission { contract: String, message: String },
    #[error("deployment of '{contract}' was not confirmed: {message}")]
    Confirmation { contract: String, message: String },
    #[error("unable to list signers: {0}")]
    Signers(String),
}

pub trait DeployBackend {
    /// Accounts able to sign submissions. Index 0 is the default
    /// deployer.
    fn get_signers(&self) -> Result<Vec<String>, BackendError>;

    fn get_factory(
        &self,
        specification: &ContractPublishSpecification,
    ) -> Result<ContractFactory, BackendError>;

    /// Submits the deployment transaction. `constructor_args` are
    /// fully resolved literals: no references remain at this point.
    fn submit_deployment(
        &self,
        factory: &ContractFactory,
        sender: &str,
        constructor_args: &[String],
    ) -> Result<PendingDeployment, BackendError>;

    fn wait_for_deployment(
        &self,
        pending: &PendingDeployment,
    ) -> Result<DeployedContract, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractStatus {
    Pending,
    Deployed {
        contract_address: String,
        transaction_hash: String,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub contract_name: String,
    pub status: ContractStatus,
}

impl DeploymentResult {
    pub fn address(&self) -> Option<&str> {
        match &self.status {
            ContractStatus::Deployed {
                contract_address, ..
            } => Some(contract_address),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("contract '{contract}' references '{reference}' which is not deployed")]
    UnresolvedReference {
        contract: String,
        reference: String,
        results: Vec<DeploymentResult>,
    },
    #[error("{error}")]
    Backend {
        error: BackendError,
        results: Vec<DeploymentResult>,
    },
    #[error("deployment interrupted: {message}")]
    Interrupted {
        message: String,
        results: Vec<DeploymentResult>,
    },
}

impl ExecutionError {
    pub fn results(&self) -> &[DeploymentResult] {
        match self {
            ExecutionError::UnresolvedReference { results, .. } => results,
            ExecutionError::Backend { results, .. } => results,
            ExecutionError::Interrupted { results, .. } => results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Queued,
    Submitted,
    Confirmed,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct TransactionTracker {
    pub index: usize,
    pub name: String,
    pub status: TransactionStatus,
}

#[derive(Debug)]
pub enum DeploymentEvent {
    TransactionUpdate(TransactionTracker),
    Interrupted(String),
    DeploymentCompleted,
}

pub enum DeploymentCommand {
    Start,
}

/// Applies a deployment plan, one contract at a time, in plan order.
///
/// Trackers for every step are announced as Queued, then the function
/// blocks until `DeploymentCommand::Start` is received. Address
/// references are resolved against the contracts confirmed so far. The
/// first failure marks its step Failed, leaves the remaining steps
/// Pending and unattempted, and returns the partial results inside the
/// error.
pub fn apply_on_chain_deployment<B: DeployBackend>(
    backend: &B,
    deployment: &DeploymentSpecification,
    deployment_event_tx: Sender<DeploymentEvent>,
    deployment_command_rx: Receiver<DeploymentCommand>,
) -> Result<Vec<DeploymentResult>, ExecutionError> {
    let steps: Vec<&ContractPublishSpecification> =
        deployment.plan.contract_publishes().collect();

    let mut results: Vec<DeploymentResult> = steps
        .iter()
        .map(|spec| DeploymentResult {
            contract_name: spec.contract_name.clone(),
            status: ContractStatus::Pending,
        })
        .collect();

    for (index, spec) in steps.iter().enumerate() {
        let _ = deployment_event_tx.send(DeploymentEvent::TransactionUpdate(
            TransactionTracker {
                index,
                name: spec.contract_name.clone(),
                status: TransactionStatus::Queued,
            },
        ));
    }

    if deployment_command_rx.recv().is_err() {
        let message = "command channel closed before start".to_string();
        let _ = deployment_event_tx.send(DeploymentEvent::Interrupted(message.clone()));
        return Err(ExecutionError::Interrupted { message, results });
    }

    // Resolved on the first step that does not name its own sender, so
    // that a node without account listing can still apply a plan whose
    // steps all carry an expected sender.
    let mut default_signer: Option<String> = None;

    let mut deployed_addresses: HashMap<String, String> = HashMap::new();

    for (index, spec) in steps.iter().enumerate() {
        let mut constructor_args = Vec::with_capacity(spec.constructor_args.len());
        for arg in spec.constructor_args.iter() {
            match arg {
                ConstructorArg::Literal(value) => constructor_args.push(value.clone()),
                ConstructorArg::ContractRef(reference) => {
                    match deployed_addresses.get(reference) {
                        Some(address) => constructor_args.push(address.clone()),
                        None => {
                            // A correctly planned deployment can not
                            // reach this: the planner orders every
                            // reference before its referrer.
                            let message =
                                format!("reference '{}' is not deployed", reference);
                            results[index].status = ContractStatus::Failed(message);
                            let _ = deployment_event_tx
                                .send(DeploymentEvent::Interrupted(format!(
                                    "unresolved reference '{}' in '{}'",
                                    reference, spec.contract_name
                                )));
                            return Err(ExecutionError::UnresolvedReference {
                                contract: spec.contract_name.clone(),
                                reference: reference.clone(),
                                results,
                            });
                        }
                    }
                }
            }
        }

        let sender = if spec.expected_sender.is_empty() {
            match default_signer {
                Some(ref signer) => signer.clone(),
                None => {
                    let resolved = match backend.get_signers() {
                        Ok(signers) => signers.into_iter().next(),
                        Err(error) => {
                            results[index].status = ContractStatus::Failed(error.to_string());
                            let _ = deployment_event_tx
                                .send(DeploymentEvent::Interrupted(error.to_string()));
                            return Err(ExecutionError::Backend { error, results });
                        }
                    };
                    match resolved {
                        Some(signer) => {
                            default_signer = Some(signer.clone());
                            signer
                        }
                        None => {
                            let error =
                                BackendError::Signers("no account available".to_string());
                            results[index].status = ContractStatus::Failed(error.to_string());
                            let _ = deployment_event_tx
                                .send(DeploymentEvent::Interrupted(error.to_string()));
                            return Err(ExecutionError::Backend { error, results });
                        }
                    }
                }
            }
        } else {
            spec.expected_sender.clone()
        };

        let deployed = backend
            .get_factory(spec)
            .and_then(|factory| {
                backend.submit_deployment(&factory, &sender, &constructor_args)
            })
            .and_then(|pending| {
                log::debug!(
                    "submitted {} as {}",
                    spec.contract_name,
                    pending.transaction_hash
                );
                let _ = deployment_event_tx.send(DeploymentEvent::TransactionUpdate(
                    TransactionTracker {
                        index,
                        name: spec.contract_name.clone(),
                        status: TransactionStatus::Submitted,
                    },
                ));
                backend.wait_for_deployment(&pending)
            });

        match deployed {
            Ok(contract) => {
                deployed_addresses.insert(
                    contract.contract_name.clone(),
                    contract.contract_address.clone(),
                );
                results[index].status = ContractStatus::Deployed {
                    contract_address: contract.contract_address,
                    transaction_hash: contract.transaction_hash,
                };
                let _ = deployment_event_tx.send(DeploymentEvent::TransactionUpdate(
                    TransactionTracker {
                        index,
                        name: spec.contract_name.clone(),
                        status: TransactionStatus::Confirmed,
                    },
                ));
            }
            Err(error) => {
                results[index].status = ContractStatus::Failed(error.to_string());
                let _ = deployment_event_tx.send(DeploymentEvent::TransactionUpdate(
                    TransactionTracker {
                        index,
                        name: spec.contract_name.clone(),
                        status: TransactionStatus::Error(error.to_string()),
                    },
                ));
                return Err(ExecutionError::Backend { error, results });
            }
        }
    }

    let _ = deployment_event_tx.send(DeploymentEvent::DeploymentCompleted);
    Ok(results)
}

/// Renders results as one line per step, in plan order. The same
/// results always render the same string.
pub fn report(results: &[DeploymentResult]) -> String {
    let mut out = String::new();
    for result in results.iter() {
        match &result.status {
            ContractStatus::Deployed {
                contract_address, ..
            } => {
                let _ = writeln!(out, "{} -> {}", result.contract_name, contract_address);
            }
            ContractStatus::Failed(reason) => {
                let _ = writeln!(out, "{} -> FAILED: {}", result.contract_name, reason);
            }
            ContractStatus::Pending => {
                let _ = writeln!(out, "{} -> PENDING", result.contract_name);
            }
        }
    }
    out
}
