use crate::deployments::{
    check_deployments, get_absolute_deployment_path, load_deployment, synthesize,
    write_deployment,
};

use clap::{Parser, Subcommand};
use krenet_deployments::onchain::eth_backend::EthBackend;
use krenet_deployments::onchain::{
    apply_on_chain_deployment, report, DeploymentCommand, DeploymentEvent,
};
use krenet_deployments::types::DeploymentSpecification;
use krenet_deployments::{generate_default_deployment, get_default_deployment_path};
use krenet_files::{get_manifest_location, EvmNetwork, NetworkManifest, ProjectManifest};
use std::process;
use std::sync::mpsc::channel;

/// Krenet is a command line tool for dependency-aware EVM contract
/// deployments.
#[derive(Parser, PartialEq, Clone, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"), name = "krenet", bin_name = "krenet")]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Manage contract deployments on Devnet/Testnet/Mainnet
    #[clap(subcommand, name = "deployments", aliases = &["deployment"])]
    Deployments(Deployments),
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Deployments {
    /// Check deployment plans format
    #[clap(name = "check", bin_name = "check")]
    CheckDeployments(CheckDeployments),
    /// Generate a deployment plan from Krenet.toml
    #[clap(name = "generate", bin_name = "generate")]
    GenerateDeployment(GenerateDeployment),
    /// Apply a deployment plan
    #[clap(name = "apply", bin_name = "apply")]
    ApplyDeployment(ApplyDeployment),
}

#[derive(Parser, PartialEq, Clone, Debug)]
struct CheckDeployments {
    /// Path to Krenet.toml
    #[clap(long = "manifest-path", short = 'm')]
    pub manifest_path: Option<String>,
}

#[derive(Parser, PartialEq, Clone, Debug)]
struct GenerateDeployment {
    /// Generate deployments/default.devnet-plan.yaml
    #[clap(long = "devnet", conflicts_with = "testnet", conflicts_with = "mainnet")]
    pub devnet: bool,
    /// Generate deployments/default.testnet-plan.yaml
    #[clap(long = "testnet", conflicts_with = "devnet", conflicts_with = "mainnet")]
    pub testnet: bool,
    /// Generate deployments/default.mainnet-plan.yaml
    #[clap(long = "mainnet", conflicts_with = "devnet", conflicts_with = "testnet")]
    pub mainnet: bool,
    /// Path to Krenet.toml
    #[clap(long = "manifest-path", short = 'm')]
    pub manifest_path: Option<String>,
}

#[derive(Parser, PartialEq, Clone, Debug)]
struct ApplyDeployment {
    /// Apply deployments/default.devnet-plan.yaml
    #[clap(
        long = "devnet",
        conflicts_with = "deployment_plan_path",
        conflicts_with = "testnet",
        conflicts_with = "mainnet"
    )]
    pub devnet: bool,
    /// Apply deployments/default.testnet-plan.yaml
    #[clap(
        long = "testnet",
        conflicts_with = "deployment_plan_path",
        conflicts_with = "devnet",
        conflicts_with = "mainnet"
    )]
    pub testnet: bool,
    /// Apply deployments/default.mainnet-plan.yaml
    #[clap(
        long = "mainnet",
        conflicts_with = "deployment_plan_path",
        conflicts_with = "devnet",
        conflicts_with = "testnet"
    )]
    pub mainnet: bool,
    /// Path to Krenet.toml
    #[clap(long = "manifest-path", short = 'm')]
    pub manifest_path: Option<String>,
    /// Apply the deployment plan at this path
    #[clap(
        long = "deployment-plan-path",
        short = 'p',
        conflicts_with = "devnet",
        conflicts_with = "testnet",
        conflicts_with = "mainnet"
    )]
    pub deployment_plan_path: Option<String>,
}

pub fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let opts = Opts::parse();

    match opts.command {
        Command::Deployments(subcommand) => match subcommand {
            Deployments::CheckDeployments(cmd) => {
                let manifest = load_manifest_or_exit(cmd.manifest_path);
                match check_deployments(&manifest) {
                    Ok(checked) if checked.is_empty() => {
                        println!("{} no deployment plans found", yellow!("note:"));
                    }
                    Ok(checked) => {
                        for (location, _) in checked.iter() {
                            println!("{} {}", green!("✔"), location.to_display_string());
                        }
                    }
                    Err(message) => {
                        eprintln!("{}", format_err!(message));
                        process::exit(1);
                    }
                }
            }
            Deployments::GenerateDeployment(cmd) => {
                let manifest = load_manifest_or_exit(cmd.manifest_path);
                let network = network_or_exit(
                    &manifest,
                    cmd.devnet,
                    cmd.testnet,
                    cmd.mainnet,
                );
                let (deployment, path) = generate_plan_or_exit(&manifest, &network);
                if let Err(message) = write_deployment(&deployment, &path, true) {
                    eprintln!("{}", format_err!(message));
                    process::exit(1);
                }
                println!(
                    "{} {}",
                    green!("Generated file"),
                    path.to_display_string()
                );
            }
            Deployments::ApplyDeployment(cmd) => {
                let manifest = load_manifest_or_exit(cmd.manifest_path);

                let deployment = match cmd.deployment_plan_path {
                    Some(ref deployment_plan_path) => {
                        let deployment_path =
                            get_absolute_deployment_path(&manifest, deployment_plan_path)
                                .unwrap_or_else(|message| {
                                    eprintln!("{}", format_err!(message));
                                    process::exit(1);
                                });
                        match load_deployment(&manifest, &deployment_path) {
                            Ok(deployment) => deployment,
                            Err(message) => {
                                eprintln!("{}", format_err!(message));
                                process::exit(1);
                            }
                        }
                    }
                    None => {
                        let network = network_or_exit(
                            &manifest,
                            cmd.devnet,
                            cmd.testnet,
                            cmd.mainnet,
                        );
                        let default_path = get_default_deployment_path(&manifest, &network)
                            .unwrap_or_else(|message| {
                                eprintln!("{}", format_err!(message));
                                process::exit(1);
                            });
                        if default_path.exists() {
                            println!(
                                "{} using existing {}",
                                yellow!("note:"),
                                default_path.to_display_string()
                            );
                            match load_deployment(&manifest, &default_path) {
                                Ok(deployment) => deployment,
                                Err(message) => {
                                    eprintln!("{}", format_err!(message));
                                    process::exit(1);
                                }
                            }
                        } else {
                            let (deployment, path) =
                                generate_plan_or_exit(&manifest, &network);
                            if let Err(message) = write_deployment(&deployment, &path, true)
                            {
                                eprintln!("{}", format_err!(message));
                                process::exit(1);
                            }
                            println!(
                                "{} {}",
                                green!("Generated file"),
                                path.to_display_string()
                            );
                            deployment
                        }
                    }
                };

                apply_deployment_or_exit(&manifest, deployment);
            }
        },
    }
}

fn load_manifest_or_exit(path: Option<String>) -> ProjectManifest {
    let manifest_location = match get_manifest_location(path) {
        Some(location) => location,
        None => {
            eprintln!("{}", format_err!("could not find Krenet.toml"));
            process::exit(1);
        }
    };
    match ProjectManifest::from_location(&manifest_location) {
        Ok(manifest) => manifest,
        Err(message) => {
            eprintln!("{}", format_err!(message));
            process::exit(1);
        }
    }
}

fn network_or_exit(
    manifest: &ProjectManifest,
    devnet: bool,
    testnet: bool,
    mainnet: bool,
) -> EvmNetwork {
    if devnet {
        return EvmNetwork::Devnet;
    }
    if testnet {
        return EvmNetwork::Testnet;
    }
    if mainnet {
        return EvmNetwork::Mainnet;
    }
    if let Some(ref network) = manifest.project.default_network {
        return network.clone();
    }
    match NetworkManifest::default_network_from_project_manifest_location(&manifest.location)
    {
        Ok(Some(network)) => network,
        Ok(None) => {
            eprintln!(
                "{}",
                format_err!(
                    "a flag `--devnet`, `--testnet` or `--mainnet` should be provided, \
                     or a default_network configured"
                )
            );
            process::exit(1);
        }
        Err(message) => {
            eprintln!("{}", format_err!(message));
            process::exit(1);
        }
    }
}

fn generate_plan_or_exit(
    manifest: &ProjectManifest,
    network: &EvmNetwork,
) -> (DeploymentSpecification, krenet_files::FileLocation) {
    let network_manifest =
        match NetworkManifest::from_project_manifest_location(&manifest.location, network) {
            Ok(network_manifest) => network_manifest,
            Err(message) => {
                eprintln!("{}", format_err!(message));
                process::exit(1);
            }
        };
    let deployment = match generate_default_deployment(manifest, network, &network_manifest)
    {
        Ok(deployment) => deployment,
        Err(message) => {
            eprintln!("{}", format_err!(message));
            process::exit(1);
        }
    };
    let path = match get_default_deployment_path(manifest, network) {
        Ok(path) => path,
        Err(message) => {
            eprintln!("{}", format_err!(message));
            process::exit(1);
        }
    };
    (deployment, path)
}

fn apply_deployment_or_exit(manifest: &ProjectManifest, deployment: DeploymentSpecification) {
    let network = deployment.network.clone();
    let network_manifest =
        match NetworkManifest::from_project_manifest_location(&manifest.location, &network) {
            Ok(network_manifest) => network_manifest,
            Err(message) => {
                eprintln!("{}", format_err!(message));
                process::exit(1);
            }
        };

    let project_root = match manifest.location.get_project_root_location() {
        Ok(location) => location,
        Err(message) => {
            eprintln!("{}", format_err!(message));
            process::exit(1);
        }
    };
    let backend = match EthBackend::new(
        &network_manifest,
        project_root,
        manifest.project.artifacts_location.clone(),
    ) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("{}", format_err!(e));
            process::exit(1);
        }
    };

    // Refuse to submit against a node on the wrong chain.
    if let Some(expected_chain_id) = network_manifest.network.chain_id {
        match backend.chain_id() {
            Ok(chain_id) if chain_id == expected_chain_id => {}
            Ok(chain_id) => {
                eprintln!(
                    "{}",
                    format_err!(format!(
                        "node at {} reports chain id {}, {} expects {}",
                        network_manifest.network.rpc_url,
                        chain_id,
                        network.as_str(),
                        expected_chain_id
                    ))
                );
                process::exit(1);
            }
            Err(e) => {
                eprintln!("{}", format_err!(e));
                process::exit(1);
            }
        }
    }

    println!(
        "The following deployment plan will be applied on {}:\n{}\n",
        network.as_str(),
        synthesize(&deployment)
    );

    let (event_tx, event_rx) = channel();
    let (command_tx, command_rx) = channel();

    let handle = std::thread::spawn(move || {
        apply_on_chain_deployment(&backend, &deployment, event_tx, command_rx)
    });

    let _ = command_tx.send(DeploymentCommand::Start);

    loop {
        let event = match event_rx.recv() {
            Ok(event) => event,
            Err(_e) => break,
        };
        match event {
            DeploymentEvent::TransactionUpdate(update) => {
                println!("{} {:?} {}", blue!("➡"), update.status, update.name);
            }
            DeploymentEvent::Interrupted(message) => {
                eprintln!("{} Error publishing transactions: {}", red!("x"), message);
                break;
            }
            DeploymentEvent::DeploymentCompleted => {
                println!(
                    "{} Contracts successfully deployed on {}",
                    green!("✔"),
                    network.as_str()
                );
                break;
            }
        }
    }

    match handle.join() {
        Ok(Ok(results)) => {
            print!("{}", report(&results));
        }
        Ok(Err(e)) => {
            print!("{}", report(e.results()));
            eprintln!("{}", format_err!(e));
            process::exit(1);
        }
        Err(_) => {
            eprintln!("{}", format_err!("deployment worker panicked"));
            process::exit(1);
        }
    }
}
