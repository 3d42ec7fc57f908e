use krenet_deployments::types::{DeploymentSpecification, TransactionSpecification};
use krenet_files::{FileLocation, ProjectManifest};

pub fn get_absolute_deployment_path(
    manifest: &ProjectManifest,
    relative_path: &str,
) -> Result<FileLocation, String> {
    let mut deployment_path = manifest.location.get_project_root_location()?;
    deployment_path.append_path(relative_path)?;
    Ok(deployment_path)
}

pub fn load_deployment(
    manifest: &ProjectManifest,
    deployment_plan_location: &FileLocation,
) -> Result<DeploymentSpecification, String> {
    let deployment = DeploymentSpecification::from_config_file(deployment_plan_location)?;
    for spec in deployment.plan.contract_publishes() {
        if !manifest
            .contracts
            .iter()
            .any(|c| c.name == spec.contract_name)
        {
            return Err(format!(
                "{} plans contract '{}', which {} does not declare",
                deployment_plan_location.to_display_string(),
                spec.contract_name,
                manifest.location.to_display_string()
            ));
        }
    }
    Ok(deployment)
}

pub fn write_deployment(
    deployment: &DeploymentSpecification,
    target_location: &FileLocation,
    overwrite: bool,
) -> Result<(), String> {
    if target_location.exists() && !overwrite {
        return Err(format!(
            "unable to overwrite {}",
            target_location.to_display_string()
        ));
    }
    let content = deployment.to_file_content()?;
    target_location.write_content(&content)?;
    Ok(())
}

/// Parses every plan file under `deployments/`. Returns the list of
/// valid plans, or the first parse failure.
pub fn check_deployments(
    manifest: &ProjectManifest,
) -> Result<Vec<(FileLocation, DeploymentSpecification)>, String> {
    let mut deployments_location = manifest.location.get_project_root_location()?;
    deployments_location.append_path("deployments")?;

    let mut checked = vec![];
    if !deployments_location.exists() {
        return Ok(checked);
    }

    let entries = std::fs::read_dir(deployments_location.as_path()).map_err(|e| {
        format!(
            "unable to read {} ({})",
            deployments_location.to_display_string(),
            e
        )
    })?;

    let mut plan_paths: Vec<FileLocation> = entries
        .flatten()
        .map(|entry| FileLocation::from_path(entry.path()))
        .filter(|location| {
            location
                .get_file_name()
                .map(|name| name.ends_with("-plan.yaml"))
                .unwrap_or(false)
        })
        .collect();
    plan_paths.sort();

    for location in plan_paths.into_iter() {
        let deployment = load_deployment(manifest, &location)?;
        checked.push((location, deployment));
    }
    Ok(checked)
}

/// One line per planned contract, in execution order, for display
/// ahead of an apply.
pub fn synthesize(deployment: &DeploymentSpecification) -> String {
    let mut lines = vec![];
    for batch in deployment.plan.batches.iter() {
        for tx in batch.transactions.iter() {
            let TransactionSpecification::ContractPublish(spec) = tx;
            let args: Vec<String> = spec
                .constructor_args
                .iter()
                .map(|arg| arg.to_file_string())
                .collect();
            lines.push(format!(
                "  batch {}: {}({})",
                batch.id,
                spec.contract_name,
                args.join(", ")
            ));
        }
    }
    lines.join("\n")
}
