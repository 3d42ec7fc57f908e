use krenet_deployments::types::{
    ConstructorArg, ContractPublishSpecification, DeploymentSpecification,
    TransactionSpecification,
};
use krenet_deployments::{build_plan, order_contracts, PlanningError};
use krenet_files::FileLocation;

fn publish(
    contract_name: &str,
    constructor_args: &[&str],
    depends_on: &[&str],
) -> ContractPublishSpecification {
    let constructor_args: Vec<String> =
        constructor_args.iter().map(|a| a.to_string()).collect();
    let depends_on: Vec<String> = depends_on.iter().map(|d| d.to_string()).collect();
    ContractPublishSpecification::new(contract_name, "deployer", &constructor_args, &depends_on)
        .unwrap()
}

fn batch_names(batches: &[Vec<ContractPublishSpecification>]) -> Vec<Vec<&str>> {
    batches
        .iter()
        .map(|batch| batch.iter().map(|c| c.contract_name.as_str()).collect())
        .collect()
}

#[test]
fn dependencies_are_ordered_before_their_referrers() {
    let batches = order_contracts(vec![
        publish("GoodsStore", &["${KREToken.address}"], &[]),
        publish("KREToken", &["${MockUSDC.address}", "1000000000000"], &[]),
        publish("MockUSDC", &["1000000000000"], &[]),
    ])
    .unwrap();

    assert_eq!(
        batch_names(&batches),
        vec![vec!["MockUSDC"], vec!["KREToken"], vec!["GoodsStore"]]
    );
}

#[test]
fn independent_contracts_keep_declaration_order() {
    let batches = order_contracts(vec![
        publish("Kreator", &[], &[]),
        publish("MockUSDC", &[], &[]),
        publish("Aardvark", &[], &[]),
        publish("KREToken", &["${MockUSDC.address}"], &[]),
    ])
    .unwrap();

    // Depth 0 holds the three independent contracts, as declared, not
    // alphabetized.
    assert_eq!(
        batch_names(&batches),
        vec![vec!["Kreator", "MockUSDC", "Aardvark"], vec!["KREToken"]]
    );
}

#[test]
fn explicit_depends_on_shapes_the_plan() {
    let batches = order_contracts(vec![
        publish("GoodsStore", &[], &["Kreator"]),
        publish("Kreator", &[], &[]),
    ])
    .unwrap();

    assert_eq!(batch_names(&batches), vec![vec!["Kreator"], vec!["GoodsStore"]]);
}

#[test]
fn cycles_are_rejected() {
    let err = order_contracts(vec![
        publish("A", &["${B.address}"], &[]),
        publish("B", &["${C.address}"], &[]),
        publish("C", &["${A.address}"], &[]),
    ])
    .unwrap_err();

    match err {
        PlanningError::Cycle(mut names) => {
            names.sort();
            assert_eq!(names, vec!["A", "B", "C"]);
        }
        other => panic!("expected a cycle error, got {:?}", other),
    }
}

#[test]
fn self_reference_is_a_cycle() {
    let err = order_contracts(vec![publish("A", &["${A.address}"], &[])]).unwrap_err();
    assert_eq!(err, PlanningError::Cycle(vec!["A".to_string()]));
}

#[test]
fn unknown_references_are_rejected() {
    let err = order_contracts(vec![
        publish("MockUSDC", &[], &[]),
        publish("KREToken", &["${Treasury.address}"], &[]),
    ])
    .unwrap_err();

    assert_eq!(
        err,
        PlanningError::UnknownReference {
            contract: "KREToken".to_string(),
            reference: "Treasury".to_string(),
        }
    );
}

#[test]
fn duplicate_contracts_are_rejected() {
    let err = order_contracts(vec![
        publish("MockUSDC", &[], &[]),
        publish("MockUSDC", &[], &[]),
    ])
    .unwrap_err();

    assert_eq!(err, PlanningError::DuplicateContract("MockUSDC".to_string()));
}

#[test]
fn plans_are_deterministic() {
    let contracts = || {
        vec![
            publish("Kreator", &[], &[]),
            publish("MockUSDC", &["1000000000000"], &[]),
            publish("KREToken", &["${MockUSDC.address}"], &[]),
            publish("GoodsStore", &["${KREToken.address}"], &["Kreator"]),
        ]
    };

    let first = build_plan(contracts()).unwrap();
    let second = build_plan(contracts()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.batches.len(), 3);
    assert_eq!(first.batches[0].id, 0);
    assert_eq!(first.batches[2].id, 2);
}

#[test]
fn plan_files_round_trip_through_yaml() {
    let plan = build_plan(vec![
        publish("MockUSDC", &["1000000000000"], &[]),
        publish(
            "KREToken",
            &["0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1", "${MockUSDC.address}"],
            &[],
        ),
    ])
    .unwrap();
    let deployment = DeploymentSpecification {
        id: 0,
        name: "devnet deployment".to_string(),
        network: krenet_files::EvmNetwork::Devnet,
        evm_node: Some("http://localhost:8545".to_string()),
        plan,
    };

    let yaml = String::from_utf8(deployment.to_file_content().unwrap()).unwrap();
    assert!(yaml.contains("contract-name: KREToken"));
    assert!(yaml.contains("${MockUSDC.address}"));

    let mut plan_location = FileLocation::from_path(std::env::temp_dir());
    plan_location
        .append_path("krenet-plan-round-trip/default.devnet-plan.yaml")
        .unwrap();
    plan_location.write_content(yaml.as_bytes()).unwrap();

    let reparsed = DeploymentSpecification::from_config_file(&plan_location).unwrap();
    assert_eq!(reparsed, deployment);

    let TransactionSpecification::ContractPublish(ref token) =
        reparsed.plan.batches[1].transactions[0];
    assert_eq!(
        token.constructor_args[1],
        ConstructorArg::ContractRef("MockUSDC".to_string())
    );
}

#[test]
fn missing_plan_file_is_reported() {
    let mut plan_location = FileLocation::from_path(std::env::temp_dir());
    plan_location
        .append_path("krenet-plan-round-trip/no-such-plan.yaml")
        .unwrap();

    let err = DeploymentSpecification::from_config_file(&plan_location).unwrap_err();
    assert!(err.contains("unable to read file"));
}
