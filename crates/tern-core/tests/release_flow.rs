mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use tern_core::Error;
use tern_core::cluster::{Orchestrator, Resource, ResourceKind};
use tern_core::deadline::{CancelSignal, Deadline};
use tern_core::release::{EnvSnapshot, ReleaseOptions, Releaser, ensure_snapshot};

use support::fakes::{FakeOrchestrator, ScriptedPrompter};
use support::fixtures::{component, descriptor, platform};

fn cluster(env_title: Option<&str>, with_adapter: bool) -> Arc<FakeOrchestrator> {
    let orchestrator = FakeOrchestrator::default();
    let vars = match env_title {
        Some(title) => json!({ "title": title, "region": "eu" }),
        None => json!({ "region": "eu" }),
    };
    orchestrator.seed(Resource::environment("production", vars));
    orchestrator.seed(Resource::virtual_env("kf", "prod", "production", json!({})));
    if with_adapter {
        orchestrator.seed(Resource::http_adapter("kf", "payments", "https://pay.example"));
    }

    let components = BTreeMap::from([(
        "web".to_string(),
        component("abc123f", &["title"], &["payments"]),
    )]);
    let deployment = descriptor("kf", "shop-v1", Some("v1.0.0"), "abc123f", components);
    orchestrator.seed(deployment.to_resource().unwrap());
    Arc::new(orchestrator)
}

fn options() -> ReleaseOptions {
    ReleaseOptions {
        virtual_env: "prod".to_string(),
        create_snapshot: true,
        ..ReleaseOptions::default()
    }
}

#[tokio::test]
async fn declining_problems_aborts_without_changes() {
    let orchestrator = cluster(None, false);
    let prompter = Arc::new(ScriptedPrompter::new(&["n"]));
    let releaser = Releaser::new(orchestrator.clone(), prompter.clone(), "shop");

    let result = releaser.release("shop-v1", &platform(), &options()).await;

    assert!(matches!(result, Err(Error::ReleaseAborted)));
    assert!(orchestrator.mutations().is_empty());
    let said = prompter.said();
    assert_eq!(said.iter().filter(|l| l.starts_with("  - ")).count(), 2);
    assert!(said.iter().any(|l| l.contains("'title'")));
    assert!(said.iter().any(|l| l.contains("'payments'")));
}

#[tokio::test]
async fn dry_run_reports_problems_as_an_error() {
    let orchestrator = cluster(None, false);
    let releaser = Releaser::new(
        orchestrator.clone(),
        Arc::new(ScriptedPrompter::new(&["y"])),
        "shop",
    );
    let opts = ReleaseOptions {
        dry_run: true,
        ..options()
    };

    let result = releaser.release("shop-v1", &platform(), &opts).await;

    match result {
        Err(Error::ValidationProblems(problems)) => assert_eq!(problems.len(), 2),
        other => panic!("expected validation problems, got {other:?}"),
    }
    assert!(orchestrator.mutations().is_empty());
}

#[tokio::test]
async fn release_binds_deployment_and_snapshot() {
    let orchestrator = cluster(Some("Shop"), true);
    orchestrator.seed(Resource::virtual_env(
        "kf",
        "prod",
        "production",
        json!({ "title": "Shop EU" }),
    ));
    let prompter = Arc::new(ScriptedPrompter::new(&[]));
    let releaser = Releaser::new(orchestrator.clone(), prompter.clone(), "shop");

    let binding = releaser
        .release("shop-v1", &platform(), &options())
        .await
        .unwrap();

    assert_eq!(binding.deployment_name, "shop-v1");
    assert_eq!(binding.deployment_version.as_deref(), Some("v1.0.0"));
    let snapshot_name = binding.snapshot_name.clone().unwrap();
    assert!(snapshot_name.starts_with("prod-"));
    assert_eq!(prompter.prompt_count(), 0);

    let venv = orchestrator
        .object(ResourceKind::VirtualEnv, Some("kf"), "prod")
        .unwrap();
    let spec = &venv.fields["spec"];
    assert_eq!(spec["environment"], "production");
    assert_eq!(spec["release"]["appDeployment"]["name"], "shop-v1");
    assert_eq!(spec["release"]["appDeployment"]["version"], "v1.0.0");
    assert_eq!(spec["release"]["virtualEnvSnapshot"], snapshot_name.as_str());
    assert_eq!(venv.fields["data"]["vars"]["title"], "Shop EU");

    let snapshot = orchestrator
        .object(ResourceKind::VirtualEnvSnapshot, Some("kf"), &snapshot_name)
        .unwrap();
    assert_eq!(snapshot.fields["data"]["vars"]["title"], "Shop EU");
    assert_eq!(snapshot.fields["data"]["vars"]["region"], "eu");
}

#[tokio::test]
async fn accepted_problems_still_release() {
    let orchestrator = cluster(None, false);
    let releaser = Releaser::new(
        orchestrator.clone(),
        Arc::new(ScriptedPrompter::new(&["y"])),
        "shop",
    );
    let opts = ReleaseOptions {
        create_snapshot: false,
        ..options()
    };

    let binding = releaser.release("shop-v1", &platform(), &opts).await.unwrap();

    assert_eq!(binding.snapshot_name, None);
    assert_eq!(orchestrator.mutations(), vec!["update VirtualEnv kf/prod".to_string()]);
}

#[tokio::test]
async fn named_snapshot_supplies_the_data() {
    let orchestrator = cluster(None, true);
    orchestrator.seed(Resource::virtual_env_snapshot(
        "kf",
        "prod-frozen",
        json!({"kind": "VirtualEnv", "name": "prod", "resourceVersion": "1", "dataChecksum": "x"}),
        json!({ "vars": { "title": "Frozen" } }),
    ));
    let releaser = Releaser::new(orchestrator.clone(), Arc::new(ScriptedPrompter::new(&[])), "shop");
    let opts = ReleaseOptions {
        snapshot: Some("prod-frozen".to_string()),
        ..options()
    };

    let binding = releaser.release("shop-v1", &platform(), &opts).await.unwrap();

    assert_eq!(binding.snapshot_name.as_deref(), Some("prod-frozen"));
    assert_eq!(orchestrator.all(ResourceKind::VirtualEnvSnapshot).len(), 1);
}

#[tokio::test]
async fn repeated_snapshot_requests_reuse_one_snapshot() {
    let orchestrator = cluster(Some("Shop"), true);
    let dyn_orchestrator: Arc<dyn Orchestrator> = orchestrator.clone();
    let venv = orchestrator
        .object(ResourceKind::VirtualEnv, Some("kf"), "prod")
        .unwrap();
    let deadline = Deadline::after(Duration::from_secs(5), CancelSignal::never());

    let snapshot = EnvSnapshot::of_virtual_env(&venv, json!({ "vars": { "title": "Shop" } })).unwrap();
    let first = ensure_snapshot(&dyn_orchestrator, "kf", &snapshot, false, &deadline)
        .await
        .unwrap();
    let again = EnvSnapshot::of_virtual_env(&venv, json!({ "vars": { "title": "Shop" } })).unwrap();
    let second = ensure_snapshot(&dyn_orchestrator, "kf", &again, false, &deadline)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(orchestrator.all(ResourceKind::VirtualEnvSnapshot).len(), 1);
    assert_eq!(
        orchestrator
            .mutations()
            .iter()
            .filter(|m| m.starts_with("create VirtualEnvSnapshot"))
            .count(),
        1
    );
}

#[tokio::test]
async fn releasing_twice_with_unchanged_data_reuses_the_snapshot() {
    let orchestrator = cluster(Some("Shop"), true);
    let releaser = Releaser::new(orchestrator.clone(), Arc::new(ScriptedPrompter::new(&[])), "shop");

    let first = releaser
        .release("shop-v1", &platform(), &options())
        .await
        .unwrap();
    let second = releaser
        .release("shop-v1", &platform(), &options())
        .await
        .unwrap();

    assert!(first.snapshot_name.is_some());
    assert_eq!(first.snapshot_name, second.snapshot_name);
    assert_eq!(orchestrator.all(ResourceKind::VirtualEnvSnapshot).len(), 1);
    let mutations = orchestrator.mutations();
    assert_eq!(
        mutations
            .iter()
            .filter(|m| m.starts_with("create VirtualEnvSnapshot"))
            .count(),
        1
    );
    assert_eq!(
        mutations
            .iter()
            .filter(|m| m.as_str() == "update VirtualEnv kf/prod")
            .count(),
        2
    );
}

#[tokio::test]
async fn slow_confirmation_does_not_eat_the_network_budget() {
    let orchestrator = cluster(None, false);
    let prompter = ScriptedPrompter::new(&["y"]).with_delay(Duration::from_millis(400));
    let releaser = Releaser::new(orchestrator.clone(), Arc::new(prompter), "shop")
        .with_network_timeout(Duration::from_millis(250));
    let opts = ReleaseOptions {
        create_snapshot: false,
        ..options()
    };

    let binding = releaser.release("shop-v1", &platform(), &opts).await.unwrap();

    assert_eq!(binding.deployment_name, "shop-v1");
    assert_eq!(orchestrator.mutations(), vec!["update VirtualEnv kf/prod".to_string()]);
}

#[tokio::test]
async fn adapters_are_looked_up_next_to_the_deployment() {
    let orchestrator = FakeOrchestrator::default();
    orchestrator.seed(Resource::environment("production", json!({ "title": "Shop" })));
    orchestrator.seed(Resource::virtual_env("kf", "prod", "production", json!({})));
    orchestrator.seed(Resource::http_adapter("apps", "payments", "https://pay.example"));
    let components = BTreeMap::from([(
        "web".to_string(),
        component("abc123f", &["title"], &["payments"]),
    )]);
    let deployment = descriptor("apps", "shop-v1", Some("v1.0.0"), "abc123f", components);
    orchestrator.seed(deployment.to_resource().unwrap());
    let orchestrator = Arc::new(orchestrator);
    let prompter = Arc::new(ScriptedPrompter::new(&[]));
    let releaser = Releaser::new(orchestrator.clone(), prompter.clone(), "shop");
    let opts = ReleaseOptions {
        create_snapshot: false,
        ..options()
    };

    let binding = releaser.release("v1.0.0", &platform(), &opts).await.unwrap();

    assert_eq!(binding.deployment_name, "shop-v1");
    assert_eq!(prompter.prompt_count(), 0);
}
