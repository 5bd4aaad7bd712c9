//! Lifecycle scenarios against the deployment manager
//!
//! Every test runs the real manager, dispatcher and registrar with a
//! filesystem repository and a scripted component creator.

mod common;

use common::{
    APPLICATION_CALLBACK, ComponentSpec, Fixtures, PACKAGE_CALLBACK, PanickingWebhook,
    RejectingCreator, TestDeployer, UndeletableRegistrar, build_package,
};
use deployment_orchestration::{
    ErrorKind, GrantRule, LocalAuthorizer, StaticUserDirectory,
};
use deployment_registry::{ApplicationState, PackageState};
use serde_json::{Map, json};
use std::sync::Arc;

fn users() -> StaticUserDirectory {
    StaticUserDirectory::new()
        .with_user("bob", &["users"])
        .with_user("carol", &["users"])
        .with_user("hdfs", &["hdfs"])
}

fn overrides(user: &str) -> Map<String, serde_json::Value> {
    let mut overrides = Map::new();
    overrides.insert("user".into(), json!(user));
    overrides
}

#[smol_potat::test]
async fn test_deploy_reports_deployed_with_defaults() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");

    deployer.deploy("hello-1.0.0", "bob").await;

    let info = deployer
        .manager
        .get_package_info("hello-1.0.0", Some("bob"))
        .await
        .unwrap();
    assert_eq!(info.status, PackageState::Deployed);
    assert_eq!(info.name, "hello");
    assert_eq!(info.version, "1.0.0");
    assert_eq!(info.user.as_deref(), Some("bob"));
    assert!(info
        .information
        .as_deref()
        .unwrap()
        .starts_with("Deployed hello-1.0.0 at "));

    let defaults = info.defaults.unwrap();
    assert_eq!(defaults["scripted"]["ingest"]["input"], json!("/data/in"));
    assert_eq!(
        deployer.manager.list_packages("bob").await.unwrap(),
        vec!["hello-1.0.0"]
    );
}

#[smol_potat::test]
async fn test_back_to_back_deploys_conflict() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");

    let first = deployer
        .manager
        .deploy_package("hello-1.0.0", "bob")
        .await
        .unwrap();
    let err = deployer
        .manager
        .deploy_package("hello-1.0.0", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingState);

    first.get_result().await.unwrap();
}

#[smol_potat::test]
async fn test_deploy_fires_webhook_at_start_and_end() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");

    deployer.deploy("hello-1.0.0", "bob").await;

    let events = deployer.webhook.events_for(PACKAGE_CALLBACK);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].state, "DEPLOYING");
    assert_eq!(events[1].state, "DEPLOYED");
    assert!(events[1].information.is_some());
    assert!(deployer.webhook.events_for(APPLICATION_CALLBACK).is_empty());
}

#[smol_potat::test]
async fn test_missing_artifact_records_failed_deploy() {
    let deployer = TestDeployer::new(users());

    let task = deployer
        .manager
        .deploy_package("ghost-1.0.0", "bob")
        .await
        .unwrap();
    let err = task.get_result().await.unwrap_err();
    assert_eq!(err.task_error().unwrap().kind(), ErrorKind::NotFound);

    let info = deployer
        .manager
        .get_package_info("ghost-1.0.0", None)
        .await
        .unwrap();
    assert_eq!(info.status, PackageState::NotDeployed);
    assert!(info
        .information
        .unwrap()
        .starts_with("Error deploying ghost-1.0.0 NotFound, details: "));
    assert_eq!(deployer.manager.context().progress.in_flight().await, 0);
}

#[smol_potat::test]
async fn test_invalid_package_fails_validation() {
    let deployer = TestDeployer::new(users());
    build_package(
        &deployer.repository,
        "broken-1.0.0",
        &[ComponentSpec {
            component_type: "scripted",
            name: "ingest",
            files: &[("job.py", "print('hi')")],
        }],
    );

    let err = deployer
        .manager
        .deploy_package("broken-1.0.0", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap_err();
    assert_eq!(err.task_error().unwrap().kind(), ErrorKind::FailedValidation);

    let info = deployer
        .manager
        .get_package_info("broken-1.0.0", None)
        .await
        .unwrap();
    assert_eq!(info.status, PackageState::NotDeployed);
    assert!(info.information.unwrap().contains("missing file run.sh"));
}

#[smol_potat::test]
async fn test_undeploy_removes_package() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;

    deployer
        .manager
        .undeploy_package("hello-1.0.0", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();

    let info = deployer
        .manager
        .get_package_info("hello-1.0.0", None)
        .await
        .unwrap();
    assert_eq!(info.status, PackageState::NotDeployed);
    assert_eq!(info.information, None);
    assert!(deployer.manager.list_packages("bob").await.unwrap().is_empty());

    let err = deployer
        .manager
        .undeploy_package("hello-1.0.0", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[smol_potat::test]
async fn test_create_with_missing_user_records_failure() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;

    let task = deployer
        .manager
        .create_application("hello-1.0.0", "app1", overrides("alice"), "bob")
        .await
        .unwrap();
    let err = task.get_result().await.unwrap_err();
    let err = err.task_error().unwrap();
    assert_eq!(err.kind(), ErrorKind::FailedCreation);
    assert!(err.to_string().contains("alice does not exist"));

    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::NotCreated);
    let information = info.information.unwrap();
    assert!(information.starts_with("Error creating app1 FailedCreation, details: "));
    assert!(information.contains("alice does not exist"));
    assert!(deployer.manager.list_applications("bob").await.unwrap().is_empty());
}

#[smol_potat::test]
async fn test_create_requires_deployed_package() {
    let deployer = TestDeployer::new(users());

    let err = deployer
        .manager
        .create_application("hello-1.0.0", "app1", overrides("bob"), "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), r#"{"status":"NOTDEPLOYED"}"#);
}

#[smol_potat::test]
async fn test_lifecycle_replays_create_data() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;

    deployer
        .manager
        .create_application("hello-1.0.0", "app1", Map::new(), "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();

    let info = deployer
        .manager
        .get_application_info("app1", Some("bob"))
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::Created);
    assert_eq!(info.package_name.as_deref(), Some("hello-1.0.0"));
    assert_eq!(info.overrides.unwrap()["user"], json!("bob"));

    for operation in ["start", "stop", "delete"] {
        let task = match operation {
            "start" => deployer.manager.start_application("app1", "bob").await,
            "stop" => deployer.manager.stop_application("app1", "bob").await,
            _ => deployer.manager.delete_application("app1", "bob").await,
        };
        task.unwrap().get_result().await.unwrap();
    }

    let calls = deployer.creator.calls();
    let hooks: Vec<_> = calls.iter().map(|call| call.hook).collect();
    assert_eq!(hooks, vec!["create", "start", "stop", "destroy"]);

    let created = &calls[0].create_data;
    assert_eq!(created["handle"], json!("app1-ingest"));
    assert_eq!(created["script"], json!("echo $component_input"));
    assert_eq!(created["input"], json!("/data/in"));
    for call in &calls[1..] {
        assert_eq!(call.application, "app1");
        assert_eq!(call.create_data["handle"], created["handle"]);
        assert_eq!(call.create_data["script"], created["script"]);
        assert_eq!(call.create_data["component_name"], json!("ingest"));
        assert_eq!(call.create_data["component_job_name"], json!("app1-ingest-job"));
    }

    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::NotCreated);
    assert_eq!(info.package_name, None);
}

#[smol_potat::test]
async fn test_start_requires_created() {
    let deployer = TestDeployer::new(users());

    let err = deployer
        .manager
        .start_application("nothing", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;
    deployer
        .started_application("hello-1.0.0", "app1", "bob")
        .await;

    let err = deployer
        .manager
        .start_application("app1", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingState);
    assert_eq!(err.to_string(), r#"{"status":"STARTED"}"#);
}

#[smol_potat::test]
async fn test_failed_start_reverts_to_created() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;
    deployer
        .manager
        .create_application("hello-1.0.0", "app1", overrides("bob"), "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();

    deployer.creator.fail_start(true);
    let err = deployer
        .manager
        .start_application("app1", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap_err();
    assert_eq!(err.task_error().unwrap().kind(), ErrorKind::FailedConnection);

    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::Created);
    assert_eq!(
        info.information.as_deref(),
        Some(r#"Error starting app1 FailedConnection, details: "scheduler unreachable""#)
    );
}

#[smol_potat::test]
async fn test_failed_destroy_keeps_started_record() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;
    deployer
        .started_application("hello-1.0.0", "app1", "bob")
        .await;

    deployer.creator.fail_destroy(true);
    let err = deployer
        .manager
        .delete_application("app1", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap_err();
    assert_eq!(err.task_error().unwrap().kind(), ErrorKind::FailedCreation);

    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::Started);
    assert!(info
        .information
        .unwrap()
        .starts_with("Error deleting app1 FailedCreation"));
    assert!(deployer
        .manager
        .context()
        .applications
        .application_has_record("app1")
        .await
        .unwrap());
    assert_eq!(
        deployer.manager.list_applications("bob").await.unwrap(),
        vec!["app1"]
    );
}

#[smol_potat::test]
async fn test_concurrent_creates_admit_one() {
    let deployer = TestDeployer::new(users());
    deployer.publish("p-1.0.0");
    deployer.deploy("p-1.0.0", "bob").await;

    let (first, second) = futures::join!(
        deployer
            .manager
            .create_application("p-1.0.0", "app2", overrides("bob"), "bob"),
        deployer
            .manager
            .create_application("p-1.0.0", "app2", overrides("bob"), "bob"),
    );

    let (admitted, rejected): (Vec<_>, Vec<_>) =
        [first, second].into_iter().partition(|result| result.is_ok());
    assert_eq!(admitted.len(), 1);
    assert_eq!(rejected.len(), 1);
    for result in rejected {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConflictingState);
    }
    for result in admitted {
        result.unwrap().get_result().await.unwrap();
    }

    assert_eq!(
        deployer.manager.list_package_applications("p-1.0.0", "bob").await.unwrap(),
        vec!["app2"]
    );
}

#[smol_potat::test]
async fn test_transitional_state_is_visible_and_blocks() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;
    deployer
        .manager
        .create_application("hello-1.0.0", "app1", overrides("bob"), "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();

    let release = deployer.creator.hold_starts();
    let task = deployer
        .manager
        .start_application("app1", "bob")
        .await
        .unwrap();

    let first = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    let second = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(first.status, ApplicationState::Starting);
    assert_eq!(first, second);

    let err = deployer
        .manager
        .delete_application("app1", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingState);
    assert_eq!(err.to_string(), r#"{"status":"STARTING"}"#);

    drop(release);
    task.get_result().await.unwrap();
    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::Started);

    let states: Vec<_> = deployer
        .webhook
        .events_for(APPLICATION_CALLBACK)
        .into_iter()
        .map(|event| event.state)
        .collect();
    assert_eq!(states, vec!["CREATING", "CREATED", "STARTING", "STARTED"]);
}

#[smol_potat::test]
async fn test_application_detail() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;

    let err = deployer
        .manager
        .get_application_detail("app1", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    deployer
        .started_application("hello-1.0.0", "app1", "bob")
        .await;
    let detail = deployer
        .manager
        .get_application_detail("app1", "bob")
        .await
        .unwrap();
    assert_eq!(detail.name, "app1");
    assert_eq!(detail.status, ApplicationState::Started);
    assert_eq!(detail.components.len(), 1);
    assert_eq!(detail.components[0]["type"], json!("scripted"));
    assert_eq!(detail.components[0]["component"], json!("ingest"));
    assert_eq!(
        detail.components[0]["details"]["job_name"],
        json!("app1-ingest-job")
    );
}

#[smol_potat::test]
async fn test_repository_and_environment() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.publish("hello-1.1.0");
    deployer.publish("other-2.0.0");

    let listing = deployer.manager.list_repository(1, "bob").await.unwrap();
    let hello = listing.iter().find(|p| p.name == "hello").unwrap();
    assert_eq!(hello.latest_versions.len(), 1);
    assert_eq!(hello.latest_versions[0].version, "1.1.0");
    assert!(listing.iter().any(|p| p.name == "other"));

    let environment = deployer.manager.get_environment("bob").await.unwrap();
    assert_eq!(environment["queue"], "default");
}

#[smol_potat::test]
async fn test_local_rules_guard_owned_resources() {
    let authorizer = Arc::new(LocalAuthorizer::new(LocalAuthorizer::default_rules()).unwrap());
    let deployer = TestDeployer::with_authorizer(users(), Some(authorizer));
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;

    let err = deployer
        .manager
        .undeploy_package("hello-1.0.0", "carol")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(
        err.to_string(),
        r#"User "carol" does not have authorization for "deployment_manager:package:undeploy""#
    );

    let err = deployer.manager.list_packages("mallory").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(err.to_string(), r#"Failed to find details for user "mallory""#);

    assert!(deployer
        .manager
        .get_package_info("hello-1.0.0", Some("carol"))
        .await
        .is_ok());

    deployer
        .manager
        .undeploy_package("hello-1.0.0", "hdfs")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();
}

#[smol_potat::test]
async fn test_configured_rules_restrict_deploy() {
    let rules = vec![GrantRule {
        users: vec!["bob".to_string()],
        actions: vec!["*".to_string()],
        ..Default::default()
    }];
    let authorizer = Arc::new(LocalAuthorizer::new(rules).unwrap());
    let deployer = TestDeployer::with_authorizer(users(), Some(authorizer));
    deployer.publish("hello-1.0.0");

    let err = deployer
        .manager
        .deploy_package("hello-1.0.0", "carol")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let info = deployer
        .manager
        .get_package_info("hello-1.0.0", None)
        .await
        .unwrap();
    assert_eq!(info.status, PackageState::NotDeployed);
    assert_eq!(deployer.manager.context().progress.in_flight().await, 0);
}

#[smol_potat::test]
async fn test_package_name_cannot_leave_repository() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");

    let err = deployer
        .manager
        .deploy_package("../repository/hello-1.0.0", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedValidation);
    assert_eq!(deployer.manager.context().progress.in_flight().await, 0);
}

#[smol_potat::test]
async fn test_failed_undeploy_keeps_package_deployed() {
    let deployer = TestDeployer::with_fixtures(
        users(),
        Fixtures {
            packages: Some(Arc::new(UndeletableRegistrar::default())),
            ..Default::default()
        },
    );
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;

    let err = deployer
        .manager
        .undeploy_package("hello-1.0.0", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap_err();
    assert_eq!(err.task_error().unwrap().kind(), ErrorKind::FailedCreation);

    let info = deployer
        .manager
        .get_package_info("hello-1.0.0", None)
        .await
        .unwrap();
    assert_eq!(info.status, PackageState::Deployed);
    let information = info.information.unwrap();
    assert!(information.starts_with("Error undeploying hello-1.0.0 FailedCreation, details: "));
    assert!(information.contains("artifact store is read-only"));
    assert_eq!(deployer.manager.list_packages("bob").await.unwrap(), vec!["hello-1.0.0"]);
    assert_eq!(deployer.manager.context().progress.in_flight().await, 0);
}

#[smol_potat::test]
async fn test_failed_stop_reverts_to_started() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;
    deployer
        .started_application("hello-1.0.0", "app1", "bob")
        .await;

    deployer.creator.fail_stop(true);
    let err = deployer
        .manager
        .stop_application("app1", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap_err();
    assert_eq!(err.task_error().unwrap().kind(), ErrorKind::FailedCreation);

    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::Started);
    assert_eq!(
        info.information.as_deref(),
        Some(r#"Error stopping app1 FailedCreation, details: "scheduler refused to suspend the job""#)
    );

    deployer.creator.fail_stop(false);
    deployer
        .manager
        .stop_application("app1", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();
    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::Created);
}

#[smol_potat::test]
async fn test_failing_second_type_leaves_first_created() {
    let warehouse = Arc::new(RejectingCreator::default());
    let deployer = TestDeployer::with_fixtures(
        users(),
        Fixtures {
            creators: vec![warehouse.clone()],
            ..Default::default()
        },
    );
    build_package(
        &deployer.repository,
        "mixed-1.0.0",
        &[
            ComponentSpec {
                component_type: "scripted",
                name: "ingest",
                files: &[("run.sh", "echo ingest")],
            },
            ComponentSpec {
                component_type: "warehouse",
                name: "tables",
                files: &[("properties.json", r#"{"schema": "raw"}"#)],
            },
        ],
    );
    deployer.deploy("mixed-1.0.0", "bob").await;

    let err = deployer
        .manager
        .create_application("mixed-1.0.0", "app1", overrides("bob"), "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap_err();
    assert_eq!(err.task_error().unwrap().kind(), ErrorKind::FailedCreation);

    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::NotCreated);
    assert_eq!(
        info.information.as_deref(),
        Some(r#"Error creating app1 FailedCreation, details: "warehouse quota exceeded""#)
    );

    // The scripted component stays provisioned
    let hooks: Vec<_> = deployer
        .creator
        .calls()
        .into_iter()
        .map(|call| (call.hook, call.application))
        .collect();
    assert_eq!(hooks, vec![("create", "app1".to_string())]);
    assert_eq!(warehouse.attempts(), 1);
    assert!(deployer.manager.list_applications("bob").await.unwrap().is_empty());
}

#[smol_potat::test]
async fn test_panicking_webhook_does_not_wedge_deploy() {
    let deployer = TestDeployer::with_fixtures(
        users(),
        Fixtures {
            webhook: Some(Arc::new(PanickingWebhook)),
            ..Default::default()
        },
    );
    deployer.publish("hello-1.0.0");

    deployer.deploy("hello-1.0.0", "bob").await;

    let info = deployer
        .manager
        .get_package_info("hello-1.0.0", None)
        .await
        .unwrap();
    assert_eq!(info.status, PackageState::Deployed);
    assert_eq!(deployer.manager.context().progress.in_flight().await, 0);

    deployer
        .manager
        .undeploy_package("hello-1.0.0", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();
}

#[smol_potat::test]
async fn test_http_callbacks_work_without_tokio_runtime() {
    let deployer = TestDeployer::with_fixtures(
        users(),
        Fixtures {
            http_callbacks: true,
            ..Default::default()
        },
    );
    deployer.publish("hello-1.0.0");

    deployer.deploy("hello-1.0.0", "bob").await;

    let info = deployer
        .manager
        .get_package_info("hello-1.0.0", None)
        .await
        .unwrap();
    assert_eq!(info.status, PackageState::Deployed);
    assert_eq!(deployer.manager.context().progress.in_flight().await, 0);
    let err = deployer
        .manager
        .deploy_package("hello-1.0.0", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), r#"{"status":"DEPLOYED"}"#);
}

#[smol_potat::test]
async fn test_panicking_start_records_failure() {
    let deployer = TestDeployer::new(users());
    deployer.publish("hello-1.0.0");
    deployer.deploy("hello-1.0.0", "bob").await;
    deployer
        .manager
        .create_application("hello-1.0.0", "app1", overrides("bob"), "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();

    deployer.creator.panic_start(true);
    let err = deployer
        .manager
        .start_application("app1", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap_err();
    assert_eq!(err.task_error().unwrap().kind(), ErrorKind::FailedCreation);

    let info = deployer
        .manager
        .get_application_info("app1", None)
        .await
        .unwrap();
    assert_eq!(info.status, ApplicationState::Created);
    assert_eq!(
        info.information.as_deref(),
        Some(r#"Error starting app1 FailedCreation, details: "Unexpected failure: engine client bug""#)
    );

    deployer.creator.panic_start(false);
    deployer
        .manager
        .start_application("app1", "bob")
        .await
        .unwrap()
        .get_result()
        .await
        .unwrap();
}
