use super::{Output, field_table, state_color, wait};
use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Table};
use deployment_orchestration::{ApplicationInfo, DeploymentManager, LifecycleTask};
use serde_json::{Map, Value};
use std::path::Path;

pub async fn list(
    manager: &DeploymentManager,
    out: &Output,
    package: Option<&str>,
    user: &str,
) -> Result<()> {
    let applications = match package {
        Some(package) => manager.list_package_applications(package, user).await?,
        None => manager.list_applications(user).await?,
    };

    let mut rows = Vec::with_capacity(applications.len());
    for application in &applications {
        rows.push(manager.get_application_info(application, None).await?);
    }
    out.print(&applications, || {
        let mut table = Table::new();
        table.set_header(vec!["APPLICATION", "PACKAGE", "STATUS"]);
        for info in &rows {
            let status = info.status.as_str();
            table.add_row(vec![
                Cell::new(&info.name),
                Cell::new(info.package_name.as_deref().unwrap_or("-")),
                Cell::new(status).fg(state_color(status)),
            ]);
        }
        table
    })
}

fn info_table(info: &ApplicationInfo) -> Table {
    let status = info.status.as_str();
    let owner = info
        .overrides
        .as_ref()
        .and_then(|overrides| overrides.get("user"))
        .and_then(Value::as_str)
        .unwrap_or("-");
    field_table(vec![
        ("name", Cell::new(&info.name)),
        ("package", Cell::new(info.package_name.as_deref().unwrap_or("-"))),
        ("status", Cell::new(status).fg(state_color(status))),
        ("user", Cell::new(owner)),
        ("information", Cell::new(info.information.as_deref().unwrap_or("-"))),
    ])
}

pub async fn info(
    manager: &DeploymentManager,
    out: &Output,
    application: &str,
    user: &str,
) -> Result<()> {
    let info = manager.get_application_info(application, Some(user)).await?;
    out.print(&info, || info_table(&info))
}

pub async fn detail(
    manager: &DeploymentManager,
    out: &Output,
    application: &str,
    user: &str,
) -> Result<()> {
    let detail = manager.get_application_detail(application, user).await?;
    out.print(&detail, || {
        let mut table = Table::new();
        table.set_header(vec!["TYPE", "COMPONENT", "DETAILS"]);
        for component in &detail.components {
            let field = |name: &str| match component.get(name) {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => "-".to_string(),
            };
            table.add_row(vec![field("type"), field("component"), field("details")]);
        }
        table
    })
}

fn read_overrides(path: &Path) -> Result<Map<String, Value>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read overrides from {:?}", path))?;
    match serde_json::from_str::<Value>(&contents)
        .with_context(|| format!("Failed to parse overrides in {:?}", path))?
    {
        Value::Object(overrides) => Ok(overrides),
        _ => bail!("Overrides in {:?} must be a JSON object", path),
    }
}

async fn follow(
    manager: &DeploymentManager,
    out: &Output,
    application: &str,
    task: LifecycleTask,
) -> Result<()> {
    out.note(task.label());
    let outcome = wait(task).await;
    let info = manager.get_application_info(application, None).await?;
    out.print(&info, || info_table(&info))?;
    outcome
}

pub async fn create(
    manager: &DeploymentManager,
    out: &Output,
    package: &str,
    application: &str,
    overrides: Option<&Path>,
    user: &str,
) -> Result<()> {
    let overrides = match overrides {
        Some(path) => read_overrides(path)?,
        None => Map::new(),
    };
    let task = manager
        .create_application(package, application, overrides, user)
        .await?;
    follow(manager, out, application, task).await
}

pub async fn start(
    manager: &DeploymentManager,
    out: &Output,
    application: &str,
    user: &str,
) -> Result<()> {
    let task = manager.start_application(application, user).await?;
    follow(manager, out, application, task).await
}

pub async fn stop(
    manager: &DeploymentManager,
    out: &Output,
    application: &str,
    user: &str,
) -> Result<()> {
    let task = manager.stop_application(application, user).await?;
    follow(manager, out, application, task).await
}

pub async fn delete(
    manager: &DeploymentManager,
    out: &Output,
    application: &str,
    user: &str,
) -> Result<()> {
    let task = manager.delete_application(application, user).await?;
    follow(manager, out, application, task).await
}
