use super::{Output, field_table, state_color, wait};
use anyhow::Result;
use comfy_table::{Cell, Table};
use deployment_orchestration::{DeploymentManager, PackageInfo};

pub async fn repository(
    manager: &DeploymentManager,
    out: &Output,
    recency: usize,
    user: &str,
) -> Result<()> {
    let packages = manager.list_repository(recency, user).await?;
    out.print(&packages, || {
        let mut table = Table::new();
        table.set_header(vec!["PACKAGE", "VERSIONS"]);
        for package in &packages {
            let versions: Vec<&str> = package
                .latest_versions
                .iter()
                .map(|v| v.version.as_str())
                .collect();
            table.add_row(vec![package.name.clone(), versions.join(", ")]);
        }
        table
    })
}

pub async fn list(manager: &DeploymentManager, out: &Output, user: &str) -> Result<()> {
    let packages = manager.list_packages(user).await?;
    out.print(&packages, || {
        let mut table = Table::new();
        table.set_header(vec!["PACKAGE"]);
        for package in &packages {
            table.add_row(vec![package]);
        }
        table
    })
}

fn info_table(info: &PackageInfo) -> Table {
    let status = info.status.as_str();
    let mut rows = vec![
        ("name", Cell::new(&info.name)),
        ("version", Cell::new(&info.version)),
        ("status", Cell::new(status).fg(state_color(status))),
        ("user", Cell::new(info.user.as_deref().unwrap_or("-"))),
        ("information", Cell::new(info.information.as_deref().unwrap_or("-"))),
    ];
    if let Some(defaults) = &info.defaults {
        let components: Vec<String> = defaults
            .iter()
            .flat_map(|(component_type, components)| {
                components
                    .keys()
                    .map(move |name| format!("{}/{}", component_type, name))
            })
            .collect();
        rows.push(("components", Cell::new(components.join("\n"))));
    }
    field_table(rows)
}

pub async fn info(
    manager: &DeploymentManager,
    out: &Output,
    package: &str,
    user: &str,
) -> Result<()> {
    let info = manager.get_package_info(package, Some(user)).await?;
    out.print(&info, || info_table(&info))
}

async fn report(manager: &DeploymentManager, out: &Output, package: &str) -> Result<()> {
    let info = manager.get_package_info(package, None).await?;
    out.print(&info, || info_table(&info))
}

pub async fn deploy(
    manager: &DeploymentManager,
    out: &Output,
    package: &str,
    user: &str,
) -> Result<()> {
    let task = manager.deploy_package(package, user).await?;
    out.note(&format!("Deploying {}", package));
    let outcome = wait(task).await;
    report(manager, out, package).await?;
    outcome
}

pub async fn undeploy(
    manager: &DeploymentManager,
    out: &Output,
    package: &str,
    user: &str,
) -> Result<()> {
    let task = manager.undeploy_package(package, user).await?;
    out.note(&format!("Undeploying {}", package));
    let outcome = wait(task).await;
    report(manager, out, package).await?;
    outcome
}
