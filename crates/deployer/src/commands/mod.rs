pub mod applications;
pub mod packages;

use crate::Format;
use anyhow::{Result, anyhow};
use comfy_table::{Cell, Color, Table};
use deployment_orchestration::{DeploymentManager, LifecycleTask};
use serde::Serialize;

/// Prints results in the selected format
pub struct Output {
    format: Format,
}

impl Output {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    /// Print `value` as JSON, or the table built by `table` otherwise
    pub fn print<T: Serialize>(&self, value: &T, table: impl FnOnce() -> Table) -> Result<()> {
        match self.format {
            Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Format::Table => println!("{}", table()),
        }
        Ok(())
    }

    /// Print a one-line progress note, suppressed for JSON output
    pub fn note(&self, message: &str) {
        if self.format == Format::Table {
            println!("{}", message);
        }
    }
}

/// Colour for a lifecycle state name
pub fn state_color(state: &str) -> Color {
    match state {
        "DEPLOYED" | "STARTED" => Color::Green,
        "CREATED" => Color::Cyan,
        "NOTDEPLOYED" | "NOTCREATED" => Color::DarkGrey,
        _ => Color::Yellow,
    }
}

/// Two column table of field names and values
pub fn field_table(rows: Vec<(&str, Cell)>) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["FIELD", "VALUE"]);
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), value]);
    }
    table
}

/// Wait for a lifecycle operation, keeping its error for the caller
pub async fn wait(task: LifecycleTask) -> Result<()> {
    let label = task.label().to_string();
    task.get_result()
        .await
        .map_err(|err| anyhow!("{} failed: {}", label, err))
}

pub async fn environment(manager: &DeploymentManager, out: &Output, user: &str) -> Result<()> {
    let environment = manager.get_environment(user).await?;
    out.print(&environment, || {
        let mut table = Table::new();
        table.set_header(vec!["KEY", "VALUE"]);
        for (key, value) in &environment {
            table.add_row(vec![key, value]);
        }
        table
    })
}
