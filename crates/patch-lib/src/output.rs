//! Terminal output helpers for the binaries

use crate::patch::PatchDocument;
use colored::Colorize;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tabled::{settings::Style, Table, Tabled};

/// One row of the recommended-resources summary
#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct ContainerRow {
    #[tabled(rename = "CONTAINER")]
    pub container: String,
    #[tabled(rename = "CPU REQUEST")]
    pub cpu_request: String,
    #[tabled(rename = "CPU LIMIT")]
    pub cpu_limit: String,
    #[tabled(rename = "MEMORY REQUEST")]
    pub memory_request: String,
    #[tabled(rename = "MEMORY LIMIT")]
    pub memory_limit: String,
}

/// Rows for every container operation in `patch`; unset fields show `-`
pub fn container_rows(patch: &PatchDocument) -> Vec<ContainerRow> {
    patch
        .containers()
        .iter()
        .map(|c| {
            let requests = c.resources.requests.as_ref();
            let limits = c.resources.limits.as_ref();
            ContainerRow {
                container: c.name.clone(),
                cpu_request: cell(requests.and_then(|q| q.cpu.as_ref())),
                cpu_limit: cell(limits.and_then(|q| q.cpu.as_ref())),
                memory_request: cell(requests.and_then(|q| q.memory.as_ref())),
                memory_limit: cell(limits.and_then(|q| q.memory.as_ref())),
            }
        })
        .collect()
}

fn cell(value: Option<&Quantity>) -> String {
    value.map_or_else(|| "-".to_string(), |q| q.0.clone())
}

/// Render the summary table
pub fn summary_table(patch: &PatchDocument) -> String {
    Table::new(container_rows(patch))
        .with(Style::rounded())
        .to_string()
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a unified diff for the terminal
pub fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                line.bold().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else if line.starts_with('-') {
                line.red().to_string()
            } else if line.starts_with("@@") {
                line.cyan().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
