//! rightsize-patch
//!
//! Fetches the CAST AI recommendation for one workload and prints it as a
//! Kubernetes strategic-merge patch, ready for `kubectl patch` or for
//! committing next to the manifest.

use anyhow::Result;
use clap::Parser;
use patch_lib::{
    init_tracing,
    output::{print_error, print_success, summary_table},
    patch::{build_patch, PatchDocument},
    CastAiClient, PipelineError, RecommendationSource, Settings, WorkloadRef,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Generate a resource patch from CAST AI workload recommendations
#[derive(Parser)]
#[command(name = "rightsize-patch")]
#[command(author, version, about = "Generate Kubernetes resource patches from CAST AI recommendations", long_about = None)]
pub struct Cli {
    /// CAST AI cluster ID
    #[arg(long)]
    pub cluster_id: String,

    /// CAST AI API key
    #[arg(long)]
    pub api_key: String,

    /// Workload name
    #[arg(long)]
    pub name: String,

    /// Workload namespace
    #[arg(long, default_value = "default")]
    pub namespace: String,

    /// Only patch this container
    #[arg(long)]
    pub container: Option<String>,

    /// Write the patch here instead of stdout
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Pretty-print the patch JSON
    #[arg(long)]
    pub pretty: bool,

    /// API endpoint URL
    #[arg(long, env = "CASTAI_API_URL")]
    pub api_url: Option<String>,

    /// Print a table of the recommended values to stderr
    #[arg(long)]
    pub summary: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load()?;
    init_tracing("warn", settings.log_format());

    match generate(&cli, &settings).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            print_error(&err.report());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn generate(cli: &Cli, settings: &Settings) -> Result<(), PipelineError> {
    let api_url = cli.api_url.as_deref().unwrap_or(&settings.api_url);
    let client = CastAiClient::new(api_url, cli.api_key.as_str())?;

    let workload = WorkloadRef::new(&cli.cluster_id, &cli.namespace, &cli.name)
        .with_container(cli.container.clone());
    let recommendation = client.fetch_recommendation(&workload).await?;
    let patch = build_patch(&recommendation, workload.container.as_deref())?;

    emit(cli, &patch)?;
    if cli.summary {
        eprintln!("{}", summary_table(&patch));
    }
    Ok(())
}

fn emit(cli: &Cli, patch: &PatchDocument) -> Result<(), PipelineError> {
    let json = patch.to_json(cli.pretty)?;
    match &cli.output_file {
        Some(path) => {
            std::fs::write(path, format!("{json}\n")).map_err(|e| {
                PipelineError::io(format!("failed to write {}", path.display()), e)
            })?;
            print_success(&format!("Patch written to {}", path.display()));
        }
        None => println!("{json}"),
    }
    Ok(())
}
