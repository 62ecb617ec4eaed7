//! rightsize-pr
//!
//! Fetches the CAST AI recommendation for a workload, applies it to the
//! workload manifest in a git checkout, and opens a pull request with the
//! change. On any failure after the work branch exists, the checkout is
//! returned to the ref it started on.

use clap::Parser;
use patch_lib::{
    git::{GitHubToken, RemoteCredentials},
    init_tracing,
    output::{colorize_diff, print_error, print_info, print_success, print_warning, summary_table},
    process::TokioCommandRunner,
    publisher::PublishOutcome,
    CastAiClient, Pipeline, PipelineError, PipelineLogger, PipelineReport, PipelineRequest,
    RunOutcome, Settings, WorkloadRef,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Open a pull request applying CAST AI resource recommendations
#[derive(Parser, Debug)]
#[command(name = "rightsize-pr")]
#[command(author, version, about = "Open pull requests that apply CAST AI resource recommendations", long_about = None)]
struct Cli {
    /// CAST AI cluster ID
    #[arg(long)]
    cluster_id: String,

    /// CAST AI API key
    #[arg(long)]
    api_key: String,

    /// Workload name
    #[arg(long)]
    workload: String,

    /// Workload namespace
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Path to the git checkout holding the manifest
    #[arg(long, default_value = ".")]
    repo_path: PathBuf,

    /// Manifest to patch, relative to --repo-path
    #[arg(long)]
    manifest_path: Option<PathBuf>,

    /// Only patch this container
    #[arg(long)]
    container: Option<String>,

    /// Write the patch and show the diff without touching the repository
    #[arg(long)]
    dry_run: bool,

    /// Patch file path [default: <workload>-patch.json]
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print the patch JSON
    #[arg(long)]
    pretty: bool,

    /// Pull request base branch [default: the branch checked out at start]
    #[arg(long)]
    base: Option<String>,

    /// Prefix for the work branch name
    #[arg(long)]
    branch_prefix: Option<String>,

    /// Remote to push the work branch to
    #[arg(long)]
    remote: Option<String>,

    /// API endpoint URL
    #[arg(long, env = "CASTAI_API_URL")]
    api_url: Option<String>,

    /// Token used to authenticate the push
    #[arg(long, env = "GITHUB_TOKEN", hide = true, hide_env_values = true)]
    github_token: Option<String>,

    /// owner/repo of the GitHub repository
    #[arg(long, env = "GITHUB_REPOSITORY")]
    github_repository: Option<String>,
}

impl Cli {
    fn validate(&self) -> Result<(), PipelineError> {
        for (flag, value) in [
            ("--cluster-id", &self.cluster_id),
            ("--api-key", &self.api_key),
            ("--workload", &self.workload),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Argument(format!("{flag} must not be empty")));
            }
        }
        Ok(())
    }

    fn request(&self, settings: &Settings) -> PipelineRequest {
        PipelineRequest {
            workload: WorkloadRef::new(&self.cluster_id, &self.namespace, &self.workload)
                .with_container(self.container.clone()),
            manifest_path: self.manifest_path.clone(),
            output: self
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{}-patch.json", self.workload))),
            pretty: self.pretty,
            dry_run: self.dry_run,
            base: self.base.clone(),
            branch_prefix: self
                .branch_prefix
                .clone()
                .unwrap_or_else(|| settings.branch_prefix.clone()),
            now: chrono::Utc::now(),
        }
    }

    fn credentials(&self) -> Option<Arc<dyn RemoteCredentials>> {
        let token = self.github_token.as_deref().filter(|t| !t.trim().is_empty())?;
        let credentials: Arc<dyn RemoteCredentials> =
            Arc::new(GitHubToken::new(token).with_repository(self.github_repository.clone()));
        Some(credentials)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version also arrive here
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            print_error(&err.report());
            return ExitCode::FAILURE;
        }
    };
    init_tracing("info", settings.log_format());

    match run(&cli, &settings).await {
        Ok(report) => {
            render(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            print_error(&err.report());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, settings: &Settings) -> Result<PipelineReport, PipelineError> {
    cli.validate()?;
    let request = cli.request(settings);
    PipelineLogger::new(request.workload.qualified_name()).log_startup(VERSION, cli.dry_run);

    let api_url = cli.api_url.as_deref().unwrap_or(&settings.api_url);
    let source = Arc::new(CastAiClient::new(api_url, cli.api_key.as_str())?);
    let pipeline = Pipeline::new(source, Arc::new(TokioCommandRunner), &cli.repo_path)
        .with_remote(cli.remote.clone().unwrap_or_else(|| settings.remote.clone()))
        .with_credentials(cli.credentials())
        .with_repository(cli.github_repository.clone());

    pipeline.run(&request).await
}

fn render(report: &PipelineReport) {
    let patch_file = report.patch_file.display();
    println!("{}", summary_table(&report.patch));

    match &report.outcome {
        RunOutcome::DryRun { diff } => {
            print_success(&format!("Patch written to {patch_file}"));
            match diff.as_deref() {
                Some("") => print_info("Manifest already matches the recommendation"),
                Some(diff) => println!("{}", colorize_diff(diff)),
                None => {}
            }
            print_info("Dry run: repository left untouched");
        }
        RunOutcome::PatchOnly => {
            print_success(&format!("Patch written to {patch_file}"));
            print_info("No --manifest-path given, nothing to commit");
        }
        RunOutcome::Unchanged => {
            print_success(&format!("Patch written to {patch_file}"));
            print_info("Manifest already matches the recommendation, no branch created");
        }
        RunOutcome::Published { branch, pr, .. } => {
            print_success(&format!("Pushed branch {}", branch.name));
            match pr {
                Ok(PublishOutcome::Created { url }) => {
                    print_success(&format!("Opened pull request {url}"));
                }
                Ok(PublishOutcome::ManualRequired { branch }) => {
                    print_warning("gh CLI not found, pull request not opened");
                    print_info(&format!("Open a pull request from branch {branch} manually"));
                }
                Err(err) => {
                    print_warning(&err.report());
                    print_info(&format!(
                        "The branch {} is pushed; open a pull request manually",
                        branch.name
                    ));
                }
            }
        }
    }
}
