//! CLI integration tests

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const WORKLOADS: &str = r#"{
  "workloads": [
    {
      "name": "checkout",
      "namespace": "shop",
      "kind": "Deployment",
      "containers": [
        {"name": "app", "recommendation": {"requests": {"cpuCores": 0.25, "memoryGib": 0.125}}}
      ]
    }
  ]
}"#;

const MANIFEST: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: checkout
  namespace: shop
spec:
  template:
    spec:
      containers:
        - name: app
          resources:
            requests:
              cpu: 100m
";

/// Run the binary from `dir` with an isolated home and no inherited tokens
fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rightsize-pr"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("NO_COLOR", "1")
        .env("RIGHTSIZE_LOG", "off")
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_REPOSITORY")
        .env_remove("CASTAI_API_URL")
        .env_remove("RIGHTSIZE_API_URL")
        .output()
        .expect("Failed to execute command")
}

fn api(status: usize, body: &str) -> mockito::ServerGuard {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/v1/workload-autoscaling/clusters/c-1/workloads")
        .with_status(status)
        .with_body(body)
        .create();
    server
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    for flag in ["--workload", "--repo-path", "--manifest-path", "--dry-run", "--output"] {
        assert!(stdout.contains(flag), "Should show {flag}");
    }
    assert!(!stdout.contains("--github-token"), "Token flag should stay hidden");
}

#[test]
fn test_missing_required_arguments_exit_1() {
    let dir = TempDir::new().unwrap();
    for args in [
        vec!["--api-key", "key", "--workload", "checkout"],
        vec!["--cluster-id", "c-1", "--workload", "checkout"],
        vec!["--cluster-id", "c-1", "--api-key", "key"],
    ] {
        let output = run(dir.path(), &args);
        assert_eq!(output.status.code(), Some(1), "{args:?}");
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_dry_run_writes_patch_and_shows_diff() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("deploy.yaml"), MANIFEST).unwrap();
    let server = api(200, WORKLOADS);

    let output = run(
        dir.path(),
        &[
            "--cluster-id", "c-1", "--api-key", "key", "--workload", "checkout",
            "--namespace", "shop", "--manifest-path", "deploy.yaml", "--dry-run",
            "--api-url", &server.url(),
        ],
    );

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--- a/deploy.yaml"), "{stdout}");
    assert!(stdout.contains("128Mi"));

    let patch: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("checkout-patch.json")).unwrap())
            .unwrap();
    assert_eq!(
        patch["spec"]["template"]["spec"]["containers"][0]["resources"]["requests"]["cpu"],
        "0.25"
    );
    assert_eq!(std::fs::read_to_string(dir.path().join("deploy.yaml")).unwrap(), MANIFEST);
    assert!(!dir.path().join(".git").exists());
}

#[test]
fn test_without_manifest_only_writes_patch() {
    let dir = TempDir::new().unwrap();
    let server = api(200, WORKLOADS);

    let output = run(
        dir.path(),
        &[
            "--cluster-id", "c-1", "--api-key", "key", "--workload", "checkout",
            "--namespace", "shop", "--output", "out.json", "--api-url", &server.url(),
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(dir.path().join("out.json").exists());
    assert!(String::from_utf8_lossy(&output.stdout).contains("nothing to commit"));
}

#[test]
fn test_unknown_workload_fails_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let server = api(200, WORKLOADS);

    let output = run(
        dir.path(),
        &[
            "--cluster-id", "c-1", "--api-key", "key", "--workload", "payments",
            "--api-url", &server.url(),
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("fetch failed"));
    assert!(!dir.path().join("payments-patch.json").exists());
}
