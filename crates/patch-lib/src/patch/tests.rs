//! Tests for patch construction and manifest merging

#[cfg(test)]
mod builder_tests {
    use crate::error::PipelineError;
    use crate::models::{quantity, ContainerRecommendation, Recommendation, ResourceSpec};
    use crate::patch::build_patch;
    use serde_json::json;

    fn container(name: &str, cpu: Option<&str>, memory: Option<&str>) -> ContainerRecommendation {
        ContainerRecommendation {
            name: name.to_string(),
            resources: ResourceSpec {
                cpu_request: cpu.map(quantity),
                memory_request: memory.map(quantity),
                ..Default::default()
            },
        }
    }

    fn recommendation(containers: Vec<ContainerRecommendation>) -> Recommendation {
        Recommendation {
            kind: "Deployment".to_string(),
            name: "checkout".to_string(),
            namespace: "shop".to_string(),
            containers,
        }
    }

    #[test]
    fn test_build_produces_name_keyed_strategic_merge_patch() {
        let rec = recommendation(vec![container("app", Some("250m"), Some("128Mi"))]);
        let patch = build_patch(&rec, None).unwrap();

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": "checkout", "namespace": "shop"},
                "spec": {"template": {"spec": {"containers": [
                    {"name": "app", "resources": {"requests": {"cpu": "250m", "memory": "128Mi"}}}
                ]}}}
            })
        );
    }

    #[test]
    fn test_build_with_filter_keeps_only_that_container() {
        let rec = recommendation(vec![
            container("app", Some("250m"), None),
            container("sidecar", Some("50m"), None),
        ]);
        let patch = build_patch(&rec, Some("sidecar")).unwrap();

        assert_eq!(patch.containers().len(), 1);
        assert_eq!(patch.containers()[0].name, "sidecar");
    }

    #[test]
    fn test_build_with_unknown_filter_fails() {
        let rec = recommendation(vec![container("app", Some("250m"), None)]);
        let err = build_patch(&rec, Some("worker")).unwrap_err();

        match err {
            PipelineError::ContainerNotFound { container, location } => {
                assert_eq!(container, "worker");
                assert_eq!(location, "recommendation");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_recommendation_never_yields_a_document() {
        let err = build_patch(&recommendation(vec![]), None).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyRecommendation { .. }));
    }

    #[test]
    fn test_containers_without_values_do_not_count() {
        let rec = recommendation(vec![container("app", None, None)]);
        let err = build_patch(&rec, None).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyRecommendation { .. }));
    }

    #[test]
    fn test_limits_only_omits_requests() {
        let mut app = container("app", None, None);
        app.resources.memory_limit = Some(quantity("512Mi"));
        let patch = build_patch(&recommendation(vec![app]), None).unwrap();

        let resources = &patch.containers()[0].resources;
        assert!(resources.requests.is_none());
        assert_eq!(
            resources.limits.as_ref().unwrap().memory,
            Some(quantity("512Mi"))
        );
        assert!(!patch.to_json(false).unwrap().contains("requests"));
    }

    #[test]
    fn test_pretty_json_is_indented_and_parses_back() {
        let rec = recommendation(vec![container("app", Some("250m"), None)]);
        let patch = build_patch(&rec, None).unwrap();

        let pretty = patch.to_json(true).unwrap();
        assert!(pretty.contains("\n  \"kind\": \"Deployment\""));
        assert!(!patch.to_json(false).unwrap().contains('\n'));
    }
}

#[cfg(test)]
mod manifest_tests {
    use crate::error::PipelineError;
    use crate::models::quantity;
    use crate::patch::{
        ContainerPatch, ManifestPatcher, PatchDocument, QuantityPatch, ResourcesPatch,
    };
    use serde_yaml::Value;

    const SINGLE_APP: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: checkout
  namespace: shop
spec:
  replicas: 2
  template:
    spec:
      containers:
        - name: app
          image: registry.local/checkout:1.4.2
          resources:
            requests:
              cpu: "100m"
"#;

    const TWO_CONTAINERS: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: checkout
spec:
  template:
    spec:
      containers:
        - name: sidecar
          image: envoy:1.29
          resources:
            requests:
              cpu: 50m
              memory: 64Mi
            limits:
              memory: 128Mi
        - name: app
          image: registry.local/checkout:1.4.2
"#;

    fn requests_patch(container: &str, cpu: Option<&str>, memory: Option<&str>) -> PatchDocument {
        PatchDocument::new(
            "Deployment",
            "checkout",
            "shop",
            vec![ContainerPatch {
                name: container.to_string(),
                resources: ResourcesPatch {
                    requests: Some(QuantityPatch {
                        cpu: cpu.map(quantity),
                        memory: memory.map(quantity),
                    }),
                    limits: None,
                },
            }],
        )
    }

    fn container<'a>(manifest: &'a Value, name: &str) -> &'a Value {
        manifest["spec"]["template"]["spec"]["containers"]
            .as_sequence()
            .unwrap()
            .iter()
            .find(|c| c["name"].as_str() == Some(name))
            .unwrap()
    }

    fn parse(bytes: &[u8]) -> Value {
        serde_yaml::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_apply_sets_recommended_requests() {
        let patch = requests_patch("app", Some("250m"), Some("128Mi"));
        let outcome = ManifestPatcher::new()
            .apply(SINGLE_APP.as_bytes(), &patch)
            .unwrap();

        assert!(outcome.changed);
        let manifest = parse(&outcome.manifest);
        let app = container(&manifest, "app");
        assert_eq!(app["resources"]["requests"]["cpu"].as_str(), Some("250m"));
        assert_eq!(app["resources"]["requests"]["memory"].as_str(), Some("128Mi"));
        assert_eq!(
            app["image"].as_str(),
            Some("registry.local/checkout:1.4.2")
        );
        assert_eq!(manifest["spec"]["replicas"].as_u64(), Some(2));
    }

    #[test]
    fn test_apply_to_mismatched_container_fails() {
        let manifest = SINGLE_APP.replace("name: app", "name: web");
        let patch = requests_patch("app", Some("250m"), Some("128Mi"));
        let err = ManifestPatcher::new()
            .apply(manifest.as_bytes(), &patch)
            .unwrap_err();

        match err {
            PipelineError::ContainerNotFound { container, location } => {
                assert_eq!(container, "app");
                assert_eq!(location, "manifest");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_apply_is_idempotent() {
        let patch = requests_patch("app", Some("250m"), Some("128Mi"));
        let patcher = ManifestPatcher::new();

        let first = patcher.apply(SINGLE_APP.as_bytes(), &patch).unwrap();
        let second = patcher.apply(&first.manifest, &patch).unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(second.manifest, first.manifest);
        assert!(second.diff.is_empty());
    }

    #[test]
    fn test_unchanged_manifest_is_returned_verbatim() {
        let patch = requests_patch("app", Some("100m"), None);
        let outcome = ManifestPatcher::new()
            .apply(SINGLE_APP.as_bytes(), &patch)
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(outcome.manifest, SINGLE_APP.as_bytes());
    }

    #[test]
    fn test_numeric_quantity_matches_string_value() {
        let manifest = SINGLE_APP.replace("cpu: \"100m\"", "cpu: 1");
        let patch = requests_patch("app", Some("1"), None);
        let outcome = ManifestPatcher::new()
            .apply(manifest.as_bytes(), &patch)
            .unwrap();

        assert!(!outcome.changed);
    }

    #[test]
    fn test_filtered_patch_leaves_other_container_untouched() {
        let before = parse(TWO_CONTAINERS.as_bytes());
        let patch = requests_patch("app", Some("300m"), Some("256Mi"));
        let outcome = ManifestPatcher::new()
            .apply(TWO_CONTAINERS.as_bytes(), &patch)
            .unwrap();

        let after = parse(&outcome.manifest);
        assert_eq!(container(&after, "sidecar"), container(&before, "sidecar"));
        assert_eq!(
            container(&after, "app")["resources"]["requests"]["cpu"].as_str(),
            Some("300m")
        );
    }

    const ANNOTATED: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: checkout
spec:
  template:
    spec:
      containers:
      # sidecar sized by platform team
      - name: sidecar
        image: envoy:1.29
        resources:
          requests:
            cpu: "50m"
            memory: 64Mi
      - name: app
        image: registry.local/checkout:1.4.2
        resources:
          requests:
            cpu: 100m # tuned by hand
"#;

    fn section<'a>(manifest: &'a str, from: &str, to: &str) -> &'a str {
        let start = manifest.find(from).unwrap();
        let end = manifest.find(to).unwrap();
        &manifest[start..end]
    }

    #[test]
    fn test_filtered_patch_keeps_other_container_bytes_and_comments() {
        let patch = requests_patch("app", Some("250m"), None);
        let outcome = ManifestPatcher::new()
            .apply(ANNOTATED.as_bytes(), &patch)
            .unwrap();

        let after = String::from_utf8(outcome.manifest).unwrap();
        assert!(after.contains("      # sidecar sized by platform team\n"));
        assert_eq!(
            section(&after, "# sidecar", "- name: app"),
            section(ANNOTATED, "# sidecar", "- name: app")
        );
        assert!(after.contains("            cpu: \"50m\"\n"));
        assert_eq!(
            after,
            ANNOTATED.replace("cpu: 100m # tuned by hand", "cpu: 250m # tuned by hand")
        );

        let removed = outcome.diff.lines().filter(|l| l.starts_with('-') && !l.starts_with("---"));
        let added = outcome.diff.lines().filter(|l| l.starts_with('+') && !l.starts_with("+++"));
        assert_eq!(removed.count(), 1);
        assert_eq!(added.count(), 1);
    }

    #[test]
    fn test_new_quantities_follow_existing_layout() {
        let patch = requests_patch("app", Some("250m"), Some("128Mi"));
        let outcome = ManifestPatcher::new()
            .apply(SINGLE_APP.as_bytes(), &patch)
            .unwrap();

        assert_eq!(
            String::from_utf8(outcome.manifest).unwrap(),
            SINGLE_APP.replace(
                "              cpu: \"100m\"\n",
                "              cpu: \"250m\"\n              memory: 128Mi\n"
            )
        );
    }

    #[test]
    fn test_missing_resources_block_is_added_under_container() {
        let patch = requests_patch("app", Some("0.5"), None);
        let outcome = ManifestPatcher::new()
            .apply(TWO_CONTAINERS.as_bytes(), &patch)
            .unwrap();

        let expected = TWO_CONTAINERS.replace(
            "          image: registry.local/checkout:1.4.2\n",
            "          image: registry.local/checkout:1.4.2\n          resources:\n            requests:\n              cpu: \"0.5\"\n",
        );
        assert_eq!(String::from_utf8(outcome.manifest).unwrap(), expected);
    }

    #[test]
    fn test_empty_flow_resources_are_filled_in_place() {
        let manifest = SINGLE_APP.replace(
            "resources:\n            requests:\n              cpu: \"100m\"",
            "resources: {}",
        );
        let patch = requests_patch("app", Some("250m"), None);
        let outcome = ManifestPatcher::new()
            .apply(manifest.as_bytes(), &patch)
            .unwrap();

        let after = String::from_utf8(outcome.manifest).unwrap();
        assert_eq!(
            after,
            manifest.replace("resources: {}", r#"resources: {"requests":{"cpu":"250m"}}"#)
        );
        let app = container(&parse(after.as_bytes()), "app").clone();
        assert_eq!(app["resources"]["requests"]["cpu"].as_str(), Some("250m"));
    }

    #[test]
    fn test_containers_are_matched_by_name_not_position() {
        let patch = PatchDocument::new(
            "Deployment",
            "checkout",
            "shop",
            vec![
                ContainerPatch {
                    name: "app".to_string(),
                    resources: ResourcesPatch {
                        requests: Some(QuantityPatch {
                            cpu: Some(quantity("400m")),
                            memory: None,
                        }),
                        limits: None,
                    },
                },
                ContainerPatch {
                    name: "sidecar".to_string(),
                    resources: ResourcesPatch {
                        requests: None,
                        limits: Some(QuantityPatch {
                            cpu: None,
                            memory: Some(quantity("96Mi")),
                        }),
                    },
                },
            ],
        );
        let outcome = ManifestPatcher::new()
            .apply(TWO_CONTAINERS.as_bytes(), &patch)
            .unwrap();

        let after = parse(&outcome.manifest);
        let sidecar = container(&after, "sidecar");
        assert_eq!(sidecar["resources"]["requests"]["cpu"].as_str(), Some("50m"));
        assert_eq!(sidecar["resources"]["limits"]["memory"].as_str(), Some("96Mi"));
        assert_eq!(
            container(&after, "app")["resources"]["requests"]["cpu"].as_str(),
            Some("400m")
        );
    }

    #[test]
    fn test_multi_document_manifest_patches_matching_workload_only() {
        let service = "apiVersion: v1\nkind: Service\nmetadata:\n  name: checkout\nspec:\n  ports:\n    - port: 80\n";
        let manifest = format!("{service}---\n{SINGLE_APP}");
        let patch = requests_patch("app", Some("250m"), None);

        let outcome = ManifestPatcher::new()
            .apply(manifest.as_bytes(), &patch)
            .unwrap();
        assert!(outcome.changed);

        let rendered = String::from_utf8(outcome.manifest).unwrap();
        let documents: Vec<&str> = rendered.split("---\n").collect();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0], service);
        let deployment: Value = serde_yaml::from_str(documents[1]).unwrap();
        assert_eq!(
            container(&deployment, "app")["resources"]["requests"]["cpu"].as_str(),
            Some("250m")
        );
    }

    #[test]
    fn test_invalid_yaml_is_a_parse_error() {
        let patch = requests_patch("app", Some("250m"), None);
        let err = ManifestPatcher::new()
            .apply(b"kind: [Deployment", &patch)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ManifestParse(_)));
    }

    #[test]
    fn test_non_workload_document_is_a_parse_error() {
        let patch = requests_patch("app", Some("250m"), None);
        let err = ManifestPatcher::new()
            .apply(
                b"apiVersion: v1\nkind: ConfigMap\ndata:\n  key: value\n",
                &patch,
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::ManifestParse(_)));
    }

    #[test]
    fn test_resources_of_wrong_type_is_an_apply_error() {
        let manifest = SINGLE_APP.replace(
            "resources:\n            requests:\n              cpu: \"100m\"",
            "resources: large",
        );
        let patch = requests_patch("app", Some("250m"), None);
        let err = ManifestPatcher::new()
            .apply(manifest.as_bytes(), &patch)
            .unwrap_err();

        match err {
            PipelineError::PatchApply(message) => {
                assert!(message.contains("containers[name=app].resources"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_diff_is_labelled_with_manifest_path() {
        let patch = requests_patch("app", Some("250m"), None);
        let outcome = ManifestPatcher::for_path("deploy/checkout.yaml")
            .apply(SINGLE_APP.as_bytes(), &patch)
            .unwrap();

        assert!(outcome
            .diff
            .starts_with("--- a/deploy/checkout.yaml\n+++ b/deploy/checkout.yaml\n"));
        assert!(outcome.diff.contains("@@"));
        assert!(outcome.diff.contains("250m"));
    }
}
