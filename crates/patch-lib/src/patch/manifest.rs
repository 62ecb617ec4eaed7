//! Applies a patch document to workload manifest bytes
//!
//! The patcher is a pure transform: bytes in, bytes out. Writing the result
//! back to disk is the caller's job. Values are merged on the parsed tree,
//! then only the changed values are written back into the original text.

use super::document::{ContainerPatch, PatchDocument, QuantityPatch};
use super::splice::splice_document;
use crate::error::PipelineError;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::{debug, warn};

/// Result of applying a patch to a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// New manifest bytes; identical to the input when `changed` is false
    pub manifest: Vec<u8>,
    pub changed: bool,
    /// Unified diff of old against new, empty when unchanged
    pub diff: String,
}

impl PatchOutcome {
    fn unchanged(manifest: &[u8]) -> Self {
        Self {
            manifest: manifest.to_vec(),
            changed: false,
            diff: String::new(),
        }
    }
}

/// Name-keyed merge of container resources into a workload manifest
#[derive(Debug, Clone)]
pub struct ManifestPatcher {
    label: String,
}

impl Default for ManifestPatcher {
    fn default() -> Self {
        Self {
            label: "manifest".to_string(),
        }
    }
}

impl ManifestPatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patcher whose diffs are labelled with `path`
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            label: path.as_ref().display().to_string(),
        }
    }

    pub fn apply(
        &self,
        manifest: &[u8],
        patch: &PatchDocument,
    ) -> Result<PatchOutcome, PipelineError> {
        let text = std::str::from_utf8(manifest)
            .map_err(|e| PipelineError::ManifestParse(format!("manifest is not UTF-8: {e}")))?;

        let original = parse_documents(text)?;
        let target = select_target(&original, patch)?;

        let mut documents = original.clone();
        let containers = containers_mut(&mut documents[target]).ok_or_else(|| {
            PipelineError::ManifestParse("spec.template.spec.containers is missing".to_string())
        })?;

        for op in patch.containers() {
            let container = containers
                .iter_mut()
                .find(|c| c.get("name").and_then(Value::as_str) == Some(op.name.as_str()))
                .ok_or_else(|| PipelineError::container_not_in_manifest(&op.name))?;
            merge_container(container, op)?;
        }

        if documents == original {
            debug!(manifest = %self.label, "Manifest already matches the patch");
            return Ok(PatchOutcome::unchanged(manifest));
        }

        let rendered = splice_document(text, target, &original[target], &documents[target])?;
        if parse_documents(&rendered)? != documents {
            return Err(PipelineError::PatchApply(
                "in-place edit of the manifest did not produce the merged content".to_string(),
            ));
        }
        let diff = render_diff(&self.label, text, &rendered);
        debug!(manifest = %self.label, containers = patch.containers().len(), "Patched manifest");

        Ok(PatchOutcome {
            manifest: rendered.into_bytes(),
            changed: true,
            diff,
        })
    }
}

fn parse_documents(text: &str) -> Result<Vec<Value>, PipelineError> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)
            .map_err(|e| PipelineError::ManifestParse(e.to_string()))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    if documents.is_empty() {
        return Err(PipelineError::ManifestParse(
            "manifest contains no YAML documents".to_string(),
        ));
    }
    Ok(documents)
}

fn render_diff(label: &str, old: &str, new: &str) -> String {
    let patch = diffy::create_patch(old, new);
    let mut out = format!("--- a/{label}\n+++ b/{label}\n");
    for line in patch
        .to_string()
        .lines()
        .skip_while(|l| l.starts_with("--- ") || l.starts_with("+++ "))
    {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_workload(document: &Value) -> bool {
    document
        .get("spec")
        .and_then(|s| s.get("template"))
        .and_then(|t| t.get("spec"))
        .and_then(|s| s.get("containers"))
        .map_or(false, Value::is_sequence)
}

fn matches_patch(document: &Value, patch: &PatchDocument) -> bool {
    let kind = document.get("kind").and_then(Value::as_str);
    let name = document
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str);
    kind == Some(patch.kind.as_str()) && name == Some(patch.metadata.name.as_str())
}

/// Index of the document the patch applies to
fn select_target(documents: &[Value], patch: &PatchDocument) -> Result<usize, PipelineError> {
    let workloads: Vec<usize> = documents
        .iter()
        .enumerate()
        .filter(|(_, d)| is_workload(d))
        .map(|(i, _)| i)
        .collect();

    if let Some(&index) = workloads.iter().find(|&&i| matches_patch(&documents[i], patch)) {
        return Ok(index);
    }

    match workloads.as_slice() {
        [] => Err(PipelineError::ManifestParse(
            "no workload document with spec.template.spec.containers".to_string(),
        )),
        [only] => {
            warn!(
                kind = %patch.kind,
                name = %patch.metadata.name,
                "Manifest workload does not match the patch header, patching the only workload found"
            );
            Ok(*only)
        }
        many => Err(PipelineError::ManifestParse(format!(
            "{} workload documents found, none is {} '{}'",
            many.len(),
            patch.kind,
            patch.metadata.name
        ))),
    }
}

fn containers_mut(document: &mut Value) -> Option<&mut Vec<Value>> {
    document
        .get_mut("spec")?
        .get_mut("template")?
        .get_mut("spec")?
        .get_mut("containers")?
        .as_sequence_mut()
}

fn merge_container(container: &mut Value, op: &ContainerPatch) -> Result<(), PipelineError> {
    let path = format!("containers[name={}]", op.name);
    let kind = value_kind(container);
    let entry = container.as_mapping_mut().ok_or_else(|| {
        PipelineError::PatchApply(format!("`{path}` is a {kind}, expected a mapping"))
    })?;

    let path = format!("{path}.resources");
    let resources = child_mapping(entry, "resources", &path)?;
    if let Some(requests) = &op.resources.requests {
        merge_quantities(resources, "requests", requests, &path)?;
    }
    if let Some(limits) = &op.resources.limits {
        merge_quantities(resources, "limits", limits, &path)?;
    }
    Ok(())
}

fn merge_quantities(
    resources: &mut Mapping,
    key: &str,
    quantities: &QuantityPatch,
    path: &str,
) -> Result<(), PipelineError> {
    let path = format!("{path}.{key}");
    let target = child_mapping(resources, key, &path)?;
    set_quantity(target, "cpu", quantities.cpu.as_ref(), &path)?;
    set_quantity(target, "memory", quantities.memory.as_ref(), &path)
}

/// Mapping under `key`, created when absent or null
fn child_mapping<'a>(
    parent: &'a mut Mapping,
    key: &str,
    path: &str,
) -> Result<&'a mut Mapping, PipelineError> {
    let slot = parent
        .entry(Value::String(key.to_string()))
        .or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Mapping(Mapping::new());
    }
    let kind = value_kind(slot);
    slot.as_mapping_mut().ok_or_else(|| {
        PipelineError::PatchApply(format!("`{path}` is a {kind}, expected a mapping"))
    })
}

fn set_quantity(
    target: &mut Mapping,
    key: &str,
    value: Option<&Quantity>,
    path: &str,
) -> Result<(), PipelineError> {
    let Some(Quantity(wanted)) = value else {
        return Ok(());
    };

    match target.get(key) {
        Some(Value::String(current)) if current == wanted => return Ok(()),
        // `cpu: 1` is the same quantity as `cpu: "1"`
        Some(Value::Number(current)) if current.to_string() == *wanted => return Ok(()),
        None | Some(Value::Null) | Some(Value::String(_)) | Some(Value::Number(_)) => {}
        Some(other) => {
            return Err(PipelineError::PatchApply(format!(
                "`{path}.{key}` is a {}, expected a quantity",
                value_kind(other)
            )))
        }
    }

    target.insert(Value::String(key.to_string()), Value::String(wanted.clone()));
    Ok(())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
