//! Turns a recommendation into a patch document

use super::document::{ContainerPatch, PatchDocument};
use crate::error::PipelineError;
use crate::models::Recommendation;
use tracing::debug;

/// Build the patch for `recommendation`, optionally restricted to one container.
///
/// Fails instead of returning an empty document: an empty recommendation, or
/// one whose selected containers carry no values, is an
/// [`PipelineError::EmptyRecommendation`].
pub fn build_patch(
    recommendation: &Recommendation,
    container_filter: Option<&str>,
) -> Result<PatchDocument, PipelineError> {
    if recommendation.is_empty() {
        return Err(PipelineError::EmptyRecommendation {
            workload: recommendation.name.clone(),
        });
    }

    let selected: Vec<_> = match container_filter {
        Some(name) => {
            let container = recommendation
                .container(name)
                .ok_or_else(|| PipelineError::container_not_in_recommendation(name))?;
            vec![container]
        }
        None => recommendation.containers.iter().collect(),
    };

    let operations: Vec<ContainerPatch> = selected
        .into_iter()
        .filter_map(|c| {
            let op = ContainerPatch::from_spec(&c.name, &c.resources);
            if op.is_none() {
                debug!(container = %c.name, "Skipping container without recommended values");
            }
            op
        })
        .collect();

    if operations.is_empty() {
        return Err(PipelineError::EmptyRecommendation {
            workload: recommendation.name.clone(),
        });
    }

    Ok(PatchDocument::new(
        &recommendation.kind,
        &recommendation.name,
        &recommendation.namespace,
        operations,
    ))
}
