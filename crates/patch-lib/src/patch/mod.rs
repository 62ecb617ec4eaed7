//! Patch construction and application
//!
//! [`build_patch`] turns a recommendation into a name-keyed strategic-merge
//! document; [`ManifestPatcher`] merges that document into manifest bytes
//! without touching unrelated fields.

mod builder;
mod document;
mod manifest;
mod splice;

#[cfg(test)]
mod tests;

pub use builder::build_patch;
pub use document::{
    ContainerPatch, PatchDocument, PatchMetadata, PodSpecPatch, PodTemplatePatch, QuantityPatch,
    ResourcesPatch, WorkloadSpecPatch,
};
pub use manifest::{ManifestPatcher, PatchOutcome};
