//! Asset emission: images and fonts referenced from scripts and styles.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use pagepack_descriptor::{AssetRule, Descriptor};
use sha2::{Digest, Sha256};

use crate::resolve::relative_path;
use crate::traits::PipelineError;

/// An asset file and the name it is emitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedAsset {
    /// Source file
    pub source: PathBuf,

    /// Output path, relative to the output directory, `/`-separated
    pub name: String,
}

/// Render an asset rule's name template for `source`.
///
/// `[path]` is the source directory relative to `context` with a trailing
/// slash, `..` segments written as `_`. `[hash]` is the first 8 hex digits of
/// the SHA-256 of `contents`.
pub fn asset_name(rule: &AssetRule, context: &Path, source: &Path, contents: &[u8]) -> String {
    let relative = relative_path(source, context);

    let dir = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .map(|c| match c {
                    Component::ParentDir => "_".to_string(),
                    other => other.as_os_str().to_string_lossy().into_owned(),
                })
                .map(|segment| segment + "/")
                .collect::<String>()
        })
        .unwrap_or_default();

    let name = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut rendered = rule
        .name
        .replace("[path]", &dir)
        .replace("[name]", &name)
        .replace("[ext]", &ext);

    if rendered.contains("[hash]") {
        rendered = rendered.replace("[hash]", &short_hash(contents));
    }

    rendered
}

/// First 8 hex digits of the SHA-256 of `data`.
pub fn short_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let hex = format!("{:x}", digest);
    hex[..8].to_string()
}

/// Emit one asset referenced from `importer`.
pub fn emit_asset(
    descriptor: &Descriptor,
    source: &Path,
    importer: &Path,
) -> Result<EmittedAsset, PipelineError> {
    let rule = descriptor
        .asset_rule(source)
        .ok_or_else(|| PipelineError::NoRule {
            path: source.display().to_string(),
            importer: importer.display().to_string(),
        })?;

    let contents = fs::read(source).map_err(|e| PipelineError::ReadError {
        path: source.display().to_string(),
        message: e.to_string(),
    })?;

    Ok(EmittedAsset {
        source: source.to_path_buf(),
        name: asset_name(rule, &descriptor.context, source, &contents),
    })
}

/// The assets of one build, keyed by output name.
#[derive(Debug, Default)]
pub struct AssetSet {
    assets: BTreeMap<String, PathBuf>,
}

impl AssetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset; the same name from a different source is an error.
    pub fn insert(&mut self, asset: EmittedAsset) -> Result<(), PipelineError> {
        match self.assets.get(&asset.name) {
            Some(existing) if existing != &asset.source => Err(PipelineError::AssetConflict {
                name: asset.name,
                first: existing.display().to_string(),
                second: asset.source.display().to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.assets.insert(asset.name, asset.source);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Assets in output-name order.
    pub fn into_vec(self) -> Vec<EmittedAsset> {
        self.assets
            .into_iter()
            .map(|(name, source)| EmittedAsset { source, name })
            .collect()
    }
}
