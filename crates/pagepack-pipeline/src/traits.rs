//! Loader trait, loader context and pipeline errors.

use std::path::PathBuf;

use lightningcss::targets::Targets;
use pagepack_descriptor::{Descriptor, Stage};

use crate::assets::EmittedAsset;

/// A style file on its way through the stage pipeline.
#[derive(Debug, Clone)]
pub struct StyleSource {
    /// Source file the content came from
    pub path: PathBuf,

    /// Current content
    pub code: String,
}

/// State shared by the stages applied to one style file.
#[derive(Debug)]
pub struct LoaderContext<'a> {
    pub descriptor: &'a Descriptor,

    /// Browser targets for vendor prefixing
    pub targets: Targets,

    /// Prefix put in front of emitted asset names inside `url()`
    pub asset_url_prefix: String,

    /// Assets referenced by the file, collected while rewriting `url()`
    pub assets: Vec<EmittedAsset>,
}

/// Errors that abort a build.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to parse script {path}: {message}")]
    ScriptSyntax { path: String, message: String },

    #[error("Failed to compile style {path}{location}: {message}")]
    StyleSyntax {
        path: String,
        /// `:line:column` when known, empty otherwise
        location: String,
        message: String,
    },

    #[error("Failed to parse JSON module {path}: {message}")]
    InvalidJson { path: String, message: String },

    #[error("Cannot resolve '{specifier}' imported from {importer}")]
    Unresolved { specifier: String, importer: String },

    #[error("No rule handles {path} (imported from {importer})")]
    NoRule { path: String, importer: String },

    #[error("Asset not found: '{reference}' referenced from {importer}")]
    MissingAsset { reference: String, importer: String },

    #[error("Asset name {name} is produced by both {first} and {second}")]
    AssetConflict {
        name: String,
        first: String,
        second: String,
    },

    #[error("Style {0} matches no rule with an extract stage")]
    NotExtracted(String),

    #[error("No loader registered for stage '{0}'")]
    MissingLoader(&'static str),

    #[error("Invalid browserslist query: {0}")]
    Browserslist(String),

    #[error("Failed to minify {name}: {message}")]
    MinifyError { name: String, message: String },
}

/// A stage implementation for style files.
pub trait StyleLoader: Send + Sync {
    /// Stage this loader implements
    fn stage(&self) -> Stage;

    /// Transform the source, recording referenced assets in the context.
    fn apply(
        &self,
        source: StyleSource,
        ctx: &mut LoaderContext<'_>,
    ) -> Result<StyleSource, PipelineError>;
}
