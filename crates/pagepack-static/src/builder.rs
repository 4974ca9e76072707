//! Static site builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use walkdir::WalkDir;

use pagepack_descriptor::{Descriptor, DescriptorError, PageEntry};
use pagepack_pipeline::{relative_path, Bundle, Bundler, PipelineError};

use crate::output::{BuildOutput, ChunkManifest};
use crate::templates::PageAssembler;

/// Result of a build written to disk.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of pages generated
    pub pages: usize,

    /// Number of chunk files (scripts and styles)
    pub chunks: usize,

    /// Number of emitted assets
    pub assets: usize,

    /// Number of files copied by copy rules
    pub copied: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// A complete build held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryBuild {
    pub output: BuildOutput,
    pub manifest: ChunkManifest,
    pub pages: usize,
    pub chunks: usize,
    pub assets: usize,
    pub copied: usize,
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Template for {page} not found: {path}")]
    MissingTemplate { page: String, path: String },

    #[error("Failed to render template: {path}: {message}")]
    TemplateError { path: String, message: String },

    #[error("Unknown page: {0}")]
    UnknownPage(String),

    #[error("Failed to read: {0}")]
    ReadError(String),

    #[error("Failed to write output: {0}")]
    WriteError(String),
}

/// Static site builder.
pub struct StaticBuilder {
    descriptor: Descriptor,
}

impl StaticBuilder {
    pub fn new(descriptor: Descriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Build and replace the output directory.
    ///
    /// Nothing on disk changes unless the whole build succeeds.
    pub async fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        let build = self.build_in_memory()?;
        build.output.emit(&self.descriptor.output.dir)?;

        let duration = start.elapsed();

        Ok(BuildResult {
            pages: build.pages,
            chunks: build.chunks,
            assets: build.assets,
            copied: build.copied,
            duration_ms: duration.as_millis() as u64,
            output_dir: self.descriptor.output.dir.clone(),
        })
    }

    /// Run every stage and collect the output files.
    pub fn build_in_memory(&self) -> Result<InMemoryBuild, BuildError> {
        self.descriptor.validate()?;

        tracing::debug!(
            "Building {} pages in {} mode",
            self.descriptor.pages.len(),
            self.descriptor.mode
        );

        let bundle = Bundler::new(&self.descriptor)?.bundle()?;
        let manifest = ChunkManifest::from_bundle(&bundle, &self.descriptor.output.public_path);

        let mut output = BuildOutput::new();

        let copied = self.copy_files(&mut output)?;
        let chunks = self.add_bundle(&bundle, &mut output)?;

        let assembler = self.assembler();
        let pages: Vec<(String, String)> = self
            .descriptor
            .pages
            .par_iter()
            .map(|page| {
                assembler
                    .assemble(page, &manifest)
                    .map(|html| (page.filename.clone(), html))
            })
            .collect::<Result<_, _>>()?;

        let page_count = pages.len();
        for (filename, html) in pages {
            output.insert(filename, html);
        }

        Ok(InMemoryBuild {
            output,
            manifest,
            pages: page_count,
            chunks,
            assets: bundle.assets.len(),
            copied,
        })
    }

    /// Render a single page against an existing chunk manifest.
    pub fn reassemble_page(
        &self,
        filename: &str,
        manifest: &ChunkManifest,
    ) -> Result<String, BuildError> {
        let page = self
            .descriptor
            .page(filename)
            .ok_or_else(|| BuildError::UnknownPage(filename.to_string()))?;

        self.assembler().assemble(page, manifest)
    }

    /// Pages affected by an edit to `template`.
    ///
    /// A page template affects its own pages; any other template may be an
    /// included partial and affects every page.
    pub fn pages_using(&self, template: &Path) -> Vec<&PageEntry> {
        let own: Vec<&PageEntry> = self
            .descriptor
            .pages
            .iter()
            .filter(|page| self.descriptor.template_path(page) == template)
            .collect();

        if own.is_empty() {
            self.descriptor.pages.iter().collect()
        } else {
            own
        }
    }

    fn assembler(&self) -> PageAssembler {
        PageAssembler::new(
            &self.descriptor.context,
            self.descriptor.mode,
            &self.descriptor.output.public_path,
        )
    }

    fn add_bundle(&self, bundle: &Bundle, output: &mut BuildOutput) -> Result<usize, BuildError> {
        let mut chunks = 0;
        for file in bundle.files() {
            output.insert(file.filename.clone(), file.contents.clone());
            chunks += 1;
        }

        for asset in &bundle.assets {
            let contents = fs::read(&asset.source)
                .map_err(|e| BuildError::ReadError(format!("{}: {}", asset.source.display(), e)))?;
            output.insert(asset.name.clone(), contents);
        }

        Ok(chunks)
    }

    /// Apply copy rules. Missing source directories are skipped.
    fn copy_files(&self, output: &mut BuildOutput) -> Result<usize, BuildError> {
        let mut copied = 0;

        for rule in &self.descriptor.copy {
            let from = self.descriptor.context.join(&rule.from);
            if !from.is_dir() {
                tracing::warn!("Copy source not found, skipping: {}", from.display());
                continue;
            }

            for entry in WalkDir::new(&from)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
            {
                let entry =
                    entry.map_err(|e| BuildError::ReadError(format!("{}: {}", from.display(), e)))?;
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }

                let contents = fs::read(path)
                    .map_err(|e| BuildError::ReadError(format!("{}: {}", path.display(), e)))?;
                let target = rule.to.join(relative_path(path, &from));
                output.insert(output_key(&target), contents);
                copied += 1;
            }
        }

        Ok(copied)
    }
}

fn output_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
