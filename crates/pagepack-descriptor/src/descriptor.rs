//! The build descriptor: everything one build needs to know, fixed at startup.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::mode::{Mode, Optimization};
use crate::page::{default_pages, PageEntry};
use crate::rules::{default_asset_rules, default_style_rules, AssetRule, Stage, StyleRule};

/// Browser targets used for vendor prefixing when none are configured.
pub const DEFAULT_BROWSERSLIST: &[&str] = &["defaults"];

/// Where and how bundles are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    /// Output directory
    pub dir: PathBuf,

    /// Script chunk filename template (`[name]`, `[contenthash]`)
    pub script_filename: String,

    /// Style chunk filename template (`[name]`, `[contenthash]`)
    pub style_filename: String,

    /// Prefix for asset URLs written into scripts and styles
    pub public_path: String,
}

/// Copies a directory from the context into the output verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRule {
    /// Source directory, relative to the context
    pub from: PathBuf,

    /// Target directory, relative to the output directory
    pub to: PathBuf,
}

/// Dev server listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevServerOptions {
    pub host: String,
    pub port: u16,
}

impl Default for DevServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4200,
        }
    }
}

/// Errors found while validating a descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("No pages declared")]
    NoPages,

    #[error("Duplicate page output filename: {0}")]
    DuplicateFilename(String),

    #[error("Page output filename must be a relative path inside the output directory: {0}")]
    InvalidFilename(String),

    #[error("{field} must be a relative path inside the output directory: {value}")]
    InvalidOutputPath { field: &'static str, value: String },

    #[error("Entry script must be relative to the context directory: {0}")]
    InvalidEntry(String),

    #[error("Output directory must not be the context directory or contain it: {0}")]
    OutputOverlapsContext(String),
}

/// Declarative description of one build.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Project root; `node_modules` lookups stop here
    pub root: PathBuf,

    /// Source directory all other source paths are relative to
    pub context: PathBuf,

    /// Entry script, relative to the context
    pub entry: String,

    pub output: OutputOptions,

    pub pages: Vec<PageEntry>,

    pub style_rules: Vec<StyleRule>,

    pub asset_rules: Vec<AssetRule>,

    pub copy: Vec<CopyRule>,

    /// Browserslist queries for vendor prefixing
    pub browserslist: Vec<String>,

    pub dev_server: DevServerOptions,

    pub mode: Mode,
}

impl Descriptor {
    /// The default descriptor rooted at `root`: `src/` in, `docs/` out.
    pub fn new(root: impl Into<PathBuf>, mode: Mode) -> Self {
        let root = root.into();
        Self {
            context: root.join("src"),
            entry: "./index.js".to_string(),
            output: OutputOptions {
                dir: root.join("docs"),
                script_filename: "[name].js".to_string(),
                style_filename: "[name].css".to_string(),
                public_path: String::new(),
            },
            pages: default_pages(),
            style_rules: default_style_rules(),
            asset_rules: default_asset_rules(),
            copy: vec![CopyRule {
                from: PathBuf::from("img"),
                to: PathBuf::from("img"),
            }],
            browserslist: DEFAULT_BROWSERSLIST.iter().map(|s| s.to_string()).collect(),
            dev_server: DevServerOptions::default(),
            mode,
            root,
        }
    }

    /// Check the obligations the rest of the build relies on.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.pages.is_empty() {
            return Err(DescriptorError::NoPages);
        }

        let mut seen = HashSet::new();
        for page in &self.pages {
            if !is_inner_relative(Path::new(&page.filename)) {
                return Err(DescriptorError::InvalidFilename(page.filename.clone()));
            }
            if !seen.insert(page.filename.as_str()) {
                return Err(DescriptorError::DuplicateFilename(page.filename.clone()));
            }
        }

        let templates = [
            ("script_filename", self.output.script_filename.as_str()),
            ("style_filename", self.output.style_filename.as_str()),
        ];
        let asset_names = self
            .asset_rules
            .iter()
            .map(|rule| ("asset name", rule.name.as_str()));
        for (field, value) in templates.into_iter().chain(asset_names) {
            if !is_inner_relative(Path::new(value)) {
                return Err(DescriptorError::InvalidOutputPath {
                    field,
                    value: value.to_string(),
                });
            }
        }

        for copy in &self.copy {
            if !is_inner_relative(&copy.to) {
                return Err(DescriptorError::InvalidOutputPath {
                    field: "copy target",
                    value: copy.to.display().to_string(),
                });
            }
        }

        if Path::new(&self.entry).is_absolute() {
            return Err(DescriptorError::InvalidEntry(self.entry.clone()));
        }

        if self.context.starts_with(&self.output.dir) {
            return Err(DescriptorError::OutputOverlapsContext(
                self.output.dir.display().to_string(),
            ));
        }

        Ok(())
    }

    pub fn optimization(&self) -> Optimization {
        Optimization::for_mode(self.mode)
    }

    /// Absolute path of the entry script.
    pub fn entry_path(&self) -> PathBuf {
        self.context.join(self.entry.trim_start_matches("./"))
    }

    /// Absolute path of a page's template.
    pub fn template_path(&self, page: &PageEntry) -> PathBuf {
        self.context.join(&page.template)
    }

    /// Stages of every style rule matching `path`, merged in execution order.
    ///
    /// Returns `None` when no style rule matches.
    pub fn style_stages(&self, path: &Path) -> Option<Vec<Stage>> {
        let mut stages: Vec<Stage> = self
            .style_rules
            .iter()
            .filter(|rule| rule.matches(path))
            .flat_map(|rule| rule.stages.iter().copied())
            .collect();

        if stages.is_empty() {
            return None;
        }

        stages.sort();
        stages.dedup();
        Some(stages)
    }

    /// First asset rule matching `path`.
    pub fn asset_rule(&self, path: &Path) -> Option<&AssetRule> {
        self.asset_rules.iter().find(|rule| rule.matches(path))
    }

    pub fn page(&self, filename: &str) -> Option<&PageEntry> {
        self.pages.iter().find(|p| p.filename == filename)
    }
}

/// A relative path made only of normal components.
fn is_inner_relative(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
