//! Style and asset rules matched against imported file paths.

use std::path::Path;

use regex::Regex;

/// A named processing stage applied to a style file.
///
/// Variants are declared in execution order; merging the stages of several
/// matching rules sorts them by this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Compile Sass/SCSS to CSS
    Sass,
    /// Parse CSS, inline `@import`s and resolve `url()` references
    Css,
    /// Vendor-prefix for the configured browser targets
    Postcss,
    /// Move the result into the chunk's CSS file
    Extract,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Sass => "sass",
            Stage::Css => "css",
            Stage::Postcss => "postcss",
            Stage::Extract => "extract",
        }
    }
}

/// Routes matching style files through a list of stages.
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub test: Regex,
    pub stages: Vec<Stage>,
}

impl StyleRule {
    pub fn new(pattern: &str, stages: Vec<Stage>) -> Result<Self, regex::Error> {
        Ok(Self {
            test: Regex::new(pattern)?,
            stages,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.test.is_match(&path.to_string_lossy())
    }
}

/// Emits matching binary files under a templated name.
///
/// The name template understands `[path]`, `[name]`, `[ext]` and `[hash]`.
#[derive(Debug, Clone)]
pub struct AssetRule {
    pub test: Regex,
    pub name: String,
}

impl AssetRule {
    pub fn new(pattern: &str, name: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            test: Regex::new(pattern)?,
            name: name.into(),
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.test.is_match(&path.to_string_lossy())
    }
}

/// Plain CSS, Sass/SCSS, and the stage-only prefixing rule for `.scss`.
pub fn default_style_rules() -> Vec<StyleRule> {
    vec![
        StyleRule {
            test: Regex::new(r"\.css$").expect("Invalid css rule regex"),
            stages: vec![Stage::Extract, Stage::Css],
        },
        StyleRule {
            test: Regex::new(r"\.s[ac]ss$").expect("Invalid sass rule regex"),
            stages: vec![Stage::Extract, Stage::Css, Stage::Sass],
        },
        StyleRule {
            test: Regex::new(r"\.scss$").expect("Invalid postcss rule regex"),
            stages: vec![Stage::Postcss],
        },
    ]
}

/// Images and fonts, emitted under their source-relative path.
pub fn default_asset_rules() -> Vec<AssetRule> {
    vec![AssetRule {
        test: Regex::new(r"\.(png|jpg|gif|woff2?|ttf|eot|svg)$")
            .expect("Invalid asset rule regex"),
        name: "[path][name].[ext]".to_string(),
    }]
}
