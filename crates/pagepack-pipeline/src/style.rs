//! Style pipeline: Sass compilation, `@import` inlining, `url()` resolution,
//! vendor prefixing.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lightningcss::bundler::{Bundler as CssBundler, ResolveResult, SourceProvider};
use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use lightningcss::values::url::Url;
use lightningcss::visit_types;
use lightningcss::visitor::{Visit, VisitTypes, Visitor};
use pagepack_descriptor::{Descriptor, Stage};
use rayon::prelude::*;

use crate::assets::{emit_asset, EmittedAsset};
use crate::resolve::normalize;
use crate::traits::{LoaderContext, PipelineError, StyleLoader, StyleSource};

/// Compiles `.scss` and `.sass` files with grass.
#[derive(Debug, Default)]
pub struct SassLoader;

impl StyleLoader for SassLoader {
    fn stage(&self) -> Stage {
        Stage::Sass
    }

    fn apply(
        &self,
        source: StyleSource,
        ctx: &mut LoaderContext<'_>,
    ) -> Result<StyleSource, PipelineError> {
        let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
        if let Some(dir) = source.path.parent() {
            options = options.load_path(dir);
        }
        options = options
            .load_path(&ctx.descriptor.context)
            .load_path(ctx.descriptor.root.join("node_modules"));

        // grass reads the file itself so it can pick the syntax from the extension
        let code =
            grass::from_path(&source.path, &options).map_err(|e| PipelineError::StyleSyntax {
                path: source.path.display().to_string(),
                location: String::new(),
                message: e.to_string(),
            })?;

        Ok(StyleSource {
            path: source.path,
            code,
        })
    }
}

/// Inlines local `@import`s and resolves `url()` references to emitted
/// assets.
#[derive(Debug, Default)]
pub struct CssLoader;

impl StyleLoader for CssLoader {
    fn stage(&self) -> Stage {
        Stage::Css
    }

    fn apply(
        &self,
        source: StyleSource,
        ctx: &mut LoaderContext<'_>,
    ) -> Result<StyleSource, PipelineError> {
        let mut sources = StyleSources {
            files: HashMap::new(),
            context: ctx.descriptor.context.clone(),
        };
        sources.load(&source.path, &source.code, ctx)?;

        let mut bundler = CssBundler::new(&sources, None, parser_options(&source.path));
        let stylesheet = bundler
            .bundle(&source.path)
            .map_err(|e| style_error(&source.path, e))?;

        let code = stylesheet
            .to_css(PrinterOptions::default())
            .map_err(|e| style_error(&source.path, e))?
            .code;

        Ok(StyleSource {
            path: source.path,
            code,
        })
    }
}

/// Style files reachable through `@import`, with their `url()`s already
/// rewritten. Serves them to the lightningcss bundler.
struct StyleSources {
    files: HashMap<PathBuf, String>,
    context: PathBuf,
}

impl StyleSources {
    fn load(
        &mut self,
        path: &Path,
        code: &str,
        ctx: &mut LoaderContext<'_>,
    ) -> Result<(), PipelineError> {
        let mut stylesheet =
            StyleSheet::parse(code, parser_options(path)).map_err(|e| style_error(path, e))?;

        let imports: Vec<String> = stylesheet
            .rules
            .0
            .iter()
            .filter_map(|rule| match rule {
                CssRule::Import(import) => Some(import.url.to_string()),
                _ => None,
            })
            .collect();

        stylesheet.visit(&mut UrlRewriter {
            style_path: path,
            ctx: &mut *ctx,
        })?;

        let rewritten = stylesheet
            .to_css(PrinterOptions::default())
            .map_err(|e| style_error(path, e))?
            .code;
        self.files.insert(path.to_path_buf(), rewritten);

        for specifier in imports {
            if is_external(&specifier) {
                continue;
            }
            let resolved = resolve_reference(&specifier, path, &self.context).ok_or_else(|| {
                PipelineError::MissingAsset {
                    reference: specifier.clone(),
                    importer: path.display().to_string(),
                }
            })?;
            if self.files.contains_key(&resolved) {
                continue;
            }

            let code = fs::read_to_string(&resolved).map_err(|e| PipelineError::ReadError {
                path: resolved.display().to_string(),
                message: e.to_string(),
            })?;
            self.load(&resolved, &code, ctx)?;
        }

        Ok(())
    }
}

impl SourceProvider for StyleSources {
    type Error = io::Error;

    fn read<'a>(&'a self, file: &Path) -> Result<&'a str, Self::Error> {
        self.files.get(file).map(String::as_str).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} was not loaded", file.display()),
            )
        })
    }

    fn resolve(&self, specifier: &str, originating_file: &Path) -> Result<ResolveResult, Self::Error> {
        if is_external(specifier) {
            return Ok(ResolveResult::External(specifier.to_string()));
        }
        resolve_reference(specifier, originating_file, &self.context)
            .map(ResolveResult::File)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("cannot resolve '{}'", specifier),
                )
            })
    }
}

/// Rewrites every `url()` of one stylesheet. Comments never reach the parsed
/// sheet, so commented-out references are left alone.
struct UrlRewriter<'r, 'c> {
    style_path: &'r Path,
    ctx: &'r mut LoaderContext<'c>,
}

impl<'i> Visitor<'i> for UrlRewriter<'_, '_> {
    type Error = PipelineError;

    fn visit_types(&self) -> VisitTypes {
        visit_types!(URLS)
    }

    fn visit_url(&mut self, url: &mut Url<'i>) -> Result<(), Self::Error> {
        if let Some(rewritten) = rewrite_url(&url.url, self.style_path, self.ctx)? {
            url.url = rewritten.into();
        }
        Ok(())
    }
}

/// Adds vendor prefixes for the configured browser targets.
#[derive(Debug, Default)]
pub struct PostcssLoader;

impl StyleLoader for PostcssLoader {
    fn stage(&self) -> Stage {
        Stage::Postcss
    }

    fn apply(
        &self,
        source: StyleSource,
        ctx: &mut LoaderContext<'_>,
    ) -> Result<StyleSource, PipelineError> {
        let mut stylesheet = StyleSheet::parse(&source.code, parser_options(&source.path))
            .map_err(|e| style_error(&source.path, e))?;

        stylesheet
            .minify(MinifyOptions {
                targets: ctx.targets.clone(),
                ..MinifyOptions::default()
            })
            .map_err(|e| style_error(&source.path, e))?;

        let code = stylesheet
            .to_css(PrinterOptions {
                targets: ctx.targets.clone(),
                ..PrinterOptions::default()
            })
            .map_err(|e| style_error(&source.path, e))?
            .code;

        Ok(StyleSource {
            path: source.path,
            code,
        })
    }
}

fn parser_options<'i>(path: &Path) -> ParserOptions<'i> {
    ParserOptions {
        filename: path.display().to_string(),
        ..ParserOptions::default()
    }
}

fn style_error<T: std::fmt::Display>(
    path: &Path,
    error: lightningcss::error::Error<T>,
) -> PipelineError {
    // lightningcss lines are zero-based, columns one-based
    let location = error
        .loc
        .as_ref()
        .map(|loc| format!(":{}:{}", loc.line + 1, loc.column))
        .unwrap_or_default();

    PipelineError::StyleSyntax {
        path: path.display().to_string(),
        location,
        message: error.kind.to_string(),
    }
}

/// Rewrite one `url()` reference that points at a local file.
///
/// References resolve against the style file's directory first, then the
/// context. External references and style files yield `None`.
pub fn rewrite_url(
    reference: &str,
    style_path: &Path,
    ctx: &mut LoaderContext<'_>,
) -> Result<Option<String>, PipelineError> {
    if is_external(reference) {
        return Ok(None);
    }

    let split = reference.find(['?', '#']).unwrap_or(reference.len());
    let (file, suffix) = reference.split_at(split);

    let resolved = resolve_reference(file, style_path, &ctx.descriptor.context).ok_or_else(|| {
        PipelineError::MissingAsset {
            reference: reference.to_string(),
            importer: style_path.display().to_string(),
        }
    })?;

    if ctx.descriptor.style_stages(&resolved).is_some() {
        return Ok(None);
    }

    let asset = emit_asset(ctx.descriptor, &resolved, style_path)?;
    let url = format!("{}{}{}", ctx.asset_url_prefix, asset.name, suffix);
    ctx.assets.push(asset);

    Ok(Some(url))
}

fn is_external(reference: &str) -> bool {
    reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with('/')
        || reference.starts_with("data:")
        || reference.contains("://")
}

fn resolve_reference(file: &str, style_path: &Path, context: &Path) -> Option<PathBuf> {
    let from_style = style_path.parent().map(|dir| normalize(&dir.join(file)));

    from_style
        .into_iter()
        .chain(std::iter::once(normalize(&context.join(file))))
        .find(|candidate| candidate.is_file())
}

/// Prefix that makes an asset name reachable from a CSS file written under
/// `style_filename`.
pub fn asset_url_prefix(public_path: &str, style_filename: &str) -> String {
    if !public_path.is_empty() {
        return public_path.to_string();
    }
    let depth = Path::new(style_filename)
        .components()
        .count()
        .saturating_sub(1);
    "../".repeat(depth)
}

/// Parse browserslist queries into lightningcss targets.
pub fn browser_targets(queries: &[String]) -> Result<Targets, PipelineError> {
    if queries.is_empty() {
        return Ok(Targets::default());
    }

    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| PipelineError::Browserslist(e.to_string()))?;

    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

/// Output of one style file.
#[derive(Debug, Clone)]
pub struct ProcessedStyle {
    pub path: PathBuf,
    pub css: String,
    pub assets: Vec<EmittedAsset>,
}

/// Runs style files through their stages.
pub struct StylePipeline {
    loaders: Vec<Box<dyn StyleLoader>>,
    targets: Targets,
}

impl StylePipeline {
    /// Pipeline with the built-in loaders.
    pub fn new(descriptor: &Descriptor) -> Result<Self, PipelineError> {
        Ok(Self {
            loaders: vec![
                Box::new(SassLoader),
                Box::new(CssLoader),
                Box::new(PostcssLoader),
            ],
            targets: browser_targets(&descriptor.browserslist)?,
        })
    }

    /// Replace the loader for a stage, or add one.
    pub fn with_loader(mut self, loader: Box<dyn StyleLoader>) -> Self {
        self.loaders.retain(|l| l.stage() != loader.stage());
        self.loaders.push(loader);
        self
    }

    fn loader(&self, stage: Stage) -> Option<&dyn StyleLoader> {
        self.loaders
            .iter()
            .find(|l| l.stage() == stage)
            .map(|l| l.as_ref())
    }

    /// Run one file through `stages`.
    pub fn process(
        &self,
        descriptor: &Descriptor,
        path: &Path,
        stages: &[Stage],
        asset_url_prefix: &str,
    ) -> Result<ProcessedStyle, PipelineError> {
        if !stages.contains(&Stage::Extract) {
            return Err(PipelineError::NotExtracted(path.display().to_string()));
        }

        let code = fs::read_to_string(path).map_err(|e| PipelineError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut ctx = LoaderContext {
            descriptor,
            targets: self.targets.clone(),
            asset_url_prefix: asset_url_prefix.to_string(),
            assets: Vec::new(),
        };

        let mut source = StyleSource {
            path: path.to_path_buf(),
            code,
        };

        for &stage in stages.iter().filter(|&&s| s != Stage::Extract) {
            let loader = self
                .loader(stage)
                .ok_or(PipelineError::MissingLoader(stage.name()))?;
            tracing::debug!("{} loader: {}", stage.name(), path.display());
            source = loader.apply(source, &mut ctx)?;
        }

        Ok(ProcessedStyle {
            path: source.path,
            css: source.code,
            assets: ctx.assets,
        })
    }

    /// Process many files in parallel, keeping their order.
    pub fn process_all(
        &self,
        descriptor: &Descriptor,
        files: &[(PathBuf, Vec<Stage>)],
        asset_url_prefix: &str,
    ) -> Result<Vec<ProcessedStyle>, PipelineError> {
        files
            .par_iter()
            .map(|(path, stages)| self.process(descriptor, path, stages, asset_url_prefix))
            .collect()
    }
}
