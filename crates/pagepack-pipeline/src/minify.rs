//! Production minifiers for scripts, styles and HTML.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::traits::PipelineError;

/// Minify a chunk script with the oxc minifier.
pub fn minify_js(source: &str, name: &str) -> Result<String, PipelineError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();

    if let Some(error) = ret.errors.first() {
        return Err(PipelineError::MinifyError {
            name: name.to_string(),
            message: error.to_string(),
        });
    }

    let mut program = ret.program;
    let minified = Minifier::new(MinifierOptions::default()).build(&allocator, &mut program);

    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        })
        .with_scoping(minified.scoping)
        .build(&program)
        .code;

    Ok(code)
}

/// Minify a chunk stylesheet with lightningcss.
pub fn minify_css(source: &str, name: &str) -> Result<String, PipelineError> {
    let error = |message: String| PipelineError::MinifyError {
        name: name.to_string(),
        message,
    };

    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename: name.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| error(e.to_string()))?;

    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|e| error(e.to_string()))?;

    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| error(e.to_string()))?;

    Ok(result.code)
}

/// Collapse whitespace between tags, leaving markup otherwise intact.
pub fn collapse_whitespace(html: &str) -> String {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = true;
    cfg.minify_css = false;
    cfg.minify_js = false;

    let minified = minify_html::minify(html.as_bytes(), &cfg);
    String::from_utf8_lossy(&minified).into_owned()
}
