//! Bundling: module graph to chunk scripts, chunk styles and assets.

use pagepack_descriptor::{Descriptor, Optimization};

use crate::assets::EmittedAsset;
use crate::chunk::{
    render_filename, render_main_chunk, render_module_chunk, MAIN_CHUNK, VENDOR_CHUNK,
};
use crate::graph::{Module, ModuleGraph};
use crate::minify::{minify_css, minify_js};
use crate::style::{asset_url_prefix, StylePipeline};
use crate::traits::PipelineError;

/// A generated text file and where it goes in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    pub filename: String,
    pub contents: String,
}

/// One chunk's script and extracted stylesheet.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub name: String,
    pub script: Option<EmittedFile>,
    pub style: Option<EmittedFile>,
}

/// Everything the entry script produces.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    /// In load order: vendor chunk first
    pub chunks: Vec<Chunk>,
    pub assets: Vec<EmittedAsset>,
}

impl Bundle {
    /// Script filenames in load order.
    pub fn scripts(&self) -> Vec<&str> {
        self.chunks
            .iter()
            .filter_map(|c| c.script.as_ref())
            .map(|f| f.filename.as_str())
            .collect()
    }

    /// Stylesheet filenames in load order.
    pub fn styles(&self) -> Vec<&str> {
        self.chunks
            .iter()
            .filter_map(|c| c.style.as_ref())
            .map(|f| f.filename.as_str())
            .collect()
    }

    /// All chunk files.
    pub fn files(&self) -> impl Iterator<Item = &EmittedFile> {
        self.chunks
            .iter()
            .flat_map(|c| c.script.iter().chain(c.style.iter()))
    }
}

/// Builds bundles for one descriptor.
pub struct Bundler<'a> {
    descriptor: &'a Descriptor,
    optimization: Optimization,
    styles: StylePipeline,
}

impl<'a> Bundler<'a> {
    pub fn new(descriptor: &'a Descriptor) -> Result<Self, PipelineError> {
        Ok(Self {
            descriptor,
            optimization: descriptor.optimization(),
            styles: StylePipeline::new(descriptor)?,
        })
    }

    pub fn bundle(&self) -> Result<Bundle, PipelineError> {
        let graph = ModuleGraph::build(self.descriptor)?;
        let split = self.optimization.split_chunks;

        let chunk_of = |vendor: bool| {
            if split && vendor {
                VENDOR_CHUNK
            } else {
                MAIN_CHUNK
            }
        };

        let prefix = asset_url_prefix(
            &self.descriptor.output.public_path,
            &self.descriptor.output.style_filename,
        );
        let files: Vec<_> = graph
            .styles
            .iter()
            .map(|s| (s.path.clone(), s.stages.clone()))
            .collect();
        let processed = self.styles.process_all(self.descriptor, &files, &prefix)?;

        let ModuleGraph {
            entry,
            modules,
            styles,
            mut assets,
        } = graph;

        let mut chunks = Vec::new();
        for name in [VENDOR_CHUNK, MAIN_CHUNK] {
            let members: Vec<&Module> = modules
                .iter()
                .filter(|m| chunk_of(m.vendor) == name)
                .collect();

            let css: Vec<&str> = styles
                .iter()
                .zip(&processed)
                .filter(|(import, _)| chunk_of(import.vendor) == name)
                .map(|(_, out)| out.css.as_str())
                .collect();

            if name == VENDOR_CHUNK && members.is_empty() && css.is_empty() {
                continue;
            }

            let script = if name == MAIN_CHUNK {
                render_main_chunk(&members, &entry)
            } else if members.is_empty() {
                String::new()
            } else {
                render_module_chunk(&members)
            };

            chunks.push(Chunk {
                name: name.to_string(),
                script: self.emit_script(name, script)?,
                style: self.emit_style(name, css.join("\n"))?,
            });
        }

        for out in processed {
            for asset in out.assets {
                assets.insert(asset)?;
            }
        }

        let bundle = Bundle {
            chunks,
            assets: assets.into_vec(),
        };

        tracing::debug!(
            "Bundled {} chunks, {} assets",
            bundle.chunks.len(),
            bundle.assets.len()
        );

        Ok(bundle)
    }

    fn emit_script(&self, name: &str, code: String) -> Result<Option<EmittedFile>, PipelineError> {
        if code.is_empty() {
            return Ok(None);
        }
        let filename = render_filename(&self.descriptor.output.script_filename, name, code.as_bytes());
        let contents = if self.optimization.minimize {
            minify_js(&code, &filename)?
        } else {
            code
        };
        Ok(Some(EmittedFile { filename, contents }))
    }

    fn emit_style(&self, name: &str, css: String) -> Result<Option<EmittedFile>, PipelineError> {
        if css.trim().is_empty() {
            return Ok(None);
        }
        let filename = render_filename(&self.descriptor.output.style_filename, name, css.as_bytes());
        let contents = if self.optimization.minimize {
            minify_css(&css, &filename)?
        } else {
            css
        };
        Ok(Some(EmittedFile { filename, contents }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepack_descriptor::Mode;
    use std::fs;
    use tempfile::tempdir;

    fn project(mode: Mode) -> (tempfile::TempDir, Descriptor) {
        let temp = tempdir().unwrap();
        let d = Descriptor::new(temp.path(), mode);
        let src = &d.context;
        fs::create_dir_all(src.join("styles")).unwrap();
        fs::create_dir_all(src.join("img")).unwrap();
        fs::write(src.join("img/bg.png"), b"png").unwrap();
        fs::write(
            src.join("styles/main.scss"),
            "$pad: 4px;\n.hero { padding: $pad; background: url(../img/bg.png); }\n",
        )
        .unwrap();

        let pkg = temp.path().join("node_modules/tiny");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("index.js"), "module.exports = function () { return 'tiny-vendor'; };\n").unwrap();
        fs::write(pkg.join("tiny.css"), ".tiny { color: red; }\n").unwrap();

        fs::write(
            src.join("index.js"),
            "import './styles/main.scss';\nimport 'tiny/tiny.css';\nimport tiny from 'tiny';\nif (process.env.NODE_ENV !== 'production') { console.log(tiny()); }\n",
        )
        .unwrap();
        (temp, d)
    }

    #[test]
    fn production_splits_vendor_chunk() {
        let (_temp, d) = project(Mode::Production);
        let bundle = Bundler::new(&d).unwrap().bundle().unwrap();

        let names: Vec<&str> = bundle.chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![VENDOR_CHUNK, MAIN_CHUNK]);
        assert_eq!(bundle.scripts(), vec!["vendors~main.js", "main.js"]);
        assert_eq!(bundle.styles(), vec!["vendors~main.css", "main.css"]);

        let vendors = &bundle.chunks[0].script.as_ref().unwrap().contents;
        let main = &bundle.chunks[1].script.as_ref().unwrap().contents;
        assert!(vendors.contains("tiny-vendor"));
        assert!(!main.contains("tiny-vendor"));

        let main_css = &bundle.chunks[1].style.as_ref().unwrap().contents;
        assert!(!main_css.contains('\n'));
        assert!(main_css.contains("img/bg.png"));

        assert_eq!(bundle.assets.len(), 1);
        assert_eq!(bundle.assets[0].name, "img/bg.png");
    }

    #[test]
    fn development_keeps_one_chunk() {
        let (_temp, d) = project(Mode::Development);
        let bundle = Bundler::new(&d).unwrap().bundle().unwrap();

        assert_eq!(bundle.scripts(), vec!["main.js"]);
        assert_eq!(bundle.styles(), vec!["main.css"]);

        let main = &bundle.chunks[0].script.as_ref().unwrap().contents;
        assert!(main.contains("./node_modules/tiny/index.js"));
        assert!(main.contains("\"development\" !== 'production'"));

        let css = &bundle.chunks[0].style.as_ref().unwrap().contents;
        assert!(css.contains(".tiny"));
        assert!(css.find(".hero").unwrap() < css.find(".tiny").unwrap());
    }

    #[test]
    fn bundling_is_deterministic() {
        let (_temp, d) = project(Mode::Production);
        let first = Bundler::new(&d).unwrap().bundle().unwrap();
        let second = Bundler::new(&d).unwrap().bundle().unwrap();

        let a: Vec<_> = first.files().cloned().collect();
        let b: Vec<_> = second.files().cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn hashed_filenames_follow_contents() {
        let (_temp, mut d) = project(Mode::Production);
        d.output.script_filename = "js/[name].[contenthash].js".to_string();
        let bundle = Bundler::new(&d).unwrap().bundle().unwrap();

        for script in bundle.scripts() {
            assert!(script.starts_with("js/"));
            assert!(script.ends_with(".js"));
        }
    }

    fn import_plain_css(d: &Descriptor) {
        fs::write(
            d.context.join("styles/reset.css"),
            ".reset { margin: 0; }\n",
        )
        .unwrap();
        fs::write(
            d.context.join("styles/site.css"),
            "@import \"./reset.css\";\n.site { color: red; }\n",
        )
        .unwrap();
        fs::write(
            d.context.join("index.js"),
            "import './styles/main.scss';\nimport './styles/site.css';\n",
        )
        .unwrap();
    }

    #[test]
    fn development_inlines_css_imports() {
        let (_temp, d) = project(Mode::Development);
        import_plain_css(&d);
        let bundle = Bundler::new(&d).unwrap().bundle().unwrap();

        let css = &bundle.chunks[0].style.as_ref().unwrap().contents;
        assert!(!css.contains("@import"));
        assert!(css.contains(".reset"));
        assert!(css.find(".hero").unwrap() < css.find(".reset").unwrap());
        assert!(css.find(".reset").unwrap() < css.find(".site").unwrap());
    }

    #[test]
    fn production_minifies_inlined_css_imports() {
        let (_temp, d) = project(Mode::Production);
        import_plain_css(&d);
        let bundle = Bundler::new(&d).unwrap().bundle().unwrap();

        let css = &bundle.chunks[0].style.as_ref().unwrap().contents;
        assert!(!css.contains("@import"));
        assert!(css.contains(".reset"));
        assert!(css.contains(".site"));
    }
}
