//! Module graph collected from the entry script.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use pagepack_descriptor::{Descriptor, Stage};

use crate::assets::{emit_asset, AssetSet};
use crate::resolve::{is_vendor, module_id, normalize, Resolver};
use crate::script::{self, DependencyKind, DependencyTarget};
use crate::traits::PipelineError;

/// Script extensions loaded as JavaScript modules.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// What kind of file a registry module came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    Json,
    Asset,
}

/// A module in the registry.
#[derive(Debug, Clone)]
pub struct Module {
    /// Registry id
    pub id: String,

    pub path: PathBuf,

    pub kind: ModuleKind,

    /// Resolved from `node_modules`
    pub vendor: bool,

    /// Rewritten module body
    pub code: String,
}

/// A style file imported by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleImport {
    pub path: PathBuf,
    pub stages: Vec<Stage>,
    pub vendor: bool,
}

/// Modules and style imports reachable from the entry, in discovery order.
#[derive(Debug)]
pub struct ModuleGraph {
    pub entry: String,
    pub modules: Vec<Module>,
    pub styles: Vec<StyleImport>,
    pub assets: AssetSet,
}

impl ModuleGraph {
    /// Walk the graph from the descriptor's entry script.
    pub fn build(descriptor: &Descriptor) -> Result<Self, PipelineError> {
        let entry_path = normalize(&descriptor.entry_path());
        if !entry_path.is_file() {
            return Err(PipelineError::ReadError {
                path: entry_path.display().to_string(),
                message: "entry script not found".to_string(),
            });
        }

        let mut walker = Walker {
            descriptor,
            resolver: Resolver::new(&descriptor.root),
            root: normalize(&descriptor.root),
            visited: HashMap::new(),
            modules: Vec::new(),
            styles: Vec::new(),
            assets: AssetSet::new(),
        };

        let entry = walker.visit_script(&entry_path)?;

        tracing::debug!(
            "Module graph: {} modules, {} styles, {} assets",
            walker.modules.len(),
            walker.styles.len(),
            walker.assets.len()
        );

        Ok(Self {
            entry,
            modules: walker.modules,
            styles: walker.styles,
            assets: walker.assets,
        })
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }
}

struct Walker<'a> {
    descriptor: &'a Descriptor,
    resolver: Resolver,
    root: PathBuf,
    /// Path to the target emitted for it
    visited: HashMap<PathBuf, DependencyTarget>,
    modules: Vec<Module>,
    styles: Vec<StyleImport>,
    assets: AssetSet,
}

impl Walker<'_> {
    /// Visit a dependency and return how importers refer to it.
    fn visit(&mut self, path: &Path, importer: &Path) -> Result<DependencyTarget, PipelineError> {
        if let Some(target) = self.visited.get(path) {
            return Ok(target.clone());
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        if let Some(stages) = self.descriptor.style_stages(path) {
            self.visited
                .insert(path.to_path_buf(), DependencyTarget::Removed);
            self.styles.push(StyleImport {
                path: path.to_path_buf(),
                stages,
                vendor: is_vendor(path),
            });
            return Ok(DependencyTarget::Removed);
        }

        if SCRIPT_EXTENSIONS.contains(&ext) {
            let id = self.visit_script(path)?;
            return Ok(DependencyTarget::Module(id));
        }

        if ext == "json" {
            let id = self.add_json(path)?;
            return Ok(DependencyTarget::Module(id));
        }

        if self.descriptor.asset_rule(path).is_some() {
            let id = self.add_asset(path, importer)?;
            return Ok(DependencyTarget::Module(id));
        }

        Err(PipelineError::NoRule {
            path: path.display().to_string(),
            importer: importer.display().to_string(),
        })
    }

    fn visit_script(&mut self, path: &Path) -> Result<String, PipelineError> {
        let id = module_id(path, &self.root);
        // Registered before its dependencies so import cycles terminate
        self.visited
            .insert(path.to_path_buf(), DependencyTarget::Module(id.clone()));

        let source = read(path)?;
        let syntax = script::scan(&source, path)?;
        let dir = path.parent().unwrap_or(Path::new(""));

        let mut targets: HashMap<String, DependencyTarget> = HashMap::new();
        for dep in &syntax.dependencies {
            if targets.contains_key(&dep.specifier) {
                continue;
            }

            let Some(resolved) = self.resolver.resolve(&dep.specifier, dir) else {
                if dep.kind == DependencyKind::Require {
                    // Optional requires inside packages are commonly guarded at runtime
                    tracing::warn!(
                        "Cannot resolve require('{}') in {}; left as is",
                        dep.specifier,
                        path.display()
                    );
                    continue;
                }
                return Err(PipelineError::Unresolved {
                    specifier: dep.specifier.clone(),
                    importer: path.display().to_string(),
                });
            };

            let target = self.visit(&resolved, path)?;
            targets.insert(dep.specifier.clone(), target);
        }

        let code = script::rewrite(&source, &syntax, &targets, self.descriptor.mode.as_str());

        self.modules.push(Module {
            id: id.clone(),
            path: path.to_path_buf(),
            kind: ModuleKind::Script,
            vendor: is_vendor(path),
            code,
        });

        Ok(id)
    }

    fn add_json(&mut self, path: &Path) -> Result<String, PipelineError> {
        let source = read(path)?;
        let value: serde_json::Value =
            serde_json::from_str(&source).map_err(|e| PipelineError::InvalidJson {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let id = module_id(path, &self.root);
        self.register(path, &id, ModuleKind::Json, format!("module.exports = {};", value));
        Ok(id)
    }

    fn add_asset(&mut self, path: &Path, importer: &Path) -> Result<String, PipelineError> {
        let asset = emit_asset(self.descriptor, path, importer)?;
        let url = format!("{}{}", self.descriptor.output.public_path, asset.name);
        self.assets.insert(asset)?;

        let id = module_id(path, &self.root);
        let code = format!(
            "module.exports = {};",
            serde_json::Value::String(url)
        );
        self.register(path, &id, ModuleKind::Asset, code);
        Ok(id)
    }

    fn register(&mut self, path: &Path, id: &str, kind: ModuleKind, code: String) {
        self.visited.insert(
            path.to_path_buf(),
            DependencyTarget::Module(id.to_string()),
        );
        self.modules.push(Module {
            id: id.to_string(),
            path: path.to_path_buf(),
            kind,
            vendor: is_vendor(path),
            code,
        });
    }
}

fn read(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|e| PipelineError::ReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepack_descriptor::Mode;
    use tempfile::tempdir;

    fn project() -> (tempfile::TempDir, Descriptor) {
        let temp = tempdir().unwrap();
        let descriptor = Descriptor::new(temp.path(), Mode::Production);
        fs::create_dir_all(descriptor.context.join("styles")).unwrap();
        fs::create_dir_all(descriptor.context.join("img")).unwrap();
        (temp, descriptor)
    }

    #[test]
    fn collects_scripts_styles_and_assets() {
        let (_temp, d) = project();
        let src = &d.context;
        fs::write(
            src.join("index.js"),
            "import './styles/main.scss';\nimport logo from './img/logo.png';\nimport { greet } from './greet';\ngreet(logo);\n",
        )
        .unwrap();
        fs::write(
            src.join("greet.js"),
            "import './styles/greet.css';\nexport function greet(x) { console.log(x); }\n",
        )
        .unwrap();
        fs::write(src.join("styles/main.scss"), "body { margin: 0; }").unwrap();
        fs::write(src.join("styles/greet.css"), ".greet { color: red; }").unwrap();
        fs::write(src.join("img/logo.png"), b"png").unwrap();

        let graph = ModuleGraph::build(&d).unwrap();

        assert_eq!(graph.entry, "./src/index.js");
        let ids: Vec<&str> = graph.modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["./src/img/logo.png", "./src/greet.js", "./src/index.js"]);

        let styles: Vec<PathBuf> = graph.styles.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            styles,
            vec![src.join("styles/main.scss"), src.join("styles/greet.css")]
        );

        let logo = graph.module("./src/img/logo.png").unwrap();
        assert_eq!(logo.code, "module.exports = \"img/logo.png\";");
        assert_eq!(graph.assets.len(), 1);

        let entry = graph.module("./src/index.js").unwrap();
        assert!(!entry.code.contains("main.scss"));
        assert!(entry.code.contains("require(\"./src/greet.js\")"));
    }

    #[test]
    fn marks_vendor_modules() {
        let (temp, d) = project();
        let pkg = temp.path().join("node_modules/tiny");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("index.js"), "module.exports = function () {};").unwrap();
        fs::write(
            d.context.join("index.js"),
            "import tiny from 'tiny';\ntiny();\n",
        )
        .unwrap();

        let graph = ModuleGraph::build(&d).unwrap();
        let vendor = graph.module("./node_modules/tiny/index.js").unwrap();
        assert!(vendor.vendor);
        assert!(!graph.module("./src/index.js").unwrap().vendor);
    }

    #[test]
    fn skips_require_text_in_strings() {
        let (_temp, d) = project();
        fs::write(d.context.join("a.js"), "module.exports = 1;\n").unwrap();
        fs::write(
            d.context.join("index.js"),
            "console.log(\"use require('./a') to load\");\n",
        )
        .unwrap();

        let graph = ModuleGraph::build(&d).unwrap();
        assert!(graph.module("./src/a.js").is_none());
        assert!(graph
            .module("./src/index.js")
            .unwrap()
            .code
            .contains("\"use require('./a') to load\""));
    }

    #[test]
    fn handles_import_cycles() {
        let (_temp, d) = project();
        fs::write(d.context.join("index.js"), "import { a } from './a';\na();\n").unwrap();
        fs::write(
            d.context.join("a.js"),
            "import { b } from './b';\nexport function a() { return b; }\n",
        )
        .unwrap();
        fs::write(
            d.context.join("b.js"),
            "import { a } from './a';\nexport const b = 1;\n",
        )
        .unwrap();

        let graph = ModuleGraph::build(&d).unwrap();
        assert_eq!(graph.modules.len(), 3);
    }

    #[test]
    fn loads_json_modules() {
        let (_temp, d) = project();
        fs::write(d.context.join("index.js"), "import data from './data.json';\n").unwrap();
        fs::write(d.context.join("data.json"), "{\"phone\": \"555\"}").unwrap();

        let graph = ModuleGraph::build(&d).unwrap();
        let json = graph.module("./src/data.json").unwrap();
        assert_eq!(json.kind, ModuleKind::Json);
        assert_eq!(json.code, "module.exports = {\"phone\":\"555\"};");
    }

    #[test]
    fn unresolved_import_is_fatal() {
        let (_temp, d) = project();
        fs::write(d.context.join("index.js"), "import './missing';\n").unwrap();

        let err = ModuleGraph::build(&d).unwrap_err();
        assert!(matches!(err, PipelineError::Unresolved { .. }));
    }

    #[test]
    fn file_without_rule_is_fatal() {
        let (_temp, d) = project();
        fs::write(d.context.join("index.js"), "import './notes.txt';\n").unwrap();
        fs::write(d.context.join("notes.txt"), "hi").unwrap();

        let err = ModuleGraph::build(&d).unwrap_err();
        assert!(matches!(err, PipelineError::NoRule { .. }));
        assert!(err.to_string().contains("index.js"));
    }

    #[test]
    fn missing_entry_is_fatal() {
        let (_temp, d) = project();
        let err = ModuleGraph::build(&d).unwrap_err();
        assert!(err.to_string().contains("index.js"));
    }
}
