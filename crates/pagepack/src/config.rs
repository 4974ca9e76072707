//! Configuration file (pagepack.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pagepack_descriptor::{CopyRule, Descriptor, Mode, PageEntry};
use serde::Deserialize;

/// Configuration file structure. Every field is optional; anything missing
/// keeps the built-in default.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default)]
    output: OutputConfig,
    #[serde(default)]
    dev_server: DevServerConfig,
    #[serde(default)]
    styles: StylesConfig,
    pages: Option<Vec<PageConfig>>,
    copy: Option<Vec<CopyConfig>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PathsConfig {
    context: Option<PathBuf>,
    entry: Option<String>,
    output: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfig {
    script_filename: Option<String>,
    style_filename: Option<String>,
    public_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DevServerConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StylesConfig {
    browserslist: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PageConfig {
    filename: String,
    template: Option<PathBuf>,
    #[serde(default = "default_minify")]
    minify_on_production: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CopyConfig {
    from: PathBuf,
    to: PathBuf,
}

fn default_minify() -> bool {
    true
}

/// A loaded configuration and the project root it applies to.
#[derive(Debug)]
pub struct LoadedConfig {
    pub root: PathBuf,
    pub file: ConfigFile,
}

impl LoadedConfig {
    /// Build the descriptor for `mode`.
    pub fn descriptor(self, mode: Mode) -> Descriptor {
        self.file.into_descriptor(&self.root, mode)
    }
}

/// Load `path` if it exists. The project root is the file's directory.
///
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<LoadedConfig> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let path = cwd.join(path);
    let root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.clone());

    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(LoadedConfig {
            root,
            file: ConfigFile::default(),
        });
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file = parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());

    Ok(LoadedConfig { root, file })
}

fn parse_config(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

impl ConfigFile {
    fn into_descriptor(self, root: &Path, mode: Mode) -> Descriptor {
        let mut d = Descriptor::new(root, mode);

        if let Some(context) = self.paths.context {
            d.context = root.join(context);
        }
        if let Some(entry) = self.paths.entry {
            d.entry = entry;
        }
        if let Some(output) = self.paths.output {
            d.output.dir = root.join(output);
        }

        if let Some(name) = self.output.script_filename {
            d.output.script_filename = name;
        }
        if let Some(name) = self.output.style_filename {
            d.output.style_filename = name;
        }
        if let Some(public_path) = self.output.public_path {
            d.output.public_path = public_path;
        }

        if let Some(host) = self.dev_server.host {
            d.dev_server.host = host;
        }
        if let Some(port) = self.dev_server.port {
            d.dev_server.port = port;
        }

        if let Some(browserslist) = self.styles.browserslist {
            d.browserslist = browserslist;
        }

        if let Some(pages) = self.pages {
            d.pages = pages
                .into_iter()
                .map(|p| PageEntry {
                    template: p.template.unwrap_or_else(|| PathBuf::from(&p.filename)),
                    filename: p.filename,
                    minify_on_production: p.minify_on_production,
                })
                .collect();
        }

        if let Some(copy) = self.copy {
            d.copy = copy
                .into_iter()
                .map(|c| CopyRule {
                    from: c.from,
                    to: c.to,
                })
                .collect();
        }

        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_keeps_defaults() {
        let d = parse_config("")
            .unwrap()
            .into_descriptor(Path::new("/site"), Mode::Production);

        assert_eq!(d.context, PathBuf::from("/site/src"));
        assert_eq!(d.output.dir, PathBuf::from("/site/docs"));
        assert_eq!(d.pages.len(), 5);
        assert_eq!(d.dev_server.port, 4200);
    }

    #[test]
    fn overrides_sections() {
        let toml = r#"
[paths]
context = "web"
output = "public"

[output]
script_filename = "js/[name].[contenthash].js"

[dev_server]
port = 8080

[styles]
browserslist = ["last 2 versions"]

[[pages]]
filename = "index.html"

[[pages]]
filename = "team.html"
template = "pages/team.html"
minify_on_production = false

[[copy]]
from = "fonts"
to = "assets/fonts"
"#;
        let d = parse_config(toml)
            .unwrap()
            .into_descriptor(Path::new("/site"), Mode::Development);

        assert_eq!(d.context, PathBuf::from("/site/web"));
        assert_eq!(d.output.dir, PathBuf::from("/site/public"));
        assert_eq!(d.output.script_filename, "js/[name].[contenthash].js");
        assert_eq!(d.output.style_filename, "[name].css");
        assert_eq!(d.dev_server.port, 8080);
        assert_eq!(d.browserslist, vec!["last 2 versions".to_string()]);
        assert_eq!(d.pages.len(), 2);
        assert_eq!(d.pages[0].template, PathBuf::from("index.html"));
        assert_eq!(d.pages[1].template, PathBuf::from("pages/team.html"));
        assert!(!d.pages[1].minify_on_production);
        assert_eq!(d.copy[0].to, PathBuf::from("assets/fonts"));
        assert_eq!(d.mode, Mode::Development);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse_config("[paths]\nsource = \"src\"\n").is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let loaded = load_config(&temp.path().join("pagepack.toml")).unwrap();

        assert_eq!(loaded.root, temp.path());
        assert_eq!(loaded.descriptor(Mode::Production).pages.len(), 5);
    }
}
