//! Module specifier resolution and path helpers.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Extensions tried, in order, when a specifier names a file without one.
const EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "json"];

/// Resolves import specifiers to files on disk.
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
}

impl Resolver {
    /// `root` bounds the upward `node_modules` search.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
        }
    }

    /// Resolve `specifier` as imported from a file in `importer_dir`.
    pub fn resolve(&self, specifier: &str, importer_dir: &Path) -> Option<PathBuf> {
        if is_relative(specifier) {
            return resolve_file(&normalize(&importer_dir.join(specifier)));
        }

        if Path::new(specifier).is_absolute() {
            return resolve_file(&normalize(Path::new(specifier)));
        }

        self.resolve_package(specifier, importer_dir)
    }

    fn resolve_package(&self, specifier: &str, importer_dir: &Path) -> Option<PathBuf> {
        let (name, subpath) = split_package(specifier);

        for dir in importer_dir.ancestors() {
            let package_dir = dir.join("node_modules").join(name);
            if package_dir.is_dir() {
                let resolved = match subpath {
                    Some(sub) => resolve_file(&normalize(&package_dir.join(sub))),
                    None => resolve_package_entry(&package_dir),
                };
                if resolved.is_some() {
                    return resolved;
                }
            }
            if dir == self.root {
                break;
            }
        }

        None
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Split `@scope/pkg/sub/path` into `@scope/pkg` and `sub/path`.
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let name_segments = if specifier.starts_with('@') { 2 } else { 1 };

    let mut end = specifier.len();
    let mut seen = 0;
    for (i, c) in specifier.char_indices() {
        if c == '/' {
            seen += 1;
            if seen == name_segments {
                end = i;
                break;
            }
        }
    }

    if end < specifier.len() {
        (&specifier[..end], Some(&specifier[end + 1..]))
    } else {
        (specifier, None)
    }
}

fn resolve_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    for ext in EXTENSIONS {
        let candidate = PathBuf::from(format!("{}.{}", path.display(), ext));
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if path.is_dir() {
        if path.join("package.json").is_file() {
            if let Some(entry) = resolve_package_entry(path) {
                return Some(entry);
            }
        }
        let index = path.join("index.js");
        if index.is_file() {
            return Some(index);
        }
    }

    None
}

/// Entry file of a package: `module`, then `main`, then `index.js`.
fn resolve_package_entry(package_dir: &Path) -> Option<PathBuf> {
    let manifest = fs::read_to_string(package_dir.join("package.json"))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok());

    if let Some(manifest) = manifest {
        for field in ["module", "main"] {
            if let Some(entry) = manifest.get(field).and_then(|v| v.as_str()) {
                let candidate = normalize(&package_dir.join(entry));
                if candidate == package_dir {
                    continue;
                }
                if let Some(found) = resolve_file(&candidate) {
                    return Some(found);
                }
            }
        }
    }

    let index = package_dir.join("index.js");
    index.is_file().then_some(index)
}

/// Lexically normalize a path, folding `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last = out.components().next_back();
                match last {
                    Some(Component::Normal(_)) => {
                        out.pop();
                    }
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                    _ => out.push(".."),
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// `path` relative to `base`, using `..` where `path` is outside `base`.
///
/// Both paths are expected to be normalized and of the same kind.
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// Stable module id: the path relative to the project root, `./`-prefixed,
/// with forward slashes.
pub fn module_id(path: &Path, root: &Path) -> String {
    let relative = relative_path(path, root);
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");

    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}

/// Whether the path lies inside a `node_modules` directory.
pub fn is_vendor(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == "node_modules")
}
