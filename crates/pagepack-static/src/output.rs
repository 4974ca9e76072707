//! In-memory build output and the clean-and-emit step.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use pagepack_pipeline::Bundle;

use crate::builder::BuildError;

/// Script and stylesheet URLs pages load, in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkManifest {
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
}

impl ChunkManifest {
    pub fn from_bundle(bundle: &Bundle, public_path: &str) -> Self {
        let url = |name: &str| format!("{}{}", public_path, name);
        Self {
            scripts: bundle.scripts().into_iter().map(url).collect(),
            styles: bundle.styles().into_iter().map(url).collect(),
        }
    }
}

/// Every file of a build, keyed by `/`-separated path relative to the output
/// directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    files: BTreeMap<String, Vec<u8>>,
}

impl BuildOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Replace `dir` with exactly these files.
    ///
    /// Files are written to a staging directory next to `dir` first; `dir` is
    /// only removed once every write succeeded.
    pub fn emit(&self, dir: &Path) -> Result<(), BuildError> {
        let staging = staging_dir(dir);

        if staging.exists() {
            fs::remove_dir_all(&staging)
                .map_err(|e| BuildError::WriteError(format!("{}: {}", staging.display(), e)))?;
        }

        if let Err(e) = self.write_all(&staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if dir.exists() {
            fs::remove_dir_all(dir)
                .map_err(|e| BuildError::WriteError(format!("{}: {}", dir.display(), e)))?;
        }

        fs::rename(&staging, dir)
            .map_err(|e| BuildError::WriteError(format!("{}: {}", dir.display(), e)))?;

        Ok(())
    }

    fn write_all(&self, root: &Path) -> Result<(), BuildError> {
        fs::create_dir_all(root)
            .map_err(|e| BuildError::WriteError(format!("{}: {}", root.display(), e)))?;

        for (path, contents) in &self.files {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    BuildError::WriteError(format!("{}: {}", parent.display(), e))
                })?;
            }
            fs::write(&target, contents)
                .map_err(|e| BuildError::WriteError(format!("{}: {}", target.display(), e)))?;
        }

        Ok(())
    }
}

fn staging_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    dir.with_file_name(format!(".{}.pagepack-staging", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn emit_replaces_directory_contents() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("docs");
        fs::create_dir_all(dir.join("img")).unwrap();
        fs::write(dir.join("img/stale.png"), b"old").unwrap();

        let mut output = BuildOutput::new();
        output.insert("index.html", "<html></html>");
        output.insert("img/logo.png", b"png".to_vec());
        output.emit(&dir).unwrap();

        assert!(dir.join("index.html").is_file());
        assert!(dir.join("img/logo.png").is_file());
        assert!(!dir.join("img/stale.png").exists());
        assert!(!staging_dir(&dir).exists());
    }

    #[test]
    fn emit_creates_missing_directory() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("out");

        let mut output = BuildOutput::new();
        output.insert("main.js", "1");
        output.emit(&dir).unwrap();

        assert_eq!(fs::read_to_string(dir.join("main.js")).unwrap(), "1");
    }

    #[test]
    fn keeps_paths_sorted() {
        let mut output = BuildOutput::new();
        output.insert("main.js", "");
        output.insert("about-us.html", "");
        output.insert("img/a.png", "");

        let paths: Vec<&str> = output.paths().collect();
        assert_eq!(paths, vec!["about-us.html", "img/a.png", "main.js"]);
    }

    #[test]
    fn staging_is_a_sibling() {
        assert_eq!(
            staging_dir(Path::new("/site/docs")),
            PathBuf::from("/site/.docs.pagepack-staging")
        );
    }
}
