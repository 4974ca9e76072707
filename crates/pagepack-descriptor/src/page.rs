//! Page entries: one generated HTML file per template.

use std::path::PathBuf;

use serde::Serialize;

/// A page produced by the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageEntry {
    /// Output filename, relative to the output directory
    pub filename: String,

    /// Template path, relative to the context directory
    pub template: PathBuf,

    /// Collapse whitespace in production builds
    pub minify_on_production: bool,
}

impl PageEntry {
    /// A page whose template has the same name as its output file.
    pub fn new(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            template: PathBuf::from(&filename),
            filename,
            minify_on_production: true,
        }
    }

    /// Whether the page is minified under the given mode.
    pub fn minify(&self, mode: crate::Mode) -> bool {
        self.minify_on_production && mode.is_prod()
    }
}

/// The five pages of the default site.
pub fn default_pages() -> Vec<PageEntry> {
    [
        "index.html",
        "about-us.html",
        "contacts.html",
        "price-list.html",
        "services.html",
    ]
    .into_iter()
    .map(PageEntry::new)
    .collect()
}
