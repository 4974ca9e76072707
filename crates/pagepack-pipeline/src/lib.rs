//! Loaders that turn source files into bundles.
//!
//! Scripts are collected into a module graph starting at the entry script and
//! emitted as chunks. Style files imported along the way run through their
//! stage pipeline and are extracted into chunk CSS files. Images and fonts are
//! emitted under templated names.

pub mod assets;
pub mod bundle;
pub mod chunk;
pub mod graph;
pub mod minify;
pub mod resolve;
pub mod script;
pub mod style;
pub mod traits;

pub use assets::{asset_name, AssetSet, EmittedAsset};
pub use bundle::{Bundle, Bundler, Chunk, EmittedFile};
pub use chunk::{render_filename, MAIN_CHUNK, VENDOR_CHUNK};
pub use graph::{Module, ModuleGraph, ModuleKind, StyleImport};
pub use minify::{collapse_whitespace, minify_css, minify_js};
pub use resolve::{module_id, normalize, relative_path, Resolver};
pub use style::StylePipeline;
pub use traits::{LoaderContext, PipelineError, StyleLoader, StyleSource};
