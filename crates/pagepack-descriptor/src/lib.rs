//! Build descriptor for pagepack.
//!
//! Declares what a build produces: the HTML pages and their templates, the
//! style and asset rules applied to imported files, the directories copied
//! verbatim, and the build mode that selects optimizations.

pub mod descriptor;
pub mod mode;
pub mod page;
pub mod rules;

pub use descriptor::{
    CopyRule, Descriptor, DescriptorError, DevServerOptions, OutputOptions, DEFAULT_BROWSERSLIST,
};
pub use mode::{Mode, Optimization, MODE_ENV_VAR};
pub use page::{default_pages, PageEntry};
pub use rules::{default_asset_rules, default_style_rules, AssetRule, Stage, StyleRule};
