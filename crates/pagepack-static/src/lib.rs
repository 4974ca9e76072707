//! Static build orchestration for pagepack.
//!
//! Runs the bundler, applies copy rules and assembles every page into an
//! in-memory output, then swaps it into the output directory in one step.

pub mod builder;
pub mod output;
pub mod templates;

pub use builder::{BuildError, BuildResult, InMemoryBuild, StaticBuilder};
pub use output::{BuildOutput, ChunkManifest};
pub use templates::{inject_tags, PageAssembler};
