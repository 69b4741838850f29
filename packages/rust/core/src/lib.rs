//! Core build engine for helpforge.
//!
//! This crate holds the TOC tree engine, per-group build state and the
//! format assemblers, and ties them together into the end-to-end `build`
//! workflow ([`pipeline::build_help`]).

pub mod assembler;
pub mod context;
pub mod merge;
pub mod object;
pub mod pipeline;
pub mod registry;
pub mod toc;

pub use assembler::{
    ArtifactMeta, AssemblerScope, ConceptualFormatAssembler, FinishedGroup, FormatAssembler,
    ReferenceFormatAssembler, assembler_for,
};
pub use context::{BuildConfiguration, BuildSession, GroupContext, PropertyDerivation};
pub use merge::merge_master;
pub use object::{BuildObject, find_by_key};
pub use pipeline::{BuildReport, BuildTool, NoopTool, ProgressReporter, SilentProgress, build_help};
pub use registry::TocRegistry;
pub use toc::{TocLayout, TocRecord, TocTree};
