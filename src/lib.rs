// Copyright 2026 the GameJS authors. MIT license.

//! Incremental script compilation and vendor bundling for GameJS projects.
//!
//! A project keeps user-authored TypeScript under `scripts/` and receives
//! browser-loadable ES modules under `.gamejs/scripts/compiled-scripts/`.
//! Third-party packages imported by those scripts are bundled once into
//! `.gamejs/scripts/vendor/vendor.js`, exposed to the runtime's module
//! loader through per-package proxy modules and an import map.
//!
//! [`ScriptPipeline`] is the entry point: it watches projects, recompiles
//! changed scripts, keeps the vendor bundle fresh, and answers status
//! queries from the editor.

pub mod analyzer;
pub mod bundler;
pub mod compiler;
pub mod manifest;
pub mod pipeline;
pub mod util;
pub mod vendor;
pub mod watcher;

pub use bundler::BundleOptions;
pub use bundler::BundleProvider;
pub use bundler::EsbuildBundler;
pub use compiler::CompileError;
pub use pipeline::CompilationStatus;
pub use pipeline::CompileScriptResult;
pub use pipeline::ScriptPipeline;
pub use util::path::ProjectPaths;
pub use watcher::ProjectWatchState;

pub type AnyError = anyhow::Error;
