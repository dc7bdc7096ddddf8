// Copyright 2026 the GameJS authors. MIT license.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::bundler::BundleFormat;
use crate::bundler::BundleOptions;
use crate::bundler::BundlePlatform;
use crate::bundler::BundleProvider;
use crate::bundler::SourceMapType;

/// Language level compiled scripts target.
pub const COMPILE_TARGET: &str = "es2020";

/// Injected at the top of every compiled script: a minimal logging facade
/// the runtime code can rely on without importing anything.
pub const LOGGING_BANNER: &str = "globalThis.gamejs = globalThis.gamejs || { log: (...a) => console.log('[script]', ...a), warn: (...a) => console.warn('[script]', ...a), error: (...a) => console.error('[script]', ...a) };";

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
  #[error("script source not found: '{0}'")]
  EntryNotFound(PathBuf),
  #[error("failed to compile '{entry}': {message}")]
  Bundle { entry: PathBuf, message: String },
}

#[derive(Debug, Clone)]
pub struct CompiledModule {
  pub output_path: PathBuf,
  pub source_map_path: Option<PathBuf>,
}

/// Compiles one script entry into a standalone ES module on disk.
///
/// Stateless per call; all incremental bookkeeping lives in the watcher.
pub struct ModuleCompiler {
  provider: Arc<dyn BundleProvider>,
}

impl ModuleCompiler {
  pub fn new(provider: Arc<dyn BundleProvider>) -> Self {
    Self { provider }
  }

  /// One bundler invocation: ESM output for the browser, externals left
  /// as bare imports, linked source map next to the output. On failure
  /// the caller must not update its compiled index.
  pub async fn compile(
    &self,
    entry: &Path,
    output: &Path,
    external: Vec<String>,
    tsconfig: Option<PathBuf>,
  ) -> Result<CompiledModule, CompileError> {
    if !entry.is_file() {
      return Err(CompileError::EntryNotFound(entry.to_path_buf()));
    }

    let options = BundleOptions {
      entry_point: entry.to_path_buf(),
      output_path: output.to_path_buf(),
      external,
      format: BundleFormat::Esm,
      platform: BundlePlatform::Browser,
      target: Some(COMPILE_TARGET.to_string()),
      sourcemap: Some(SourceMapType::Linked),
      minify: false,
      tree_shaking: true,
      defines: dev_defines(),
      banner: Some(LOGGING_BANNER.to_string()),
      tsconfig,
    };

    let bundle =
      self
        .provider
        .bundle(options)
        .await
        .map_err(|err| CompileError::Bundle {
          entry: entry.to_path_buf(),
          message: format!("{:#}", err),
        })?;

    Ok(CompiledModule {
      output_path: bundle.output_path,
      source_map_path: bundle.source_map_path,
    })
  }
}

/// Fixed development-mode define for environment checks in dependencies.
pub fn dev_defines() -> IndexMap<String, String> {
  let mut defines = IndexMap::new();
  defines.insert(
    "process.env.NODE_ENV".to_string(),
    "\"development\"".to_string(),
  );
  defines
}
