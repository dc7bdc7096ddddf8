// Copyright 2026 the GameJS authors. MIT license.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::analyzer;
use crate::bundler::BundleProvider;
use crate::compiler::ModuleCompiler;
use crate::util::fs::collect_script_files;
use crate::util::fs::mtime_millis;
use crate::util::fs::remove_file_if_exists;
use crate::util::fs::write_file_with_parents;
use crate::util::path::relative_import_path;
use crate::util::path::sanitize_identifier;
use crate::util::path::ProjectPaths;
use crate::AnyError;

/// Synthetic entry compiled into the vendor bundle, deleted afterwards.
const VENDOR_ENTRY_NAME: &str = "vendor-entry.ts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorOutcome {
  /// No third-party dependencies are in use; nothing was touched.
  Skipped,
  /// The existing bundle is at least as new as every input.
  Fresh(PathBuf),
  /// Bundle, proxy modules and import maps were written anew.
  Rebuilt(PathBuf),
}

/// Makes sure the vendor bundle reflects the packages currently imported
/// by project scripts. Idempotent; cheap when nothing changed.
///
/// Rebuild failures are logged and the previous bundle (if any) stays
/// authoritative, so this never propagates an error to the scan loop.
pub async fn ensure_vendor_bundle(
  paths: &ProjectPaths,
  provider: &Arc<dyn BundleProvider>,
) -> VendorOutcome {
  let analysis = analyzer::analyze(paths).await;
  for package in &analysis.undeclared {
    log::warn!(
      "Script in '{}' imports '{}' which is not declared in package.json; \
       the import will be unresolvable at runtime",
      paths.root().display(),
      package
    );
  }
  if analysis.used_dependencies.is_empty() {
    return VendorOutcome::Skipped;
  }

  let bundle_path = paths.vendor_bundle();
  let existing = bundle_path.is_file();
  if existing {
    match is_bundle_fresh(paths, &bundle_path).await {
      Ok(true) => return VendorOutcome::Fresh(bundle_path),
      Ok(false) => {}
      Err(err) => {
        log::warn!(
          "Could not determine vendor bundle staleness for '{}': {:#}",
          paths.root().display(),
          err
        );
      }
    }
  }

  match rebuild(paths, provider, &analysis.used_dependencies).await {
    Ok(()) => {
      log::info!(
        "Vendor bundle for '{}' rebuilt with {} package(s)",
        paths.root().display(),
        analysis.used_dependencies.len()
      );
      VendorOutcome::Rebuilt(bundle_path)
    }
    Err(err) => {
      log::error!(
        "Vendor bundle rebuild failed for '{}': {:#}",
        paths.root().display(),
        err
      );
      if existing {
        VendorOutcome::Fresh(bundle_path)
      } else {
        VendorOutcome::Skipped
      }
    }
  }
}

/// The bundle is fresh when it is at least as new as every script file
/// and the dependency manifest.
async fn is_bundle_fresh(
  paths: &ProjectPaths,
  bundle_path: &std::path::Path,
) -> Result<bool, AnyError> {
  let bundle_mtime = mtime_millis(bundle_path).await?;

  let mut newest_input = 0u64;
  if paths.package_json().is_file() {
    newest_input = newest_input.max(mtime_millis(&paths.package_json()).await?);
  }
  let scripts_root = paths.scripts_root();
  for rel in collect_script_files(&scripts_root) {
    let source = paths.script_source(&rel);
    match mtime_millis(&source).await {
      Ok(mtime) => newest_input = newest_input.max(mtime),
      // A file deleted mid-check counts as a change.
      Err(_) => return Ok(false),
    }
  }

  Ok(bundle_mtime >= newest_input)
}

async fn rebuild(
  paths: &ProjectPaths,
  provider: &Arc<dyn BundleProvider>,
  packages: &BTreeSet<String>,
) -> Result<(), AnyError> {
  let vendor_dir = paths.vendor_dir();
  tokio::fs::create_dir_all(&vendor_dir)
    .await
    .with_context(|| {
      format!("Failed to create '{}'", vendor_dir.display())
    })?;

  let entry_path = vendor_dir.join(VENDOR_ENTRY_NAME);
  let entry_source: String = packages
    .iter()
    .map(|pkg| {
      format!("export * as {} from \"{}\";\n", sanitize_identifier(pkg), pkg)
    })
    .collect();
  write_file_with_parents(&entry_path, &entry_source)
    .await
    .with_context(|| {
      format!("Failed to write '{}'", entry_path.display())
    })?;

  // The vendor bundle is a compiled module like any other: same banner,
  // same target, same tsconfig pass-through. No externals, so every used
  // package is embedded.
  let bundle_path = paths.vendor_bundle();
  let compiler = ModuleCompiler::new(provider.clone());
  let result = compiler
    .compile(&entry_path, &bundle_path, Vec::new(), paths.tsconfig())
    .await;
  // The synthetic entry must never outlive the build, success or not.
  let _ = remove_file_if_exists(&entry_path).await;
  result?;

  write_proxy_modules(paths, packages).await?;
  write_import_maps(paths, packages).await?;
  Ok(())
}

/// One thin module per package, re-exporting its namespace binding and a
/// default from the bundle.
async fn write_proxy_modules(
  paths: &ProjectPaths,
  packages: &BTreeSet<String>,
) -> Result<(), AnyError> {
  let vendor_dir = paths.vendor_dir();
  let bundle_path = paths.vendor_bundle();
  for pkg in packages {
    let sanitized = sanitize_identifier(pkg);
    let proxy_path = vendor_dir.join(format!("{}.js", sanitized));
    let import_path = relative_import_path(&vendor_dir, &bundle_path);
    let source = format!(
      "import {{ {name} }} from \"{import_path}\";\n\
       export {{ {name} }};\n\
       export default {name}.default !== undefined ? {name}.default : {name};\n",
      name = sanitized,
      import_path = import_path,
    );
    write_file_with_parents(&proxy_path, &source)
      .await
      .with_context(|| {
        format!("Failed to write proxy module '{}'", proxy_path.display())
      })?;
  }
  Ok(())
}

/// The canonical import map in the vendor directory, duplicated into the
/// compiled-scripts directory for runtime consumers that only look there.
async fn write_import_maps(
  paths: &ProjectPaths,
  packages: &BTreeSet<String>,
) -> Result<(), AnyError> {
  let mut imports = serde_json::Map::new();
  for pkg in packages {
    imports.insert(
      pkg.clone(),
      serde_json::Value::String(ProjectPaths::proxy_url(
        &sanitize_identifier(pkg),
      )),
    );
  }
  let document = serde_json::json!({ "imports": imports });
  let text = serde_json::to_string_pretty(&document)?;

  for target in [paths.vendor_import_map(), paths.compiled_import_map()] {
    write_file_with_parents(&target, &text)
      .await
      .with_context(|| {
        format!("Failed to write import map '{}'", target.display())
      })?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use parking_lot::Mutex;
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;
  use crate::bundler::BundleOptions;
  use crate::bundler::BundleOutput;

  #[derive(Default)]
  struct CountingBundler {
    calls: Mutex<Vec<BundleOptions>>,
  }

  impl CountingBundler {
    fn builds(&self) -> usize {
      self.calls.lock().len()
    }
  }

  #[async_trait]
  impl BundleProvider for CountingBundler {
    async fn bundle(
      &self,
      options: BundleOptions,
    ) -> Result<BundleOutput, AnyError> {
      self.calls.lock().push(options.clone());
      write_file_with_parents(&options.output_path, "// vendor\n").await?;
      Ok(BundleOutput {
        output_path: options.output_path,
        source_map_path: None,
      })
    }
  }

  fn project_with_dependency() -> (TempDir, ProjectPaths) {
    let dir = TempDir::new().unwrap();
    let paths = ProjectPaths::new(dir.path());
    std::fs::create_dir_all(paths.scripts_root()).unwrap();
    std::fs::write(
      paths.root().join("package.json"),
      r#"{ "dependencies": { "three": "1" } }"#,
    )
    .unwrap();
    std::fs::write(
      paths.scripts_root().join("a.ts"),
      "import * as THREE from \"three\";\n",
    )
    .unwrap();
    (dir, paths)
  }

  #[tokio::test]
  async fn no_used_dependencies_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let paths = ProjectPaths::new(dir.path());
    std::fs::create_dir_all(paths.scripts_root()).unwrap();
    std::fs::write(paths.scripts_root().join("a.ts"), "export const x = 1;")
      .unwrap();

    let mock = Arc::new(CountingBundler::default());
    let provider: Arc<dyn BundleProvider> = mock.clone();
    let outcome = ensure_vendor_bundle(&paths, &provider).await;
    assert_eq!(outcome, VendorOutcome::Skipped);
    assert_eq!(mock.builds(), 0);
    assert!(!paths.vendor_bundle().exists());
  }

  #[tokio::test]
  async fn fresh_bundle_is_not_rebuilt() {
    let (_dir, paths) = project_with_dependency();
    let mock = Arc::new(CountingBundler::default());
    let provider: Arc<dyn BundleProvider> = mock.clone();

    let first = ensure_vendor_bundle(&paths, &provider).await;
    assert_eq!(first, VendorOutcome::Rebuilt(paths.vendor_bundle()));
    assert_eq!(mock.builds(), 1);

    let second = ensure_vendor_bundle(&paths, &provider).await;
    assert_eq!(second, VendorOutcome::Fresh(paths.vendor_bundle()));
    assert_eq!(mock.builds(), 1);
  }

  #[tokio::test]
  async fn touched_script_triggers_rebuild() {
    let (_dir, paths) = project_with_dependency();
    let mock = Arc::new(CountingBundler::default());
    let provider: Arc<dyn BundleProvider> = mock.clone();

    ensure_vendor_bundle(&paths, &provider).await;
    // Make the script strictly newer than the freshly written bundle.
    let script = paths.scripts_root().join("a.ts");
    let future = std::time::SystemTime::now()
      + std::time::Duration::from_secs(5);
    let file = std::fs::File::options().write(true).open(&script).unwrap();
    file.set_modified(future).unwrap();

    let outcome = ensure_vendor_bundle(&paths, &provider).await;
    assert_eq!(outcome, VendorOutcome::Rebuilt(paths.vendor_bundle()));
    assert_eq!(mock.builds(), 2);
  }

  #[tokio::test]
  async fn vendor_build_goes_through_the_module_compiler() {
    let (_dir, paths) = project_with_dependency();
    std::fs::write(paths.root().join("tsconfig.json"), "{}").unwrap();
    let mock = Arc::new(CountingBundler::default());
    let provider: Arc<dyn BundleProvider> = mock.clone();

    let outcome = ensure_vendor_bundle(&paths, &provider).await;
    assert_eq!(outcome, VendorOutcome::Rebuilt(paths.vendor_bundle()));

    let call = mock.calls.lock().last().cloned().unwrap();
    assert_eq!(
      call.banner.as_deref(),
      Some(crate::compiler::LOGGING_BANNER)
    );
    assert_eq!(call.tsconfig, paths.tsconfig());
    assert!(call.external.is_empty());
  }

  #[tokio::test]
  async fn proxy_module_reexports_named_and_default() {
    let dir = TempDir::new().unwrap();
    let paths = ProjectPaths::new(dir.path());
    let packages: BTreeSet<String> = ["@scope/pkg".to_string()].into();

    write_proxy_modules(&paths, &packages).await.unwrap();

    let proxy = paths.vendor_dir().join("_scope_pkg.js");
    let source = std::fs::read_to_string(proxy).unwrap();
    assert!(source.contains("import { _scope_pkg } from \"./vendor.js\";"));
    assert!(source.contains("export { _scope_pkg };"));
    assert!(source.contains("export default _scope_pkg.default"));
  }

  #[tokio::test]
  async fn import_map_is_written_to_both_locations() {
    let dir = TempDir::new().unwrap();
    let paths = ProjectPaths::new(dir.path());
    let packages: BTreeSet<String> = ["three".to_string()].into();

    write_import_maps(&paths, &packages).await.unwrap();

    for map_path in [paths.vendor_import_map(), paths.compiled_import_map()] {
      let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(map_path).unwrap())
          .unwrap();
      assert_eq!(
        document["imports"]["three"],
        "/.gamejs/scripts/vendor/three.js"
      );
    }
  }
}
