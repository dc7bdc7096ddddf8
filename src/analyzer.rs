// Copyright 2026 the GameJS authors. MIT license.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::manifest::ProjectManifest;
use crate::util::fs::collect_script_files;
use crate::util::path::ProjectPaths;
use crate::AnyError;

// `import d from "x"`, `import { a } from "x"`, `export * from "x"`, etc.
static FROM_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"(?:import|export)\b[^;'"]*?\bfrom\s*["']([^"']+)["']"#)
    .unwrap()
});
// Side-effect imports: `import "x"`.
static BARE_IMPORT_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"import\s*["']([^"']+)["']"#).unwrap());
// Dynamic imports: `import("x")`.
static DYNAMIC_IMPORT_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"import\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap());

/// Result of scanning a project's scripts for third-party imports.
#[derive(Debug, Default, Clone)]
pub struct ImportAnalysis {
  /// Package names both imported by some script and declared in the
  /// manifest, excluding type-only packages.
  pub used_dependencies: BTreeSet<String>,
  /// Package names imported by some script but absent from the manifest.
  /// These will be unresolvable at runtime; callers should warn.
  pub undeclared: BTreeSet<String>,
}

/// Scans every script under the project's script root and intersects the
/// imported package names with the declared dependency set.
///
/// Individual unreadable files are logged and skipped; a broken manifest
/// degrades to an empty declared set. Analysis itself never fails.
pub async fn analyze(paths: &ProjectPaths) -> ImportAnalysis {
  let declared = match ProjectManifest::load(&paths.package_json()).await {
    Ok(manifest) => manifest.declared_dependencies(),
    Err(err) => {
      log::warn!(
        "Could not read dependency manifest for '{}': {:#}",
        paths.root().display(),
        err
      );
      BTreeSet::new()
    }
  };

  let scripts_root = paths.scripts_root();
  let mut referenced: BTreeSet<String> = BTreeSet::new();
  for rel in collect_script_files(&scripts_root) {
    let source_path = paths.script_source(&rel);
    let source = match tokio::fs::read_to_string(&source_path).await {
      Ok(source) => source,
      Err(err) => {
        log::warn!(
          "Skipping imports of unreadable script '{}': {}",
          source_path.display(),
          err
        );
        continue;
      }
    };
    for specifier in scan_import_specifiers(&source) {
      if let Some(name) = normalize_package_name(&specifier) {
        referenced.insert(name);
      }
    }
  }

  let mut analysis = ImportAnalysis::default();
  for name in referenced {
    if is_type_only_package(&name) {
      continue;
    }
    if declared.contains(&name) {
      analysis.used_dependencies.insert(name);
    } else {
      analysis.undeclared.insert(name);
    }
  }
  analysis
}

/// Extracts every static and dynamic import specifier from script source.
///
/// This is deliberately textual, not a full parse; full-line `//` comments
/// are stripped first so commented-out imports don't register.
pub fn scan_import_specifiers(source: &str) -> Vec<String> {
  let filtered: String = source
    .lines()
    .filter(|line| !line.trim_start().starts_with("//"))
    .collect::<Vec<_>>()
    .join("\n");

  let mut specifiers = Vec::new();
  for re in [&FROM_IMPORT_RE, &BARE_IMPORT_RE, &DYNAMIC_IMPORT_RE] {
    for captures in re.captures_iter(&filtered) {
      if let Some(m) = captures.get(1) {
        specifiers.push(m.as_str().to_string());
      }
    }
  }
  specifiers
}

/// Normalizes a bare import specifier to its package name: two path
/// segments for scoped specifiers, one otherwise. Relative and absolute
/// specifiers yield `None`.
pub fn normalize_package_name(specifier: &str) -> Option<String> {
  if specifier.is_empty()
    || specifier.starts_with('.')
    || specifier.starts_with('/')
  {
    return None;
  }
  let mut segments = specifier.split('/');
  let first = segments.next()?;
  if first.starts_with('@') {
    let second = segments.next()?;
    Some(format!("{}/{}", first, second))
  } else {
    Some(first.to_string())
  }
}

/// Type-declaration-only packages never appear in compiled output.
pub fn is_type_only_package(name: &str) -> bool {
  name.starts_with("@types/") || name == "typescript"
}

/// Convenience wrapper returning only the used-dependency set.
pub async fn analyze_imports(
  paths: &ProjectPaths,
) -> Result<BTreeSet<String>, AnyError> {
  Ok(analyze(paths).await.used_dependencies)
}
