// Copyright 2026 the GameJS authors. MIT license.

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

/// Project-relative directory of user-authored script sources.
pub const SCRIPTS_DIR: &str = "scripts";
/// Hidden per-project build directory.
pub const BUILD_DIR: &str = ".gamejs";
/// Compiled ES modules, mirroring the `scripts/` tree.
pub const COMPILED_DIR: &str = ".gamejs/scripts/compiled-scripts";
/// Vendor bundle, proxy modules and the canonical import map.
pub const VENDOR_DIR: &str = ".gamejs/scripts/vendor";
/// Runtime-servable URL prefix for vendor proxy modules.
pub const VENDOR_URL_PREFIX: &str = "/.gamejs/scripts/vendor/";

/// Well-known locations inside one project, derived from its root.
///
/// Script paths are exchanged as `/`-separated strings relative to the
/// script source root so they can double as map keys and URL segments on
/// every platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
  root: PathBuf,
}

impl ProjectPaths {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn scripts_root(&self) -> PathBuf {
    self.root.join(SCRIPTS_DIR)
  }

  pub fn compiled_root(&self) -> PathBuf {
    self.root.join(COMPILED_DIR)
  }

  pub fn vendor_dir(&self) -> PathBuf {
    self.root.join(VENDOR_DIR)
  }

  pub fn package_json(&self) -> PathBuf {
    self.root.join("package.json")
  }

  /// The project tsconfig, or `None` when it does not exist.
  pub fn tsconfig(&self) -> Option<PathBuf> {
    let path = self.root.join("tsconfig.json");
    path.is_file().then_some(path)
  }

  pub fn vendor_bundle(&self) -> PathBuf {
    self.vendor_dir().join("vendor.js")
  }

  pub fn vendor_import_map(&self) -> PathBuf {
    self.vendor_dir().join("importmap.json")
  }

  pub fn compiled_import_map(&self) -> PathBuf {
    self.compiled_root().join("importmap.json")
  }

  /// Absolute path of a script source given its `/`-separated relative path.
  pub fn script_source(&self, rel: &str) -> PathBuf {
    join_rel(&self.scripts_root(), rel)
  }

  /// Compiled output location for a script: the relative path mirrored
  /// under the compiled root with the extension swapped to `.js`.
  pub fn compiled_output(&self, rel: &str) -> PathBuf {
    swap_extension(&join_rel(&self.compiled_root(), rel), "js")
  }

  /// Runtime URL of a vendor proxy module for a sanitized package name.
  pub fn proxy_url(sanitized: &str) -> String {
    format!("{}{}.js", VENDOR_URL_PREFIX, sanitized)
  }
}

// Script-relative paths arrive over the IPC boundary; `.` and `..`
// segments are discarded so a crafted path can never resolve outside the
// script or output roots.
fn join_rel(base: &Path, rel: &str) -> PathBuf {
  let mut out = base.to_path_buf();
  for segment in rel
    .split('/')
    .filter(|s| !s.is_empty() && *s != "." && *s != "..")
  {
    out.push(segment);
  }
  out
}

/// Replaces every character outside `[A-Za-z0-9_$]` with `_`, producing a
/// valid ES identifier for a package name like `@scope/pkg`.
pub fn sanitize_identifier(name: &str) -> String {
  name
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
        c
      } else {
        '_'
      }
    })
    .collect()
}

/// Returns `path` with its extension replaced.
pub fn swap_extension(path: &Path, new_ext: &str) -> PathBuf {
  path.with_extension(new_ext)
}

/// `/`-separated form of a relative path, for use as a state-map key.
pub fn rel_path_to_string(rel: &Path) -> String {
  rel
    .components()
    .filter_map(|c| match c {
      Component::Normal(seg) => Some(seg.to_string_lossy()),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("/")
}

/// Computes a relative ES import specifier from the directory `from_dir`
/// to the file `to`, always `/`-separated and prefixed with `./` or `../`.
pub fn relative_import_path(from_dir: &Path, to: &Path) -> String {
  let from: Vec<_> = from_dir.components().collect();
  let to_parts: Vec<_> = to.components().collect();

  let common = from
    .iter()
    .zip(to_parts.iter())
    .take_while(|(a, b)| a == b)
    .count();

  let mut segments: Vec<String> = Vec::new();
  for _ in common..from.len() {
    segments.push("..".to_string());
  }
  for part in &to_parts[common..] {
    segments.push(part.as_os_str().to_string_lossy().into_owned());
  }

  let joined = segments.join("/");
  if joined.starts_with("../") {
    joined
  } else {
    format!("./{}", joined)
  }
}
