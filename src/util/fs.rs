// Copyright 2026 the GameJS authors. MIT license.

use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::util::path::rel_path_to_string;

/// Source extensions accepted under the script root.
const SCRIPT_EXTENSIONS: [&str; 4] = ["ts", "tsx", "js", "mjs"];

/// Recursively lists script source files under `scripts_root`, returning
/// sorted `/`-separated paths relative to that root. Hidden files and
/// hidden directories are skipped.
pub fn collect_script_files(scripts_root: &Path) -> Vec<String> {
  let mut files: Vec<String> = WalkDir::new(scripts_root)
    .follow_links(false)
    .into_iter()
    .filter_entry(|e| {
      // The root itself is exempt; only entries inside it can be hidden.
      e.depth() == 0 || !is_hidden(e.file_name().to_string_lossy().as_ref())
    })
    .filter_map(|entry| entry.ok())
    .filter(|entry| entry.file_type().is_file())
    .filter(|entry| {
      entry
        .path()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SCRIPT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
    })
    .filter_map(|entry| {
      entry
        .path()
        .strip_prefix(scripts_root)
        .ok()
        .map(rel_path_to_string)
    })
    .collect();
  files.sort();
  files
}

fn is_hidden(file_name: &str) -> bool {
  file_name.starts_with('.')
}

/// Modification time of `path` as milliseconds since the Unix epoch.
pub async fn mtime_millis(path: &Path) -> std::io::Result<u64> {
  let metadata = tokio::fs::metadata(path).await?;
  Ok(system_time_millis(metadata.modified()?))
}

pub fn system_time_millis(time: SystemTime) -> u64 {
  time
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or(0)
}

pub fn now_millis() -> u64 {
  system_time_millis(SystemTime::now())
}

/// Writes a file, creating missing parent directories first.
pub async fn write_file_with_parents(
  path: &Path,
  contents: &str,
) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(path, contents).await
}

/// Removes a file, treating "not found" as success.
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
  match tokio::fs::remove_file(path).await {
    Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
    result => result,
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn collects_scripts_recursively_and_sorted() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::create_dir_all(root.join(".cache")).unwrap();
    std::fs::write(root.join("b.ts"), "").unwrap();
    std::fs::write(root.join("a.tsx"), "").unwrap();
    std::fs::write(root.join("sub/c.ts"), "").unwrap();
    std::fs::write(root.join("sub/readme.md"), "").unwrap();
    std::fs::write(root.join(".hidden.ts"), "").unwrap();
    std::fs::write(root.join(".cache/d.ts"), "").unwrap();

    let files = collect_script_files(root);
    assert_eq!(files, vec!["a.tsx", "b.ts", "sub/c.ts"]);
  }

  #[test]
  fn missing_root_yields_empty_listing() {
    let dir = TempDir::new().unwrap();
    let files = collect_script_files(&dir.path().join("nope"));
    assert!(files.is_empty());
  }

  #[tokio::test]
  async fn write_creates_parents() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("a/b/c.js");
    write_file_with_parents(&target, "x").await.unwrap();
    assert_eq!(std::fs::read_to_string(target).unwrap(), "x");
  }

  #[tokio::test]
  async fn remove_missing_file_is_ok() {
    let dir = TempDir::new().unwrap();
    remove_file_if_exists(&dir.path().join("gone.js"))
      .await
      .unwrap();
  }
}
