// Copyright 2026 the GameJS authors. MIT license.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::AnyError;

/// The slice of a project's `package.json` the pipeline cares about.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
  #[serde(default)]
  pub dependencies: BTreeMap<String, String>,
  #[serde(default)]
  pub dev_dependencies: BTreeMap<String, String>,
}

impl ProjectManifest {
  /// Loads `package.json` from the project root. A missing file is a valid
  /// project with no third-party dependencies; malformed JSON is an error.
  pub async fn load(package_json: &Path) -> Result<Self, AnyError> {
    let text = match tokio::fs::read_to_string(package_json).await {
      Ok(text) => text,
      Err(err) if err.kind() == ErrorKind::NotFound => {
        return Ok(Self::default());
      }
      Err(err) => {
        return Err(err).with_context(|| {
          format!("Failed to read '{}'", package_json.display())
        });
      }
    };
    serde_json::from_str(&text)
      .with_context(|| format!("Failed to parse '{}'", package_json.display()))
  }

  /// Union of runtime and development dependency names.
  pub fn declared_dependencies(&self) -> BTreeSet<String> {
    self
      .dependencies
      .keys()
      .chain(self.dev_dependencies.keys())
      .cloned()
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;

  #[tokio::test]
  async fn parses_both_dependency_tables() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("package.json");
    std::fs::write(
      &path,
      r#"{
        "name": "demo",
        "dependencies": { "three": "^0.150.0" },
        "devDependencies": { "@types/three": "^0.150.0", "typescript": "^5" }
      }"#,
    )
    .unwrap();

    let manifest = ProjectManifest::load(&path).await.unwrap();
    let declared: Vec<_> =
      manifest.declared_dependencies().into_iter().collect();
    assert_eq!(declared, vec!["@types/three", "three", "typescript"]);
  }

  #[tokio::test]
  async fn missing_manifest_is_empty() {
    let dir = TempDir::new().unwrap();
    let manifest = ProjectManifest::load(&dir.path().join("package.json"))
      .await
      .unwrap();
    assert!(manifest.declared_dependencies().is_empty());
  }

  #[tokio::test]
  async fn malformed_manifest_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("package.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(ProjectManifest::load(&path).await.is_err());
  }
}
