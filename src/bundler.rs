// Copyright 2026 the GameJS authors. MIT license.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::anyhow;
use anyhow::Context;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::AnyError;

/// The external "compile one entry to an ES module" capability.
///
/// The pipeline never talks to a bundler directly; everything goes through
/// this trait so the engine can be swapped (or mocked in tests).
#[async_trait]
pub trait BundleProvider: Send + Sync {
  async fn bundle(
    &self,
    options: BundleOptions,
  ) -> Result<BundleOutput, AnyError>;
}

#[derive(Clone, Debug, Default)]
pub struct BundleOptions {
  pub entry_point: PathBuf,
  pub output_path: PathBuf,
  /// Packages excluded from the output, left as bare imports for the
  /// import map to resolve at load time.
  pub external: Vec<String>,
  pub format: BundleFormat,
  pub platform: BundlePlatform,
  /// Target language level, e.g. `es2020`.
  pub target: Option<String>,
  pub sourcemap: Option<SourceMapType>,
  pub minify: bool,
  pub tree_shaking: bool,
  /// Compile-time constant substitutions; values are raw JS expressions.
  pub defines: IndexMap<String, String>,
  /// Text injected verbatim at the top of the output.
  pub banner: Option<String>,
  pub tsconfig: Option<PathBuf>,
}

#[derive(Clone, Debug, Eq, PartialEq, Copy, Default, Deserialize)]
pub enum BundleFormat {
  #[default]
  Esm,
  Cjs,
  Iife,
}

impl std::fmt::Display for BundleFormat {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BundleFormat::Esm => write!(f, "esm"),
      BundleFormat::Cjs => write!(f, "cjs"),
      BundleFormat::Iife => write!(f, "iife"),
    }
  }
}

#[derive(Clone, Debug, Eq, PartialEq, Copy, Default, Deserialize)]
pub enum BundlePlatform {
  #[default]
  Browser,
  Node,
  Neutral,
}

impl std::fmt::Display for BundlePlatform {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BundlePlatform::Browser => write!(f, "browser"),
      BundlePlatform::Node => write!(f, "node"),
      BundlePlatform::Neutral => write!(f, "neutral"),
    }
  }
}

#[derive(Clone, Debug, Eq, PartialEq, Copy, Default, Deserialize)]
pub enum SourceMapType {
  /// Separate `.map` file referenced from the output.
  #[default]
  Linked,
  Inline,
  /// Separate `.map` file with no reference comment.
  External,
}

#[derive(Debug, Clone)]
pub struct BundleOutput {
  pub output_path: PathBuf,
  pub source_map_path: Option<PathBuf>,
}

/// [`BundleProvider`] backed by an `esbuild` executable.
///
/// esbuild treats `--external:` specifiers as unresolvable-by-design, so
/// an external package the bundler cannot otherwise find never fails the
/// build; it stays a bare import in the output.
pub struct EsbuildBundler {
  executable: PathBuf,
}

impl Default for EsbuildBundler {
  fn default() -> Self {
    Self {
      executable: PathBuf::from("esbuild"),
    }
  }
}

impl EsbuildBundler {
  pub fn new(executable: impl Into<PathBuf>) -> Self {
    Self {
      executable: executable.into(),
    }
  }
}

#[async_trait]
impl BundleProvider for EsbuildBundler {
  async fn bundle(
    &self,
    options: BundleOptions,
  ) -> Result<BundleOutput, AnyError> {
    let output_path = options.output_path.clone();
    let source_map_path = match options.sourcemap {
      Some(SourceMapType::Linked) | Some(SourceMapType::External) => {
        let mut map = output_path.as_os_str().to_owned();
        map.push(".map");
        Some(PathBuf::from(map))
      }
      _ => None,
    };

    let args = build_esbuild_args(&options);
    log::debug!("Invoking esbuild: {:?}", args);
    let output = tokio::process::Command::new(&self.executable)
      .args(&args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .output()
      .await
      .with_context(|| {
        format!("Failed to spawn '{}'", self.executable.display())
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(anyhow!(
        "esbuild exited with {} for '{}': {}",
        output.status,
        options.entry_point.display(),
        stderr.trim()
      ));
    }

    Ok(BundleOutput {
      output_path,
      source_map_path,
    })
  }
}

/// Maps [`BundleOptions`] onto esbuild CLI flags.
fn build_esbuild_args(options: &BundleOptions) -> Vec<String> {
  let mut args = vec![
    options.entry_point.to_string_lossy().into_owned(),
    "--bundle".to_string(),
    format!("--outfile={}", options.output_path.display()),
    format!("--format={}", options.format),
    format!("--platform={}", options.platform),
  ];
  if let Some(target) = &options.target {
    args.push(format!("--target={}", target));
  }
  match options.sourcemap {
    Some(SourceMapType::Linked) => args.push("--sourcemap".to_string()),
    Some(SourceMapType::Inline) => args.push("--sourcemap=inline".to_string()),
    Some(SourceMapType::External) => {
      args.push("--sourcemap=external".to_string())
    }
    None => {}
  }
  if options.minify {
    args.push("--minify".to_string());
  }
  if options.tree_shaking {
    args.push("--tree-shaking=true".to_string());
  }
  for name in &options.external {
    args.push(format!("--external:{}", name));
  }
  for (key, value) in &options.defines {
    args.push(format!("--define:{}={}", key, value));
  }
  if let Some(banner) = &options.banner {
    args.push(format!("--banner:js={}", banner));
  }
  if let Some(tsconfig) = &options.tsconfig {
    args.push(format!("--tsconfig={}", tsconfig.display()));
  }
  args
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn builds_flags_for_a_script_compile() {
    let mut defines = IndexMap::new();
    defines.insert(
      "process.env.NODE_ENV".to_string(),
      "\"development\"".to_string(),
    );
    let options = BundleOptions {
      entry_point: PathBuf::from("/p/scripts/a.ts"),
      output_path: PathBuf::from("/p/out/a.js"),
      external: vec!["three".to_string(), "@scope/pkg".to_string()],
      format: BundleFormat::Esm,
      platform: BundlePlatform::Browser,
      target: Some("es2020".to_string()),
      sourcemap: Some(SourceMapType::Linked),
      minify: false,
      tree_shaking: true,
      defines,
      banner: Some("const x=1;".to_string()),
      tsconfig: Some(PathBuf::from("/p/tsconfig.json")),
    };

    let args = build_esbuild_args(&options);
    assert_eq!(
      args,
      vec![
        "/p/scripts/a.ts",
        "--bundle",
        "--outfile=/p/out/a.js",
        "--format=esm",
        "--platform=browser",
        "--target=es2020",
        "--sourcemap",
        "--tree-shaking=true",
        "--external:three",
        "--external:@scope/pkg",
        "--define:process.env.NODE_ENV=\"development\"",
        "--banner:js=const x=1;",
        "--tsconfig=/p/tsconfig.json",
      ]
    );
  }

  #[test]
  fn format_and_platform_render_lowercase() {
    assert_eq!(BundleFormat::Iife.to_string(), "iife");
    assert_eq!(BundlePlatform::Neutral.to_string(), "neutral");
  }
}
