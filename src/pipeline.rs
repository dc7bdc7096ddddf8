// Copyright 2026 the GameJS authors. MIT license.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::bundler::BundleProvider;
use crate::bundler::EsbuildBundler;
use crate::util::path::ProjectPaths;
use crate::watcher;
use crate::watcher::ProjectWatchState;
use crate::watcher::WatchedProject;

/// Result of a forced single-script compilation, shaped for the editor's
/// IPC boundary.
#[derive(Debug, Clone, Serialize)]
pub struct CompileScriptResult {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_path: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompilationStatus {
  pub is_watching: bool,
  pub compiled_count: usize,
  /// Wall time (ms since epoch) of the most recent successful compile.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_compilation: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub vendor_bundle: Option<PathBuf>,
}

/// The pipeline boundary exposed to the rest of the editor.
///
/// Owns the registry of watched projects; construct one per application
/// (or per test) and pass it by reference. Queries about unknown projects
/// return empty or negative results rather than failing; only
/// [`ScriptPipeline::compile_script`] surfaces an error message.
pub struct ScriptPipeline {
  provider: Arc<dyn BundleProvider>,
  projects: Mutex<HashMap<PathBuf, WatchedProject>>,
}

impl Default for ScriptPipeline {
  fn default() -> Self {
    Self::with_bundler(Arc::new(EsbuildBundler::default()))
  }
}

impl ScriptPipeline {
  pub fn with_bundler(provider: Arc<dyn BundleProvider>) -> Self {
    Self {
      provider,
      projects: Mutex::new(HashMap::new()),
    }
  }

  /// Starts watching a project. Idempotent: an already-watched project is
  /// stopped first, so a restart always begins from fresh state. Returns
  /// `false` and registers nothing when setup fails.
  pub async fn start_watching(&self, project_root: &Path) -> bool {
    self.stop_watching(project_root);
    let paths = ProjectPaths::new(project_root);

    if let Err(err) = self.set_up_project_dirs(&paths).await {
      log::error!(
        "Could not start watching '{}': {:#}",
        project_root.display(),
        err
      );
      return false;
    }

    let state = Arc::new(Mutex::new(ProjectWatchState::default()));
    // Establish the vendor bundle and the initial compiled set before the
    // recurring task takes over.
    watcher::scan(&paths, &self.provider, &state).await;

    let cancel = CancellationToken::new();
    let task = tokio::spawn(watcher::run_watch_loop(
      paths,
      self.provider.clone(),
      state.clone(),
      cancel.clone(),
    ));

    self.projects.lock().insert(
      project_root.to_path_buf(),
      WatchedProject {
        state,
        cancel,
        task,
      },
    );
    log::info!("Watching scripts in '{}'", project_root.display());
    true
  }

  async fn set_up_project_dirs(
    &self,
    paths: &ProjectPaths,
  ) -> Result<(), crate::AnyError> {
    tokio::fs::create_dir_all(paths.scripts_root()).await?;
    tokio::fs::create_dir_all(paths.compiled_root()).await?;
    Ok(())
  }

  /// Stops watching a project. Returns `false` when it was not being
  /// watched; stopping twice is a no-op, never an error.
  pub fn stop_watching(&self, project_root: &Path) -> bool {
    let removed = self.projects.lock().remove(project_root);
    match removed {
      Some(project) => {
        // An in-flight scan finishes on its own; the loop just never
        // re-arms once the token is cancelled.
        project.cancel.cancel();
        log::info!("Stopped watching '{}'", project_root.display());
        true
      }
      None => false,
    }
  }

  /// Stops every active watcher. Called on application exit.
  pub fn shutdown(&self) {
    let projects: Vec<(PathBuf, WatchedProject)> =
      self.projects.lock().drain().collect();
    for (root, project) in projects {
      project.cancel.cancel();
      log::info!("Stopped watching '{}'", root.display());
    }
  }

  /// Compiles one script immediately, bypassing the poll cadence (but not
  /// the not-newer-than-last-compile guard). Unlike the queries below,
  /// this surfaces the underlying compiler error to the caller.
  pub async fn compile_script(
    &self,
    project_root: &Path,
    script_rel: &str,
  ) -> CompileScriptResult {
    let Some(state) = self.project_state(project_root) else {
      return CompileScriptResult {
        success: false,
        output_path: None,
        error: Some(format!(
          "project '{}' is not being watched",
          project_root.display()
        )),
      };
    };

    let paths = ProjectPaths::new(project_root);
    match watcher::compile_one(&paths, &self.provider, &state, script_rel)
      .await
    {
      Ok(output_path) => CompileScriptResult {
        success: true,
        output_path: Some(output_path),
        error: None,
      },
      Err(err) => CompileScriptResult {
        success: false,
        output_path: None,
        error: Some(err.to_string()),
      },
    }
  }

  /// Mapping of script-relative path to compiled output path. Empty for
  /// unknown projects.
  pub fn get_compiled_scripts(
    &self,
    project_root: &Path,
  ) -> HashMap<String, PathBuf> {
    match self.project_state(project_root) {
      Some(state) => state.lock().compiled_index.clone(),
      None => HashMap::new(),
    }
  }

  pub fn get_compilation_status(
    &self,
    project_root: &Path,
  ) -> CompilationStatus {
    match self.project_state(project_root) {
      Some(state) => {
        let state = state.lock();
        CompilationStatus {
          is_watching: true,
          compiled_count: state.compiled_index.len(),
          last_compilation: state.last_compiled_at.values().max().copied(),
          vendor_bundle: state.vendor_bundle_path.clone(),
        }
      }
      None => CompilationStatus {
        is_watching: false,
        compiled_count: 0,
        last_compilation: None,
        vendor_bundle: None,
      },
    }
  }

  /// The current import-map document, or `None` when the project is not
  /// watched or no map has been produced yet.
  pub async fn get_import_map(
    &self,
    project_root: &Path,
  ) -> Option<serde_json::Value> {
    self.project_state(project_root)?;
    let map_path = ProjectPaths::new(project_root).vendor_import_map();
    let text = tokio::fs::read_to_string(&map_path).await.ok()?;
    match serde_json::from_str(&text) {
      Ok(document) => Some(document),
      Err(err) => {
        log::warn!(
          "Ignoring unparsable import map '{}': {}",
          map_path.display(),
          err
        );
        None
      }
    }
  }

  /// Raw text of a compiled script's output, or `None` when the project
  /// is not watched, the script never compiled, or the file is unreadable.
  pub async fn read_compiled_script(
    &self,
    project_root: &Path,
    script_rel: &str,
  ) -> Option<String> {
    let state = self.project_state(project_root)?;
    let output = state.lock().compiled_index.get(script_rel).cloned()?;
    match tokio::fs::read_to_string(&output).await {
      Ok(text) => Some(text),
      Err(err) => {
        log::warn!("Could not read '{}': {}", output.display(), err);
        None
      }
    }
  }

  fn project_state(
    &self,
    project_root: &Path,
  ) -> Option<Arc<Mutex<ProjectWatchState>>> {
    self
      .projects
      .lock()
      .get(project_root)
      .map(|project| project.state.clone())
  }
}

impl Drop for ScriptPipeline {
  fn drop(&mut self) {
    // Cancellation is synchronous, so dropping the pipeline on process
    // exit leaves no background work running.
    for project in self.projects.lock().values() {
      project.cancel.cancel();
    }
  }
}
