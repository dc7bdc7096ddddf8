// Copyright 2026 the GameJS authors. MIT license.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bundler::BundleProvider;
use crate::compiler::CompileError;
use crate::compiler::ModuleCompiler;
use crate::util::fs::collect_script_files;
use crate::util::fs::mtime_millis;
use crate::util::fs::now_millis;
use crate::util::fs::remove_file_if_exists;
use crate::util::path::ProjectPaths;
use crate::vendor;
use crate::vendor::VendorOutcome;

/// Fixed cadence of the reconciliation scan.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Per-project incremental compilation state, rebuilt from a fresh scan
/// whenever watching (re)starts. Keys are `/`-separated script paths
/// relative to the script source root.
#[derive(Debug, Default)]
pub struct ProjectWatchState {
  /// Compiled output location per script, present only after at least one
  /// successful compile. A failed recompile leaves the prior entry alone;
  /// stale-but-loadable beats absent.
  pub compiled_index: HashMap<String, PathBuf>,
  /// Wall time (ms since epoch) of each script's last successful compile.
  pub last_compiled_at: HashMap<String, u64>,
  /// Last observed source mtime (ms since epoch); absence means the file
  /// is new to this watcher.
  pub last_seen_mtime: HashMap<String, u64>,
  /// Set only after a successful vendor build.
  pub vendor_bundle_path: Option<PathBuf>,
  pub vendor_bundle_built_at: Option<u64>,
}

/// A project registered with the pipeline: its state, the scan task and
/// the token that stops it.
pub(crate) struct WatchedProject {
  pub state: Arc<Mutex<ProjectWatchState>>,
  pub cancel: CancellationToken,
  #[allow(dead_code)]
  pub task: JoinHandle<()>,
}

/// Runs the recurring scan until cancelled. An in-flight scan finishes
/// before cancellation is observed; the interval is simply never re-armed.
pub(crate) async fn run_watch_loop(
  paths: ProjectPaths,
  provider: Arc<dyn BundleProvider>,
  state: Arc<Mutex<ProjectWatchState>>,
  cancel: CancellationToken,
) {
  let first_tick = tokio::time::Instant::now() + SCAN_INTERVAL;
  let mut interval = tokio::time::interval_at(first_tick, SCAN_INTERVAL);
  interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = interval.tick() => {
        scan(&paths, &provider, &state).await;
      }
    }
  }
  log::debug!("Stopped watching '{}'", paths.root().display());
}

/// One reconciliation pass: refresh the vendor bundle, diff script mtimes
/// against the state maps, compile what changed, clean up what vanished.
///
/// Every per-file failure is logged and isolated; a scan never panics the
/// loop and never leaves the state maps referring to deleted files.
pub(crate) async fn scan(
  paths: &ProjectPaths,
  provider: &Arc<dyn BundleProvider>,
  state: &Arc<Mutex<ProjectWatchState>>,
) {
  match vendor::ensure_vendor_bundle(paths, provider).await {
    VendorOutcome::Skipped => {}
    VendorOutcome::Fresh(path) => {
      state.lock().vendor_bundle_path = Some(path);
    }
    VendorOutcome::Rebuilt(path) => {
      let mut state = state.lock();
      state.vendor_bundle_path = Some(path);
      state.vendor_bundle_built_at = Some(now_millis());
    }
  }

  let current = collect_script_files(&paths.scripts_root());

  for rel in &current {
    let source = paths.script_source(rel);
    let mtime = match mtime_millis(&source).await {
      Ok(mtime) => mtime,
      Err(err) => {
        log::warn!("Could not stat '{}': {}", source.display(), err);
        continue;
      }
    };

    let changed = {
      let state = state.lock();
      match state.last_seen_mtime.get(rel) {
        None => true,
        Some(prev) => mtime > *prev,
      }
    };
    if !changed {
      continue;
    }

    state.lock().last_seen_mtime.insert(rel.clone(), mtime);
    if let Err(err) = compile_one(paths, provider, state, rel).await {
      log::warn!(
        "Compilation of '{}' failed, keeping previous output: {}",
        rel,
        err
      );
    }
  }

  // Scripts that disappeared since the previous scan.
  let current_set: HashSet<&String> = current.iter().collect();
  let removed: Vec<(String, PathBuf)> = {
    let mut state = state.lock();
    let gone: Vec<String> = state
      .last_seen_mtime
      .keys()
      .filter(|rel| !current_set.contains(rel))
      .cloned()
      .collect();
    gone
      .into_iter()
      .map(|rel| {
        state.last_seen_mtime.remove(&rel);
        state.last_compiled_at.remove(&rel);
        let output = state
          .compiled_index
          .remove(&rel)
          .unwrap_or_else(|| paths.compiled_output(&rel));
        (rel, output)
      })
      .collect()
  };

  for (rel, output) in removed {
    log::info!("Script '{}' removed, deleting compiled output", rel);
    let mut map = output.as_os_str().to_owned();
    map.push(".map");
    for stale in [output, PathBuf::from(map)] {
      if let Err(err) = remove_file_if_exists(&stale).await {
        // The index entry is already gone, so this won't be retried; an
        // orphaned file on disk is acceptable.
        log::warn!("Could not delete '{}': {}", stale.display(), err);
      }
    }
  }
}

/// Compiles a single script, mirroring its relative path under the
/// compiled-output root. Used by the scan loop and the forced-compile API.
///
/// Skips work when the source is not newer than the last successful
/// compile. The used-dependency set is recomputed per call so a newly
/// added import becomes an external immediately.
pub(crate) async fn compile_one(
  paths: &ProjectPaths,
  provider: &Arc<dyn BundleProvider>,
  state: &Arc<Mutex<ProjectWatchState>>,
  rel: &str,
) -> Result<PathBuf, CompileError> {
  let entry = paths.script_source(rel);
  let src_mtime = mtime_millis(&entry)
    .await
    .map_err(|_| CompileError::EntryNotFound(entry.clone()))?;

  let output = paths.compiled_output(rel);
  {
    let state = state.lock();
    if let Some(compiled_at) = state.last_compiled_at.get(rel) {
      if src_mtime <= *compiled_at {
        return Ok(
          state
            .compiled_index
            .get(rel)
            .cloned()
            .unwrap_or(output),
        );
      }
    }
  }

  let externals: Vec<String> = crate::analyzer::analyze(paths)
    .await
    .used_dependencies
    .into_iter()
    .collect();

  let compiler = ModuleCompiler::new(provider.clone());
  let compiled = compiler
    .compile(&entry, &output, externals, paths.tsconfig())
    .await?;

  {
    let mut state = state.lock();
    state
      .compiled_index
      .insert(rel.to_string(), compiled.output_path.clone());
    state.last_compiled_at.insert(rel.to_string(), now_millis());
  }
  log::info!(
    "Compiled '{}' -> '{}'",
    rel,
    compiled.output_path.display()
  );
  Ok(compiled.output_path)
}
