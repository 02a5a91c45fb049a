//! File watcher: runs `check` on startup, then re-runs on source changes.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};
use tracing::debug;

use crate::commands;
use crate::diagnostics;
use crate::error;

/// Debounce delay between filesystem events and re-check.
const DEBOUNCE_MS: u64 = 100;

/// Create a filesystem watcher that sends events on the given channel.
///
/// # Errors
///
/// Returns `Error::WatchFailed` if the watcher cannot be created.
fn create_watcher(
    tx: crossbeam_channel::Sender<()>,
) -> Result<notify::RecommendedWatcher, error::Error> {
    return notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        if let Ok(event) = res
            && matches!(
                event.kind,
                notify::EventKind::Create(_)
                    | notify::EventKind::Modify(_)
                    | notify::EventKind::Remove(_)
            )
        {
            debug!(paths = ?event.paths, "change");
            let _ = tx.send(());
        }
    })
    .map_err(|e| {
        return error::Error::WatchFailed {
            reason: format!("watcher setup failed: {e}"),
        };
    });
}

/// Entry point for the watch command.
///
/// Runs an initial check, then watches `dir` recursively and re-checks on changes.
///
/// # Errors
///
/// Returns `Error::DirectoryNotFound` for a missing directory and
/// `Error::WatchFailed` if the watcher cannot be set up.
pub fn run(dir: &Path) -> Result<ExitCode, error::Error> {
    if !dir.is_dir() {
        return Err(error::Error::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    eprintln!("watch: initial check");
    let mut last_code = run_check(dir);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = create_watcher(tx)?;
    watcher.watch(dir, RecursiveMode::Recursive).map_err(|e| {
        return error::Error::WatchFailed {
            reason: format!("cannot watch {}: {e}", dir.display()),
        };
    })?;

    eprintln!("watch: monitoring {}, press Ctrl+C to stop", dir.display());

    while rx.recv().is_ok() {
        let debounce = Duration::from_millis(DEBOUNCE_MS);
        while rx.recv_timeout(debounce).is_ok() {}
        eprintln!("watch: change detected, re-checking...");
        last_code = run_check(dir);
    }

    return Ok(last_code);
}

/// Run check once and print result. Returns the exit code from check.
fn run_check(dir: &Path) -> ExitCode {
    return match commands::check(dir) {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(2_u8)
        },
    };
}
