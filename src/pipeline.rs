//! # Build Pipeline
//!
//! This module contains the core logic of remocon-build. It is responsible for:
//! 1. Verifying the Python interpreter and the PyInstaller dependency
//!    (`ensure_interpreter`, `ensure_pyinstaller`).
//! 2. Removing stale artifacts from previous runs (`clean_artifacts`).
//! 3. Driving the PyInstaller invocation and reporting the outcome (`run_build`).
//! 4. The read-only environment report (`doctor`).
//!
//! The flow is strictly linear: every failure is terminal and is surfaced to
//! the operator as a diagnostic plus a non-zero exit code. There are no
//! retries anywhere.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use anyhow::{Context, Result, bail};
use log::{info, warn};
use serde::Serialize;
use walkdir::WalkDir;
use crate::invariant_ppt::*;
use crate::profile::PackagingProfile;
use crate::toolchain::ToolchainOps;

/// What a successful build produced. Handed back to `main` so it can run the
/// open-folder prompt.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub python_version: String,
    pub pyinstaller_version: String,
    pub dist_dir: std::path::PathBuf,
    pub exe_path: std::path::PathBuf,
}

/// JSON record of the last successful build, persisted under the local data
/// directory.
#[derive(Debug, Serialize)]
struct BuildRecord<'a> {
    app: &'a str,
    python_version: &'a str,
    pyinstaller_version: &'a str,
    dist_dir: String,
    exe_path: String,
    file_count: u64,
    total_bytes: u64,
    finished_at_epoch_secs: u64,
}

/// The main entry point for the build logic.
///
/// # Arguments
///
/// * `dry_run` - If true, runs the environment checks and prints every step
///   (including the exact packager command line) but does NOT delete
///   artifacts or spawn PyInstaller.
///
/// # Returns
///
/// `Ok(Some(outcome))` after a real build, `Ok(None)` after a dry run, or an
/// error for any checked failure (missing interpreter, failed install,
/// failed packaging).
pub fn run_build(
    profile: &PackagingProfile,
    toolchain: &impl ToolchainOps,
    dry_run: bool,
) -> Result<Option<BuildOutcome>> {
    // Step 1: interpreter.
    let python_version = toolchain
        .python_version()
        .context("Python runtime check failed")?;
    info!("Found {}", python_version);

    // Step 2: packaging dependency. Install on demand, exactly once.
    let pyinstaller_version = ensure_pyinstaller(toolchain, dry_run)?;

    if dry_run {
        print_dry_run(profile, toolchain, &python_version, &pyinstaller_version);
        return Ok(None);
    }

    // Step 3: stale artifacts from earlier runs. Removal failure is
    // non-fatal (a warning), so the absence of the directories is only
    // guaranteed when every removal succeeded.
    let all_removed = clean_artifacts(profile, toolchain);
    if all_removed {
        assert_invariant(
            !toolchain.path_exists(&profile.build_dir())
                && !toolchain.path_exists(&profile.dist_dir()),
            "stale artifacts removed before packaging",
            Some("Pipeline"),
        );
    }

    // Step 4: package. The entry script is checked up front so a missing
    // file gets a direct diagnostic instead of a PyInstaller traceback.
    if !toolchain.path_exists(&profile.entry) {
        bail!(
            "Entry script {:?} not found in the working directory",
            profile.entry
        );
    }
    if !toolchain.path_exists(&profile.icon) {
        warn!("Icon {:?} not found; PyInstaller will likely fail", profile.icon);
    }

    info!("Packaging {} with PyInstaller...", profile.app_name);
    toolchain
        .run_pyinstaller(&profile.pyinstaller_args())
        .context("PyInstaller failed; see its output above")?;

    let dist_dir = profile.dist_dir();
    let exe_path = profile.exe_path();
    if !toolchain.path_exists(&exe_path) {
        warn!(
            "PyInstaller reported success but {:?} was not found",
            exe_path
        );
    }

    // Step 5: report.
    let (file_count, total_bytes) = summarize_dir(&dist_dir);
    println!();
    println!("Build complete: {}", profile.app_name);
    println!("  Output folder: {}", dist_dir.display());
    println!("  Executable:    {}", exe_path.display());
    if file_count > 0 {
        println!(
            "  Contents:      {} files, {}",
            file_count,
            human_bytes(total_bytes)
        );
    }
    println!();

    let outcome = BuildOutcome {
        python_version,
        pyinstaller_version,
        dist_dir,
        exe_path,
    };
    write_build_record(profile, toolchain, &outcome, file_count, total_bytes);

    Ok(Some(outcome))
}

/// Post-build follow-up: decide whether to open the output folder and open
/// it. `open` forces a yes and `no_prompt` forces a no without consulting the
/// operator; otherwise the answer from `confirm` decides. Anything but an
/// affirmative answer leaves the folder unopened. Open failures are a
/// warning, never an error; the build itself already succeeded.
pub fn offer_output_folder(
    toolchain: &impl ToolchainOps,
    outcome: &BuildOutcome,
    open: bool,
    no_prompt: bool,
    confirm: impl FnOnce() -> bool,
) {
    let wants_open = if open {
        true
    } else if no_prompt {
        false
    } else {
        confirm()
    };

    if !wants_open {
        return;
    }
    if let Err(e) = toolchain.open_folder(&outcome.dist_dir) {
        warn!("Could not open {:?}: {}", outcome.dist_dir, e);
    }
}

/// Probes PyInstaller and installs it if missing.
///
/// The install is attempted at most once; if PyInstaller is still not
/// answerable afterwards, that is a terminal failure. During a dry run the
/// install is skipped and only announced.
fn ensure_pyinstaller(toolchain: &impl ToolchainOps, dry_run: bool) -> Result<String> {
    match toolchain.pyinstaller_version() {
        Ok(version) => {
            info!("Found PyInstaller {}", version);
            Ok(version)
        }
        Err(_) if dry_run => {
            info!("PyInstaller not installed; a real run would install it via pip");
            Ok("(would install)".to_string())
        }
        Err(_) => {
            info!("PyInstaller not installed; installing via pip...");
            toolchain
                .install_pyinstaller()
                .context("Failed to install PyInstaller")?;
            let version = toolchain
                .pyinstaller_version()
                .context("PyInstaller still unavailable after install")?;
            info!("Installed PyInstaller {}", version);
            Ok(version)
        }
    }
}

/// Removes the scratch and output directories from a previous build.
///
/// Idempotent: directories that do not exist are skipped silently. Removal
/// failures are logged and NOT fatal; PyInstaller's `--noconfirm` overwrites
/// whatever is left. Returns false when any removal failed.
pub fn clean_artifacts(profile: &PackagingProfile, toolchain: &impl ToolchainOps) -> bool {
    let mut all_removed = true;
    for dir in [profile.build_dir(), profile.dist_dir()] {
        if !toolchain.path_exists(&dir) {
            continue;
        }
        match toolchain.remove_dir_tree(&dir) {
            Ok(()) => info!("Removed stale {}", dir.display()),
            Err(e) => {
                warn!("Could not remove {}: {}", dir.display(), e);
                all_removed = false;
            }
        }
    }
    all_removed
}

/// Prints the dry-run plan: what would be removed and the exact command line.
fn print_dry_run(
    profile: &PackagingProfile,
    toolchain: &impl ToolchainOps,
    python_version: &str,
    pyinstaller_version: &str,
) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                 What remocon-build Will Do");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("Interpreter:  {}", python_version);
    println!("PyInstaller:  {}", pyinstaller_version);
    println!();

    let stale: Vec<_> = [profile.build_dir(), profile.dist_dir()]
        .into_iter()
        .filter(|d| toolchain.path_exists(d))
        .collect();
    if stale.is_empty() {
        println!("No stale artifacts to remove.");
    } else {
        println!("REMOVING {} stale director{}:", stale.len(), if stale.len() == 1 { "y" } else { "ies" });
        for d in &stale {
            println!("  ✕ {}", d.display());
        }
    }

    println!();
    println!("PACKAGING command:");
    println!("  {}", profile.command_line());
    println!();
    println!("OUTPUT:");
    println!("  {}", profile.exe_path().display());
    println!();
    println!("───────────────────────────────────────────────────────────────");
    println!("This is a preview. Run 'remocon-build' to build for real.");
    println!();
}

/// Runs the environment report. Read-only; never modifies the system.
pub fn doctor(profile: &PackagingProfile, toolchain: &impl ToolchainOps) -> Result<()> {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                 Build Environment Report");
    println!("═══════════════════════════════════════════════════════════════");
    println!();

    println!("1. PYTHON INTERPRETER");
    match toolchain.python_version() {
        Ok(v) => println!("   ✓ {}", v),
        Err(e) => println!("   ⚠ Problem: {}", e),
    }

    println!();
    println!("2. PYINSTALLER");
    match toolchain.pyinstaller_version() {
        Ok(v) => println!("   ✓ Version {}", v),
        Err(_) => println!("   ⚠ Not installed (a build would install it via pip)"),
    }

    println!();
    println!("3. PROJECT FILES");
    let mut inputs = vec![(profile.entry.clone(), true), (profile.icon.clone(), false)];
    for (src, _) in &profile.data_assets {
        inputs.push((src.clone(), false));
    }
    for (path, required) in inputs {
        if toolchain.path_exists(&path) {
            println!("   ✓ {}", path.display());
        } else if required {
            println!("   ⚠ Missing (build will fail): {}", path.display());
        } else {
            println!("   ⚠ Missing: {}", path.display());
        }
    }

    println!();
    println!("4. STALE ARTIFACTS");
    let mut any_stale = false;
    for dir in [profile.build_dir(), profile.dist_dir()] {
        if toolchain.path_exists(&dir) {
            any_stale = true;
            println!("   • {} (removed automatically on the next build)", dir.display());
        }
    }
    if !any_stale {
        println!("   ✓ None");
    }

    println!();
    println!("───────────────────────────────────────────────────────────────");
    println!("Run 'remocon-build' to package {}.", profile.app_name);
    println!();

    Ok(())
}

/// Persists a JSON record of the build under the local data dir
/// (`<data_local>/remocon-build/last_build.json`). Best-effort: failures are
/// logged, never fatal.
fn write_build_record(
    profile: &PackagingProfile,
    toolchain: &impl ToolchainOps,
    outcome: &BuildOutcome,
    file_count: u64,
    total_bytes: u64,
) {
    let Some(base_dirs) = directories::BaseDirs::new() else {
        return;
    };
    let record_path = base_dirs
        .data_local_dir()
        .join("remocon-build")
        .join("last_build.json");

    let finished_at_epoch_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let record = BuildRecord {
        app: &profile.app_name,
        python_version: &outcome.python_version,
        pyinstaller_version: &outcome.pyinstaller_version,
        dist_dir: outcome.dist_dir.display().to_string(),
        exe_path: outcome.exe_path.display().to_string(),
        file_count,
        total_bytes,
        finished_at_epoch_secs,
    };

    match serde_json::to_string_pretty(&record) {
        Ok(json) => {
            if let Err(e) = toolchain.write_record_file(&record_path, &json) {
                warn!("Could not write build record to {:?}: {}", record_path, e);
            } else {
                info!("Wrote build record to {:?}", record_path);
            }
        }
        Err(e) => warn!("Could not serialize build record: {}", e),
    }
}

/// Walks a directory and returns (file count, total bytes). A missing
/// directory summarizes to (0, 0).
pub fn summarize_dir(dir: &Path) -> (u64, u64) {
    let mut files = 0u64;
    let mut bytes = 0u64;
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    (files, bytes)
}

/// Formats a byte count for the build report.
fn human_bytes(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= 1024.0 {
        format!("{:.1} KB", b / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::toolchain::MockToolchain;

    fn happy_mock() -> MockToolchain {
        MockToolchain {
            produced_on_package: vec![
                PackagingProfile::default().exe_path(),
                PackagingProfile::default().dist_dir(),
            ],
            ..MockToolchain::with_existing_paths(&[
                "main.py",
                "assets/app_icon.ico",
                "assets/app_icon.png",
            ])
        }
    }

    #[test]
    fn missing_interpreter_stops_before_any_packager_call() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain {
            python_ok: false,
            ..MockToolchain::default()
        };

        let result = run_build(&profile, &mock, false);

        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Python runtime check failed"), "got: {}", err);
        assert_eq!(*mock.install_calls.lock().unwrap(), 0);
        assert!(mock.package_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_dependency_is_installed_exactly_once_then_packaging_runs() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain {
            pyinstaller_installed: std::sync::Mutex::new(false),
            ..happy_mock()
        };

        let outcome = run_build(&profile, &mock, false).unwrap();

        assert!(outcome.is_some());
        assert_eq!(*mock.install_calls.lock().unwrap(), 1);
        assert_eq!(mock.package_calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_install_stops_before_packaging() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain {
            pyinstaller_installed: std::sync::Mutex::new(false),
            install_ok: false,
            ..happy_mock()
        };

        let result = run_build(&profile, &mock, false);

        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Failed to install PyInstaller"), "got: {}", err);
        assert_eq!(*mock.install_calls.lock().unwrap(), 1);
        assert!(mock.package_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn stale_artifacts_are_removed_before_packaging() {
        clear_invariant_log();
        let profile = PackagingProfile::default();
        let mock = happy_mock();
        mock.file_system
            .lock()
            .unwrap()
            .extend([profile.build_dir(), profile.dist_dir()]);

        let outcome = run_build(&profile, &mock, false).unwrap();

        assert!(outcome.is_some());
        let removed = mock.removed.lock().unwrap();
        assert!(removed.contains(&profile.build_dir()));
        assert!(removed.contains(&profile.dist_dir()));

        contract_test(
            "build pipeline",
            &["stale artifacts removed before packaging"],
        );
    }

    #[test]
    fn packager_failure_yields_error_and_no_outcome() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain {
            package_ok: false,
            ..happy_mock()
        };

        let result = run_build(&profile, &mock, false);

        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("PyInstaller failed"), "got: {}", err);
        // No build record gets written for a failed build.
        assert!(mock.records.lock().unwrap().is_empty());
    }

    #[test]
    fn successful_build_reports_paths_and_writes_record() {
        let profile = PackagingProfile::default();
        let mock = happy_mock();

        let outcome = run_build(&profile, &mock, false).unwrap().unwrap();

        assert_eq!(outcome.dist_dir, profile.dist_dir());
        assert_eq!(outcome.exe_path, profile.exe_path());

        let records = mock.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].1.contains("OneNote_Remocon"));
        assert!(records[0].0.ends_with("last_build.json"));
    }

    #[test]
    fn missing_entry_script_is_a_terminal_failure() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain::with_existing_paths(&["assets/app_icon.ico"]);

        let result = run_build(&profile, &mock, false);

        assert!(result.is_err());
        assert!(mock.package_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain {
            pyinstaller_installed: std::sync::Mutex::new(false),
            ..happy_mock()
        };
        // Pre-existing artifacts that a real build would delete.
        mock.file_system
            .lock()
            .unwrap()
            .push(profile.build_dir());

        let outcome = run_build(&profile, &mock, true).unwrap();

        assert!(outcome.is_none());
        assert_eq!(*mock.install_calls.lock().unwrap(), 0);
        assert!(mock.package_calls.lock().unwrap().is_empty());
        assert!(mock.removed.lock().unwrap().is_empty());
        assert!(mock.records.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_artifact_removal_is_nonfatal_and_packaging_proceeds() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain {
            remove_ok: false,
            ..happy_mock()
        };
        // A previous dist folder that stays locked by another process.
        mock.file_system.lock().unwrap().push(profile.dist_dir());

        let outcome = run_build(&profile, &mock, false).unwrap();

        assert!(outcome.is_some());
        // Removal was attempted, failed, and the build still ran through.
        assert_eq!(
            mock.removed.lock().unwrap().as_slice(),
            &[profile.dist_dir()]
        );
        assert_eq!(mock.package_calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn affirmative_answer_opens_the_output_folder() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain::default();
        let outcome = BuildOutcome {
            python_version: "Python 3.12.0".to_string(),
            pyinstaller_version: "6.10.0".to_string(),
            dist_dir: profile.dist_dir(),
            exe_path: profile.exe_path(),
        };

        offer_output_folder(&mock, &outcome, false, false, || true);

        assert_eq!(*mock.opened.lock().unwrap(), Some(profile.dist_dir()));
    }

    #[test]
    fn non_affirmative_answer_leaves_the_folder_unopened() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain::default();
        let outcome = BuildOutcome {
            python_version: "Python 3.12.0".to_string(),
            pyinstaller_version: "6.10.0".to_string(),
            dist_dir: profile.dist_dir(),
            exe_path: profile.exe_path(),
        };

        offer_output_folder(&mock, &outcome, false, false, || false);

        assert!(mock.opened.lock().unwrap().is_none());
    }

    #[test]
    fn open_flag_and_no_prompt_flag_both_skip_the_question() {
        let profile = PackagingProfile::default();
        let outcome = BuildOutcome {
            python_version: "Python 3.12.0".to_string(),
            pyinstaller_version: "6.10.0".to_string(),
            dist_dir: profile.dist_dir(),
            exe_path: profile.exe_path(),
        };

        let mock = MockToolchain::default();
        offer_output_folder(&mock, &outcome, true, false, || {
            panic!("prompt must not run under --open")
        });
        assert_eq!(*mock.opened.lock().unwrap(), Some(profile.dist_dir()));

        let mock = MockToolchain::default();
        offer_output_folder(&mock, &outcome, false, true, || {
            panic!("prompt must not run under --no-prompt")
        });
        assert!(mock.opened.lock().unwrap().is_none());
    }

    #[test]
    fn clean_is_idempotent_when_nothing_exists() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain::default();

        clean_artifacts(&profile, &mock);

        assert!(mock.removed.lock().unwrap().is_empty());
    }

    #[test]
    fn doctor_is_read_only() {
        let profile = PackagingProfile::default();
        let mock = MockToolchain {
            pyinstaller_installed: std::sync::Mutex::new(false),
            python_ok: false,
            ..MockToolchain::with_existing_paths(&["main.py"])
        };

        doctor(&profile, &mock).unwrap();

        assert!(mock.removed.lock().unwrap().is_empty());
        assert_eq!(*mock.install_calls.lock().unwrap(), 0);
        assert!(mock.package_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn summarize_dir_counts_real_files() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.bin"), [0u8; 10]).unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub").join("b.bin"), [0u8; 5]).unwrap();

        assert_eq!(summarize_dir(temp.path()), (2, 15));
        assert_eq!(summarize_dir(&temp.path().join("missing")), (0, 0));
    }

    #[test]
    fn human_bytes_picks_sane_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    proptest! {
        #[test]
        fn pipeline_always_packages_with_the_profile_args(
            app_name in "[A-Za-z][A-Za-z0-9_]{2,16}"
        ) {
            let profile = PackagingProfile {
                app_name,
                ..PackagingProfile::default()
            };
            let mock = MockToolchain::with_existing_paths(&[
                "main.py",
                "assets/app_icon.ico",
                "assets/app_icon.png",
            ]);

            let result = run_build(&profile, &mock, false);
            prop_assert!(result.is_ok(), "build failed: {:?}", result.err());

            // Exactly one packager invocation, with exactly the profile's args.
            let calls = mock.package_calls.lock().unwrap();
            prop_assert_eq!(calls.len(), 1);
            prop_assert_eq!(&calls[0], &profile.pyinstaller_args());
        }
    }
}
