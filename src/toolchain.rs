use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use anyhow::{Result, bail};
use log::debug;

/// Abstraction for toolchain and filesystem interactions (Python, pip,
/// PyInstaller, directory removal, folder opening).
/// This allows us to mock the external processes for testing; none of the
/// pipeline tests need a Python installation.
pub trait ToolchainOps {
    /// Probe the Python interpreter; returns its version line on success.
    fn python_version(&self) -> Result<String>;

    /// Probe PyInstaller; returns its version string if installed.
    fn pyinstaller_version(&self) -> Result<String>;

    /// Install PyInstaller via pip. Streams pip's output to the operator.
    fn install_pyinstaller(&self) -> Result<()>;

    /// Run PyInstaller with the given argument list, blocking until it exits.
    /// Errors on spawn failure or non-zero exit.
    fn run_pyinstaller(&self, args: &[String]) -> Result<()>;

    /// Check whether a path exists on the file system.
    fn path_exists(&self, path: &Path) -> bool;

    /// Recursively remove a directory tree.
    fn remove_dir_tree(&self, path: &Path) -> Result<()>;

    /// Write a small record file to disk.
    fn write_record_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Open a folder in the platform file browser.
    fn open_folder(&self, path: &Path) -> Result<()>;
}

/// Interpreter names probed in order. `py` is the Windows launcher.
const PYTHON_CANDIDATES: &[&str] = &["python", "python3", "py"];

/// The real toolchain (production). Resolves the interpreter once at
/// construction; every later call shells out through it.
pub struct SystemToolchain {
    python: Option<String>,
}

impl SystemToolchain {
    pub fn new() -> Self {
        Self { python: find_python() }
    }

    /// The resolved interpreter, or an error carrying the operator-facing
    /// diagnostic for a missing runtime.
    fn python(&self) -> Result<&str> {
        match &self.python {
            Some(p) => Ok(p),
            None => bail!(
                "Python interpreter not found on PATH (tried {}). Install Python 3 and try again.",
                PYTHON_CANDIDATES.join(", ")
            ),
        }
    }
}

impl ToolchainOps for SystemToolchain {
    fn python_version(&self) -> Result<String> {
        let python = self.python()?;
        let output = Command::new(python).arg("--version").output()?;
        if !output.status.success() {
            bail!("'{} --version' exited with {:?}", python, output.status.code());
        }
        // Some Python 2 builds print the version on stderr; prefer stdout.
        let text = if output.stdout.is_empty() { output.stderr } else { output.stdout };
        Ok(String::from_utf8_lossy(&text).trim().to_string())
    }

    fn pyinstaller_version(&self) -> Result<String> {
        let python = self.python()?;
        let output = Command::new(python)
            .args(["-m", "PyInstaller", "--version"])
            .output()?;
        if !output.status.success() {
            bail!("PyInstaller is not installed");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn install_pyinstaller(&self) -> Result<()> {
        let python = self.python()?;
        debug!("Running '{} -m pip install pyinstaller'", python);
        let status = Command::new(python)
            .args(["-m", "pip", "install", "pyinstaller"])
            .stdin(Stdio::null())
            .status()?;
        if !status.success() {
            bail!("pip install pyinstaller exited with {:?}", status.code());
        }
        Ok(())
    }

    fn run_pyinstaller(&self, args: &[String]) -> Result<()> {
        let python = self.python()?;
        debug!("Running '{} -m PyInstaller' with {} arguments", python, args.len());
        let status = Command::new(python)
            .args(["-m", "PyInstaller"])
            .args(args)
            .stdin(Stdio::null())
            .status()?;
        if !status.success() {
            bail!("PyInstaller exited with {:?}", status.code());
        }
        Ok(())
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_dir_tree(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    fn write_record_file(&self, path: &Path, content: &str) -> Result<()> {
        use std::io::Write;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = std::fs::File::create(path)?;
        f.write_all(content.as_bytes())?;
        Ok(())
    }

    fn open_folder(&self, path: &Path) -> Result<()> {
        let browser = if cfg!(windows) {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        // explorer.exe returns non-zero even on success, so only spawn
        // failures are treated as errors here.
        Command::new(browser).arg(path).status()?;
        Ok(())
    }
}

/// Probes the well-known interpreter names and returns the first that answers
/// a `--version` query.
fn find_python() -> Option<String> {
    for candidate in PYTHON_CANDIDATES {
        let probe = Command::new(candidate)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Ok(status) = probe {
            if status.success() {
                debug!("Resolved Python interpreter: {}", candidate);
                return Some(candidate.to_string());
            }
        }
    }
    None
}

/// A Mock Toolchain for Testing.
///
/// Scenario knobs (`python_ok`, `install_ok`, `package_ok`) configure which
/// step fails; the `Mutex` fields record what the pipeline actually did so
/// tests can assert on ordering and call counts.
#[derive(Debug)]
pub struct MockToolchain {
    pub python_ok: bool,
    pub pyinstaller_installed: std::sync::Mutex<bool>,
    pub install_ok: bool,
    pub package_ok: bool,
    pub remove_ok: bool,
    /// Paths that "exist" on the mock file system.
    pub file_system: std::sync::Mutex<Vec<PathBuf>>,
    /// Paths handed to `remove_dir_tree`, in order.
    pub removed: std::sync::Mutex<Vec<PathBuf>>,
    /// Number of `install_pyinstaller` calls.
    pub install_calls: std::sync::Mutex<u32>,
    /// Argument lists handed to `run_pyinstaller`.
    pub package_calls: std::sync::Mutex<Vec<Vec<String>>>,
    /// Paths inserted into the mock file system after a successful package run.
    pub produced_on_package: Vec<PathBuf>,
    /// Record files written via `write_record_file`.
    pub records: std::sync::Mutex<Vec<(PathBuf, String)>>,
    pub opened: std::sync::Mutex<Option<PathBuf>>,
}

impl Default for MockToolchain {
    fn default() -> Self {
        Self {
            python_ok: true,
            pyinstaller_installed: std::sync::Mutex::new(true),
            install_ok: true,
            package_ok: true,
            remove_ok: true,
            file_system: std::sync::Mutex::new(Vec::new()),
            removed: std::sync::Mutex::new(Vec::new()),
            install_calls: std::sync::Mutex::new(0),
            package_calls: std::sync::Mutex::new(Vec::new()),
            produced_on_package: Vec::new(),
            records: std::sync::Mutex::new(Vec::new()),
            opened: std::sync::Mutex::new(None),
        }
    }
}

impl MockToolchain {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose file system already contains the given paths.
    #[allow(dead_code)]
    pub fn with_existing_paths(paths: &[&str]) -> Self {
        Self {
            file_system: std::sync::Mutex::new(
                paths.iter().map(|p| PathBuf::from(*p)).collect(),
            ),
            ..Default::default()
        }
    }
}

impl ToolchainOps for MockToolchain {
    fn python_version(&self) -> Result<String> {
        if self.python_ok {
            Ok("Python 3.12.0".to_string())
        } else {
            bail!("Python interpreter not found on PATH")
        }
    }

    fn pyinstaller_version(&self) -> Result<String> {
        if *self.pyinstaller_installed.lock().unwrap() {
            Ok("6.10.0".to_string())
        } else {
            bail!("PyInstaller is not installed")
        }
    }

    fn install_pyinstaller(&self) -> Result<()> {
        *self.install_calls.lock().unwrap() += 1;
        if self.install_ok {
            *self.pyinstaller_installed.lock().unwrap() = true;
            Ok(())
        } else {
            bail!("pip install pyinstaller exited with Some(1)")
        }
    }

    fn run_pyinstaller(&self, args: &[String]) -> Result<()> {
        self.package_calls.lock().unwrap().push(args.to_vec());
        if self.package_ok {
            let mut fs = self.file_system.lock().unwrap();
            for p in &self.produced_on_package {
                fs.push(p.clone());
            }
            Ok(())
        } else {
            bail!("PyInstaller exited with Some(1)")
        }
    }

    fn path_exists(&self, path: &Path) -> bool {
        let fs = self.file_system.lock().unwrap();
        fs.contains(&path.to_path_buf())
    }

    fn remove_dir_tree(&self, path: &Path) -> Result<()> {
        self.removed.lock().unwrap().push(path.to_path_buf());
        if !self.remove_ok {
            bail!("Access is denied. (os error 5)");
        }
        let mut fs = self.file_system.lock().unwrap();
        fs.retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn write_record_file(&self, path: &Path, content: &str) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.to_string()));
        Ok(())
    }

    fn open_folder(&self, path: &Path) -> Result<()> {
        *self.opened.lock().unwrap() = Some(path.to_path_buf());
        Ok(())
    }
}
