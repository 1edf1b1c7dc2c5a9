//! # Packaging Profile
//!
//! The fixed, non-configurable description of what gets packaged and how.
//! Everything PyInstaller needs (entry script, application name, icon,
//! data-asset mappings, output layout) lives here, along with the derived
//! artifact paths: `build/`, `dist/<AppName>/`, and the final executable.
//!
//! The argument list is deliberately not user-configurable: this tool builds
//! exactly one application, the same way every time.

use std::path::PathBuf;

/// Name of the packaged application. Also the dist subfolder and executable stem.
pub const APP_NAME: &str = "OneNote_Remocon";

/// Describes one build of the application: inputs, PyInstaller flags, outputs.
#[derive(Debug, Clone)]
pub struct PackagingProfile {
    /// Application name passed to `--name`; doubles as the dist subfolder.
    pub app_name: String,
    /// Entry script handed to PyInstaller (relative to the project root).
    pub entry: PathBuf,
    /// Icon resource for the windowed executable.
    pub icon: PathBuf,
    /// Data files bundled alongside the executable: (source file, dest subfolder).
    pub data_assets: Vec<(PathBuf, String)>,
}

impl Default for PackagingProfile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            entry: PathBuf::from("main.py"),
            icon: PathBuf::from("assets/app_icon.ico"),
            data_assets: vec![
                (PathBuf::from("assets/app_icon.ico"), "assets".to_string()),
                (PathBuf::from("assets/app_icon.png"), "assets".to_string()),
            ],
        }
    }
}

impl PackagingProfile {
    /// PyInstaller's scratch directory.
    pub fn build_dir(&self) -> PathBuf {
        PathBuf::from("build")
    }

    /// The one-folder output directory: `dist/<AppName>`.
    pub fn dist_dir(&self) -> PathBuf {
        PathBuf::from("dist").join(&self.app_name)
    }

    /// Final executable path inside the dist folder.
    ///
    /// PyInstaller appends `.exe` on Windows and nothing elsewhere.
    pub fn exe_path(&self) -> PathBuf {
        let file_name = if cfg!(windows) {
            format!("{}.exe", self.app_name)
        } else {
            self.app_name.clone()
        };
        self.dist_dir().join(file_name)
    }

    /// The full argument list for `python -m PyInstaller`.
    ///
    /// Order matters only for readability; PyInstaller accepts flags in any
    /// position. The entry script goes last, matching how the command is
    /// usually written by hand.
    pub fn pyinstaller_args(&self) -> Vec<String> {
        let mut args = vec![
            "--noconfirm".to_string(),
            "--onedir".to_string(),
            "--windowed".to_string(),
            "--name".to_string(),
            self.app_name.clone(),
            "--icon".to_string(),
            self.icon.to_string_lossy().to_string(),
        ];

        for (src, dest) in &self.data_assets {
            args.push("--add-data".to_string());
            args.push(format!(
                "{}{}{}",
                src.to_string_lossy(),
                add_data_separator(),
                dest
            ));
        }

        args.push(self.entry.to_string_lossy().to_string());
        args
    }

    /// Renders the packaging invocation as a single shell-style line for
    /// dry-run output and logs.
    pub fn command_line(&self) -> String {
        let mut line = String::from("python -m PyInstaller");
        for arg in self.pyinstaller_args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// PyInstaller's `--add-data` separator between source and destination.
///
/// `;` on Windows, `:` everywhere else. This mirrors PyInstaller's own
/// platform rule, not ours.
fn add_data_separator() -> char {
    if cfg!(windows) { ';' } else { ':' }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_profile_matches_fixed_contract() {
        let p = PackagingProfile::default();
        assert_eq!(p.app_name, "OneNote_Remocon");
        assert_eq!(p.entry, PathBuf::from("main.py"));
        assert_eq!(p.dist_dir(), PathBuf::from("dist").join("OneNote_Remocon"));
        assert_eq!(p.data_assets.len(), 2);
    }

    #[test]
    fn args_carry_windowed_onedir_and_icon() {
        let args = PackagingProfile::default().pyinstaller_args();
        assert!(args.contains(&"--windowed".to_string()));
        assert!(args.contains(&"--onedir".to_string()));
        assert!(args.contains(&"--noconfirm".to_string()));
        let icon_pos = args.iter().position(|a| a == "--icon").unwrap();
        assert_eq!(args[icon_pos + 1], "assets/app_icon.ico");
    }

    #[test]
    fn both_data_assets_map_to_assets_subfolder() {
        let args = PackagingProfile::default().pyinstaller_args();
        let sep = add_data_separator();
        let mappings: Vec<&String> = args
            .iter()
            .zip(args.iter().skip(1))
            .filter(|(flag, _)| flag.as_str() == "--add-data")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(mappings.len(), 2);
        for m in mappings {
            assert!(m.ends_with(&format!("{}assets", sep)), "bad mapping: {}", m);
        }
    }

    #[test]
    fn exe_path_sits_inside_dist_dir() {
        let p = PackagingProfile::default();
        assert!(p.exe_path().starts_with(p.dist_dir()));
    }

    proptest! {
        #[test]
        fn arg_list_properties(
            app_name in "[A-Za-z][A-Za-z0-9_]{2,20}",
            entry in "[a-z]{3,10}\\.py"
        ) {
            let profile = PackagingProfile {
                app_name: app_name.clone(),
                entry: PathBuf::from(entry.clone()),
                ..PackagingProfile::default()
            };
            let args = profile.pyinstaller_args();

            // The entry script is always the final argument.
            prop_assert_eq!(args.last().unwrap(), &entry);

            // --name is always followed by the application name.
            let name_pos = args.iter().position(|a| a == "--name").unwrap();
            prop_assert_eq!(&args[name_pos + 1], &app_name);

            // No argument is ever empty.
            prop_assert!(args.iter().all(|a| !a.is_empty()));

            // Artifact paths follow the name.
            prop_assert!(profile.exe_path().starts_with(profile.dist_dir()));
            prop_assert!(
                profile
                    .exe_path()
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(&app_name)
            );
        }
    }
}
