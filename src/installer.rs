//! # Font Installer
//!
//! Copies every regular file from a source folder into the system Fonts folder and
//! registers each one so applications see it in their font pickers.
//!
//! ## Per-font steps
//!
//! 1.  **Name**: the display name is the file name without its final extension
//!     (`Arial Custom.ttf` -> `Arial Custom`).
//! 2.  **Copy**: into the Fonts folder under the original file name. An existing file is
//!     never overwritten; that entry fails and the next one is processed.
//! 3.  **Register**: `display name -> file name` under the font registration key.
//! 4.  **Load**: the copied file is added to the running session's font table.
//!
//! Failures are logged per entry and never roll back earlier entries. After the loop a
//! `WM_FONTCHANGE` broadcast is sent no matter how many entries succeeded.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::{Serialize, Serializer};
use thiserror::Error;
use walkdir::WalkDir;

use crate::system::FontStore;

/// Extensions accepted by `--fonts-only` (compared lowercase).
pub const FONT_EXTENSIONS: [&str; 4] = ["ttf", "otf", "ttc", "fon"];

/// A single file from the source folder, considered one font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontEntry {
    pub source: PathBuf,
    /// On-disk name; the copy in the Fonts folder keeps it byte for byte.
    pub os_file_name: OsString,
    /// Registry value data (lossy if the on-disk name is not valid Unicode).
    pub file_name: String,
    /// Registry value name.
    pub name: String,
}

impl FontEntry {
    pub fn from_path(path: &Path) -> Option<Self> {
        let os_file_name = path.file_name()?.to_os_string();
        let file_name = os_file_name.to_string_lossy().into_owned();
        let name = font_name(&file_name).to_string();
        Some(Self {
            source: path.to_path_buf(),
            os_file_name,
            file_name,
            name,
        })
    }

    pub fn destination(&self, fonts_dir: &Path) -> PathBuf {
        fonts_dir.join(&self.os_file_name)
    }
}

/// Strips everything from the final `.` onward. Names without a `.` are returned as-is.
pub fn font_name(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem)
}

fn has_font_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| FONT_EXTENSIONS.contains(&ext.as_str()))
}

#[derive(Debug, Default, Clone)]
pub struct InstallOptions {
    /// Only files with one of [`FONT_EXTENSIONS`] are installed.
    pub fonts_only: bool,
}

/// Why a single font was not installed.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("Failed to copy {} to {}: {reason}", .font.display(), .destination.display())]
    Copy {
        font: PathBuf,
        destination: PathBuf,
        reason: String,
    },

    #[error("Failed to add {name} to registry: {reason}")]
    Register { name: String, reason: String },

    /// Registering an empty value name would overwrite the key's default value.
    #[error("Refusing to install {file}: derived font name is empty")]
    EmptyName { file: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InstalledFont {
    pub name: String,
    pub file_name: String,
    pub destination: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct FontFailure {
    pub file_name: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: FontError,
}

fn serialize_display<S: Serializer>(error: &FontError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Aggregate outcome of one [`install_fonts`] run.
#[derive(Debug, Serialize)]
pub struct InstallReport {
    pub fonts_dir: PathBuf,
    pub installed: Vec<InstalledFont>,
    pub failures: Vec<FontFailure>,
    /// Files passed over by `--fonts-only`.
    pub skipped: usize,
}

impl InstallReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Lists the top-level regular files of `source` in file-name order.
///
/// Symlinks are followed, so a link to a font file counts as that file. Subdirectories
/// and other special entries are ignored. Returns the entries and how many regular
/// files the extension filter skipped.
pub fn discover_fonts(source: &Path, options: &InstallOptions) -> (Vec<FontEntry>, usize) {
    let mut entries = Vec::new();
    let mut skipped = 0;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!("Failed to read entry in {}: {}", source.display(), e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() {
            debug!("Ignoring non-file entry {:?}", path);
            continue;
        }

        if options.fonts_only && !has_font_extension(path) {
            debug!("Skipping {:?}: not a font file", path);
            skipped += 1;
            continue;
        }

        if let Some(font) = FontEntry::from_path(path) {
            entries.push(font);
        }
    }

    (entries, skipped)
}

/// Installs every font found in `source`.
///
/// # Errors
///
/// Only when the Fonts folder cannot be resolved. Per-font failures are logged and
/// collected in the returned [`InstallReport`].
pub fn install_fonts(
    store: &impl FontStore,
    source: &Path,
    options: &InstallOptions,
) -> Result<InstallReport> {
    let fonts_dir = store
        .fonts_dir()
        .context("Failed to get Windows Fonts folder path")?;

    info!("Installing fonts from {:?} into {:?}", source, fonts_dir);

    let (entries, skipped) = discover_fonts(source, options);
    let mut report = InstallReport {
        fonts_dir: fonts_dir.clone(),
        installed: Vec::new(),
        failures: Vec::new(),
        skipped,
    };

    for entry in entries {
        match install_font(store, &entry, &fonts_dir) {
            Ok(font) => {
                info!("Successfully installed font: {}", font.name);
                report.installed.push(font);
            }
            Err(e) => {
                error!("{e}");
                report.failures.push(FontFailure {
                    file_name: entry.file_name,
                    error: e,
                });
            }
        }
    }

    if let Err(e) = store.broadcast_font_change() {
        warn!("Failed to broadcast font change: {e:#}");
    }

    info!(
        "Font installation completed: {} installed, {} failed, {} skipped",
        report.installed.len(),
        report.failures.len(),
        report.skipped
    );

    Ok(report)
}

fn install_font(
    store: &impl FontStore,
    entry: &FontEntry,
    fonts_dir: &Path,
) -> Result<InstalledFont, FontError> {
    if entry.name.is_empty() {
        return Err(FontError::EmptyName {
            file: entry.file_name.clone(),
        });
    }

    let destination = entry.destination(fonts_dir);
    store
        .copy_font(&entry.source, &destination)
        .map_err(|e| FontError::Copy {
            font: entry.source.clone(),
            destination: destination.clone(),
            reason: format!("{e:#}"),
        })?;
    info!("Copied {:?} to {:?}", entry.source, destination);

    store
        .register_font(&entry.name, &entry.file_name)
        .map_err(|e| FontError::Register {
            name: entry.name.clone(),
            reason: format!("{e:#}"),
        })?;
    debug!("Registered {} -> {}", entry.name, entry.file_name);

    // The registry entry makes the font permanent; loading it only spares a re-login.
    if let Err(e) = store.load_font(&destination) {
        warn!("Installed {} but could not load it into this session: {e:#}", entry.name);
    }

    Ok(InstalledFont {
        name: entry.name.clone(),
        file_name: entry.file_name.clone(),
        destination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockSystem;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn source_with(files: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            fs::write(dir.path().join(name), b"font bytes").unwrap();
        }
        dir
    }

    fn fonts_dir() -> PathBuf {
        PathBuf::from(r"C:\Windows\Fonts")
    }

    #[test]
    fn derives_name_from_file_name() {
        assert_eq!(font_name("Arial Custom.ttf"), "Arial Custom");
        assert_eq!(font_name("Fira.Code.Bold.otf"), "Fira.Code.Bold");
        assert_eq!(font_name("NOEXTENSION"), "NOEXTENSION");
        assert_eq!(font_name(".ttf"), "");
    }

    #[test]
    fn installs_every_regular_file() {
        let source = source_with(&["Arial Custom.ttf", "Mono.otf", "readme.txt"]);
        fs::create_dir(source.path().join("nested")).unwrap();
        fs::write(source.path().join("nested").join("Inner.ttf"), b"x").unwrap();
        let system = MockSystem::new(fonts_dir());

        let report = install_fonts(&system, source.path(), &InstallOptions::default()).unwrap();

        assert_eq!(report.installed.len(), 3);
        assert!(report.is_clean());
        assert_eq!(system.fonts.lock().unwrap().len(), 3);
        assert_eq!(system.registry.lock().unwrap().len(), 3);
        assert_eq!(
            system.registry_value("Arial Custom").as_deref(),
            Some("Arial Custom.ttf")
        );
        assert_eq!(system.registry_value("readme").as_deref(), Some("readme.txt"));
        assert!(system.registry_value("Inner").is_none());
        assert!(
            system
                .fonts
                .lock()
                .unwrap()
                .contains(&fonts_dir().join("Arial Custom.ttf"))
        );
        assert_eq!(system.loaded.lock().unwrap().len(), 3);
        assert_eq!(system.broadcast_count(), 1);
    }

    #[test]
    fn existing_destination_is_not_overwritten() {
        let source = source_with(&["Present.ttf", "Fresh.ttf"]);
        let system = MockSystem::new(fonts_dir()).with_installed(fonts_dir().join("Present.ttf"));

        let report = install_fonts(&system, source.path(), &InstallOptions::default()).unwrap();

        assert_eq!(report.installed.len(), 1);
        assert_eq!(report.installed[0].name, "Fresh");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file_name, "Present.ttf");
        assert!(matches!(report.failures[0].error, FontError::Copy { .. }));
        // The failed copy must not be followed by a registration.
        assert!(system.registry_value("Present").is_none());
        assert_eq!(system.broadcast_count(), 1);
    }

    #[test]
    fn registration_failure_does_not_stop_other_fonts() {
        let source = source_with(&["Denied.ttf", "Allowed.ttf"]);
        let mut system = MockSystem::new(fonts_dir());
        system.deny_register.insert("Denied".to_string());

        let report = install_fonts(&system, source.path(), &InstallOptions::default()).unwrap();

        assert_eq!(report.installed.len(), 1);
        assert!(matches!(
            &report.failures[0].error,
            FontError::Register { name, .. } if name == "Denied"
        ));
        assert_eq!(system.registry_value("Allowed").as_deref(), Some("Allowed.ttf"));
        // The copy already happened and is not rolled back.
        assert!(
            system
                .fonts
                .lock()
                .unwrap()
                .contains(&fonts_dir().join("Denied.ttf"))
        );
    }

    #[test]
    fn empty_folder_still_broadcasts() {
        let source = tempfile::tempdir().unwrap();
        let system = MockSystem::new(fonts_dir());

        let report = install_fonts(&system, source.path(), &InstallOptions::default()).unwrap();

        assert!(report.installed.is_empty());
        assert!(report.is_clean());
        assert_eq!(system.broadcast_count(), 1);
    }

    #[test]
    fn missing_fonts_dir_is_an_error() {
        let source = source_with(&["A.ttf"]);
        let system = MockSystem::default();

        let result = install_fonts(&system, source.path(), &InstallOptions::default());

        assert!(result.is_err());
        assert!(system.registry.lock().unwrap().is_empty());
        assert_eq!(system.broadcast_count(), 0);
    }

    #[test]
    fn fonts_only_skips_other_files() {
        let source = source_with(&["A.TTF", "B.otf", "notes.txt", "C.ttc"]);
        let system = MockSystem::new(fonts_dir());
        let options = InstallOptions { fonts_only: true };

        let report = install_fonts(&system, source.path(), &options).unwrap();

        let names: Vec<_> = report.installed.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let source = source_with(&[".ttf", "Good.ttf"]);
        let system = MockSystem::new(fonts_dir());

        let report = install_fonts(&system, source.path(), &InstallOptions::default()).unwrap();

        assert_eq!(report.installed.len(), 1);
        assert!(matches!(report.failures[0].error, FontError::EmptyName { .. }));
        assert!(system.registry_value("").is_none());
        assert!(!system.fonts.lock().unwrap().contains(&fonts_dir().join(".ttf")));
    }

    #[test]
    fn report_serializes_errors_as_messages() {
        let source = source_with(&["Present.ttf"]);
        let system = MockSystem::new(fonts_dir()).with_installed(fonts_dir().join("Present.ttf"));

        let report = install_fonts(&system, source.path(), &InstallOptions::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        let message = json["failures"][0]["error"].as_str().unwrap();
        assert!(message.starts_with("Failed to copy"), "unexpected message: {message}");
        assert_eq!(json["skipped"], 0);
    }

    #[cfg(unix)]
    #[test]
    fn destination_keeps_non_unicode_file_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = OsStr::from_bytes(b"Bad\xFF Name.ttf");
        let entry = FontEntry::from_path(&Path::new("/src").join(raw)).unwrap();

        assert_eq!(entry.destination(&fonts_dir()).file_name(), Some(raw));
        assert_eq!(entry.file_name, "Bad\u{FFFD} Name.ttf");
        assert_eq!(entry.name, "Bad\u{FFFD} Name");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_font_files_are_installed() {
        let target = source_with(&["Linked.ttf"]);
        let source = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(target.path().join("Linked.ttf"), source.path().join("Linked.ttf"))
            .unwrap();
        std::os::unix::fs::symlink(target.path(), source.path().join("folder-link")).unwrap();
        let system = MockSystem::new(fonts_dir());

        let report = install_fonts(&system, source.path(), &InstallOptions::default()).unwrap();

        let names: Vec<_> = report.installed.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Linked"]);
        assert!(report.is_clean());
        assert_eq!(system.registry_value("Linked").as_deref(), Some("Linked.ttf"));
    }

    proptest! {
        #[test]
        fn name_is_file_name_minus_last_extension(
            stem in "[A-Za-z0-9 ._-]{1,24}",
            ext in "[A-Za-z0-9]{1,5}",
        ) {
            let file_name = format!("{stem}.{ext}");
            prop_assert_eq!(font_name(&file_name), stem.as_str());
        }

        #[test]
        fn names_without_dot_are_unchanged(file_name in "[A-Za-z0-9 _-]{1,24}") {
            prop_assert_eq!(font_name(&file_name), file_name.as_str());
        }
    }
}
