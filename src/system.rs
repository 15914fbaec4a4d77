//! # System Abstraction
//!
//! Everything that touches global OS state lives behind the two traits in this module:
//!
//! - [`FontStore`]: the Fonts folder, the font registration key in `HKLM`, and the
//!   `WM_FONTCHANGE` broadcast.
//! - [`ProcessControl`]: finding/terminating a running process by image name and
//!   launching one through the shell.
//!
//! This allows us to swap the real Windows calls for an in-memory `MockSystem` in tests.

use std::path::{Path, PathBuf};

use anyhow::Result;

/// Registry location (under `HKLM`) where installed fonts are registered.
#[cfg_attr(not(windows), allow(dead_code))]
pub const FONTS_REGISTRY_KEY: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion\Fonts";

/// The font-related half of the OS: files on disk plus their registrations.
pub trait FontStore {
    /// Resolve the system Fonts folder (`FOLDERID_Fonts`).
    fn fonts_dir(&self) -> Result<PathBuf>;

    /// Copy a font file into the Fonts folder. Must fail if `destination` already exists.
    fn copy_font(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Write `name -> file_name` under [`FONTS_REGISTRY_KEY`].
    fn register_font(&self, name: &str, file_name: &str) -> Result<()>;

    /// Load an installed font into the current session's font table.
    fn load_font(&self, path: &Path) -> Result<()>;

    /// Tell every top-level window that the font table changed.
    fn broadcast_font_change(&self) -> Result<()>;
}

/// Process enumeration and launching.
pub trait ProcessControl {
    /// Terminate the first running process whose image name equals `image_name` exactly.
    ///
    /// Returns the terminated process id, or `None` when nothing matched.
    fn terminate_first(&self, image_name: &str) -> Result<Option<u32>>;

    /// Start `image_name` through the shell "open" verb.
    fn launch(&self, image_name: &str) -> Result<()>;
}

#[cfg(windows)]
pub type PlatformSystem = WindowsSystem;
#[cfg(not(windows))]
pub type PlatformSystem = UnsupportedSystem;

/// The Real System implementation (Production).
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct WindowsSystem;

#[cfg(windows)]
mod win {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    /// NUL-terminated UTF-16 for the `*W` APIs.
    pub(super) fn wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    /// Reads a fixed-size UTF-16 buffer up to its first NUL.
    pub(super) fn from_wide_nul(buf: &[u16]) -> String {
        let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        String::from_utf16_lossy(&buf[..len])
    }
}

#[cfg(windows)]
impl FontStore for WindowsSystem {
    fn fonts_dir(&self) -> Result<PathBuf> {
        use std::ffi::OsString;
        use std::os::windows::ffi::OsStringExt;
        use windows::Win32::System::Com::CoTaskMemFree;
        use windows::Win32::UI::Shell::{FOLDERID_Fonts, KF_FLAG_DEFAULT, SHGetKnownFolderPath};

        unsafe {
            let raw = SHGetKnownFolderPath(&FOLDERID_Fonts, KF_FLAG_DEFAULT, None)?;
            let path = PathBuf::from(OsString::from_wide(raw.as_wide()));
            CoTaskMemFree(Some(raw.0 as _));
            if path.as_os_str().is_empty() {
                anyhow::bail!("Fonts known folder resolved to an empty path");
            }
            Ok(path)
        }
    }

    fn copy_font(&self, source: &Path, destination: &Path) -> Result<()> {
        use windows::Win32::Storage::FileSystem::CopyFileW;
        use windows::core::PCWSTR;

        let from = win::wide(source.as_os_str());
        let to = win::wide(destination.as_os_str());
        // bFailIfExists = TRUE: an already installed font is never overwritten.
        unsafe { CopyFileW(PCWSTR(from.as_ptr()), PCWSTR(to.as_ptr()), true)? };
        Ok(())
    }

    fn register_font(&self, name: &str, file_name: &str) -> Result<()> {
        use windows_registry::LOCAL_MACHINE;

        let key = LOCAL_MACHINE.create(FONTS_REGISTRY_KEY)?;
        key.set_string(name, file_name)?;
        Ok(())
    }

    fn load_font(&self, path: &Path) -> Result<()> {
        use windows::Win32::Graphics::Gdi::AddFontResourceW;
        use windows::core::PCWSTR;

        let file = win::wide(path.as_os_str());
        let added = unsafe { AddFontResourceW(PCWSTR(file.as_ptr())) };
        if added == 0 {
            anyhow::bail!("AddFontResource loaded no fonts from {}", path.display());
        }
        Ok(())
    }

    fn broadcast_font_change(&self) -> Result<()> {
        use windows::Win32::Foundation::{LPARAM, WPARAM};
        use windows::Win32::UI::WindowsAndMessaging::{
            HWND_BROADCAST, SMTO_ABORTIFHUNG, SendMessageTimeoutW, WM_FONTCHANGE,
        };

        unsafe {
            let mut result: usize = 0;
            SendMessageTimeoutW(
                HWND_BROADCAST,
                WM_FONTCHANGE,
                WPARAM(0),
                LPARAM(0),
                SMTO_ABORTIFHUNG,
                5000,
                Some(&mut result),
            );
        }
        Ok(())
    }
}

#[cfg(windows)]
impl ProcessControl for WindowsSystem {
    fn terminate_first(&self, image_name: &str) -> Result<Option<u32>> {
        use anyhow::Context;
        use log::debug;
        use windows::Win32::System::Diagnostics::ToolHelp::{
            CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
            TH32CS_SNAPPROCESS,
        };
        use windows::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};
        use windows::core::Owned;

        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .context("Failed to snapshot running processes")?;
        let snapshot = unsafe { Owned::new(snapshot) };

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        let mut more = unsafe { Process32FirstW(*snapshot, &mut entry) }.is_ok();
        while more {
            // Exact comparison on the image name, no case folding.
            if win::from_wide_nul(&entry.szExeFile) == image_name {
                let pid = entry.th32ProcessID;
                match unsafe { OpenProcess(PROCESS_TERMINATE, false, pid) } {
                    Ok(process) => {
                        let process = unsafe { Owned::new(process) };
                        unsafe { TerminateProcess(*process, 0) }
                            .with_context(|| format!("Failed to terminate {image_name} (pid {pid})"))?;
                        return Ok(Some(pid));
                    }
                    Err(e) => debug!("Cannot open {image_name} (pid {pid}) for termination: {e}"),
                }
            }
            more = unsafe { Process32NextW(*snapshot, &mut entry) }.is_ok();
        }

        Ok(None)
    }

    fn launch(&self, image_name: &str) -> Result<()> {
        use windows::Win32::UI::Shell::ShellExecuteW;
        use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
        use windows::core::{PCWSTR, w};

        let file = win::wide(std::ffi::OsStr::new(image_name));
        let result = unsafe {
            ShellExecuteW(
                None,
                w!("open"),
                PCWSTR(file.as_ptr()),
                PCWSTR::null(),
                PCWSTR::null(),
                SW_SHOWNORMAL,
            )
        };

        // ShellExecute returns an HINSTANCE > 32 on success.
        let code = result.0 as isize;
        if code <= 32 {
            anyhow::bail!("ShellExecute could not open {image_name} (code {code})");
        }
        Ok(())
    }
}

/// Stand-in for platforms without a Fonts folder registry or shell launcher.
///
/// Every operation fails, so the tool still builds and its argument handling can be
/// exercised anywhere.
#[cfg(not(windows))]
#[derive(Debug, Default)]
pub struct UnsupportedSystem;

#[cfg(not(windows))]
const UNSUPPORTED: &str = "font installation is only supported on Windows";

#[cfg(not(windows))]
impl FontStore for UnsupportedSystem {
    fn fonts_dir(&self) -> Result<PathBuf> {
        anyhow::bail!(UNSUPPORTED)
    }

    fn copy_font(&self, _source: &Path, _destination: &Path) -> Result<()> {
        anyhow::bail!(UNSUPPORTED)
    }

    fn register_font(&self, _name: &str, _file_name: &str) -> Result<()> {
        anyhow::bail!(UNSUPPORTED)
    }

    fn load_font(&self, _path: &Path) -> Result<()> {
        anyhow::bail!(UNSUPPORTED)
    }

    fn broadcast_font_change(&self) -> Result<()> {
        anyhow::bail!(UNSUPPORTED)
    }
}

#[cfg(not(windows))]
impl ProcessControl for UnsupportedSystem {
    fn terminate_first(&self, _image_name: &str) -> Result<Option<u32>> {
        anyhow::bail!("process control is only supported on Windows")
    }

    fn launch(&self, _image_name: &str) -> Result<()> {
        anyhow::bail!("process control is only supported on Windows")
    }
}

#[cfg(test)]
pub use mock::MockSystem;
