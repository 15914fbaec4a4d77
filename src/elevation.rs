//! # Elevation Module
//!
//! Handles User Account Control (UAC) privileges on Windows.
//!
//! Writing into `%WINDIR%\Fonts` and `HKLM\...\Fonts` requires Administrator rights. When we
//! start without them we relaunch the same executable through the `runas` verb (which
//! triggers the UAC prompt), forwarding every original argument, and the unprivileged
//! instance exits. This is a one-shot relaunch, never a retry loop.
//!
//! On platforms without UAC the check always passes.

use log::warn;
use thiserror::Error;

/// Capability check plus "re-execute myself elevated".
pub trait Privileges {
    /// Whether the current process is a member of the local Administrators group.
    ///
    /// Query failures count as "not elevated".
    fn is_elevated(&self) -> bool;

    /// Start an elevated copy of the current executable with `args`.
    fn relaunch_elevated(&self, args: &[String]) -> Result<(), ElevationError>;
}

#[derive(Debug, Error)]
#[cfg_attr(not(windows), allow(dead_code))]
pub enum ElevationError {
    #[error("Failed to resolve the current executable: {0}")]
    CurrentExe(#[from] std::io::Error),

    /// `code` is the Win32 error (1223 when the UAC prompt is declined).
    #[error("Failed to elevate privileges. Error: {code} (HRESULT {hresult:#010x})")]
    Launch { code: u32, hresult: i32 },
}

#[cfg_attr(not(windows), allow(dead_code))]
impl ElevationError {
    /// Builds a launch error from the `HRESULT` a shell call failed with.
    pub fn launch(hresult: i32) -> Self {
        Self::Launch {
            code: hresult as u32 & 0xFFFF,
            hresult,
        }
    }
}

/// What the caller should do after [`ensure_elevated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Keep going in this process.
    AlreadyElevated,
    /// An elevated instance was started; this one must exit with status 0.
    Relaunched,
}

pub fn ensure_elevated(
    privileges: &impl Privileges,
    args: &[String],
) -> Result<Elevation, ElevationError> {
    if privileges.is_elevated() {
        return Ok(Elevation::AlreadyElevated);
    }

    warn!("Program is not running as administrator. Relaunching with elevated privileges...");
    privileges.relaunch_elevated(args)?;
    Ok(Elevation::Relaunched)
}

/// Builds a command line where each argument is wrapped in double quotes.
///
/// Follows the `CommandLineToArgvW` rules: embedded quotes are escaped and backslashes
/// that precede a quote are doubled, so `C:\Fonts\` survives the round trip.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn quote_arguments(args: &[String]) -> String {
    args.iter()
        .map(|arg| quote_argument(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_argument(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');

    let mut backslashes = 0;
    for c in arg.chars() {
        if c == '\\' {
            backslashes += 1;
            continue;
        }
        let escapes = if c == '"' { backslashes * 2 + 1 } else { backslashes };
        quoted.extend(std::iter::repeat_n('\\', escapes));
        quoted.push(c);
        backslashes = 0;
    }
    quoted.extend(std::iter::repeat_n('\\', backslashes * 2));

    quoted.push('"');
    quoted
}

#[cfg(windows)]
pub type PlatformPrivileges = WindowsPrivileges;
#[cfg(not(windows))]
pub type PlatformPrivileges = NoElevation;

#[cfg(windows)]
#[derive(Debug, Default)]
pub struct WindowsPrivileges;

#[cfg(windows)]
impl Privileges for WindowsPrivileges {
    fn is_elevated(&self) -> bool {
        use windows::Win32::UI::Shell::IsUserAnAdmin;

        // Checks the token for the BUILTIN\Administrators group.
        unsafe { IsUserAnAdmin().as_bool() }
    }

    /// Relaunches through `ShellExecuteExW` with the "runas" verb.
    ///
    /// # Safety
    /// The wide strings backing `lpFile`/`lpParameters` outlive the call.
    fn relaunch_elevated(&self, args: &[String]) -> Result<(), ElevationError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        use log::info;
        use windows::Win32::UI::Shell::{SHELLEXECUTEINFOW, ShellExecuteExW};
        use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
        use windows::core::{PCWSTR, w};

        let exe_path = std::env::current_exe()?;
        let params = quote_arguments(args);
        info!("Relaunching as admin: {:?} {}", exe_path, params);

        let file: Vec<u16> = exe_path.as_os_str().encode_wide().chain(Some(0)).collect();
        let parameters: Vec<u16> = OsStr::new(&params).encode_wide().chain(Some(0)).collect();

        let mut info = SHELLEXECUTEINFOW {
            cbSize: std::mem::size_of::<SHELLEXECUTEINFOW>() as u32,
            lpVerb: w!("runas"),
            lpFile: PCWSTR(file.as_ptr()),
            lpParameters: PCWSTR(parameters.as_ptr()),
            nShow: SW_SHOWNORMAL.0,
            ..Default::default()
        };

        unsafe { ShellExecuteExW(&mut info) }.map_err(|e| ElevationError::launch(e.code().0))
    }
}

/// No privilege distinction: always "elevated", relaunching is a no-op.
#[cfg(not(windows))]
#[derive(Debug, Default)]
pub struct NoElevation;

#[cfg(not(windows))]
impl Privileges for NoElevation {
    fn is_elevated(&self) -> bool {
        true
    }

    fn relaunch_elevated(&self, _args: &[String]) -> Result<(), ElevationError> {
        Ok(())
    }
}
