//! # Companion App Restarter
//!
//! The desktop customization app (Rainmeter by default) caches the font list at startup,
//! so after installing fonts we kill the running instance and start a fresh one.
//!
//! Only the first process whose image name matches *exactly* (case-sensitive) is
//! terminated. The relaunch is attempted even when nothing was found or the process
//! scan itself failed. Nothing in here returns an error; every failure is logged.

use log::{error, info};
use serde::Serialize;

use crate::system::ProcessControl;

pub const DEFAULT_COMPANION_APP: &str = "Rainmeter.exe";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestartOutcome {
    /// Process id of the terminated instance.
    pub terminated: Option<u32>,
    pub launched: bool,
}

pub fn restart_companion_app(processes: &impl ProcessControl, image_name: &str) -> RestartOutcome {
    info!("Checking for {image_name} process...");
    let terminated = match processes.terminate_first(image_name) {
        Ok(Some(pid)) => {
            info!("{image_name} process (pid {pid}) terminated successfully.");
            Some(pid)
        }
        Ok(None) => {
            info!("{image_name} process not found or unable to terminate.");
            None
        }
        Err(e) => {
            error!("Failed to stop {image_name}: {e:#}");
            None
        }
    };

    info!("Restarting {image_name}...");
    let launched = match processes.launch(image_name) {
        Ok(()) => {
            info!("{image_name} restarted successfully.");
            true
        }
        Err(e) => {
            error!("Failed to restart {image_name}: {e:#}");
            false
        }
    };

    RestartOutcome {
        terminated,
        launched,
    }
}
