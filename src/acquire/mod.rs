//! Acquisition modules.
//!
//! Each submodule wraps one external data source -- a system utility or
//! a network endpoint -- and normalizes its output into a structure the
//! collectors consume. Parsing is kept separate from execution so tests
//! can feed the parsers canned output; each execution seam is a small
//! `Send + Sync` trait with one stock implementation.

pub mod ntp;
pub mod sidecar;
pub mod vm;
pub mod zfs;
pub mod zone;

use metric;
use std::process::Command;

/// stdout, stderr and exit success of one tool run.
pub struct ToolOutput {
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
    /// Whether the tool exited zero.
    pub success: bool,
}

/// Run a tool to completion, capturing both output streams.
pub fn run_tool(cmd: &str, args: &[&str]) -> Result<ToolOutput, metric::Error> {
    let output = Command::new(cmd).args(args).output().map_err(|e| {
        metric::Error::NotAvailable(format!("unable to exec {}: {}", cmd, e))
    })?;
    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    })
}
