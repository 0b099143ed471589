//! Common utilities shared by the toolchain collaborators and the orchestrator.
//!
//! ## Error Messages
//!
//! All functions in this module provide detailed, actionable error messages that include:
//! - What went wrong
//! - Where it happened (paths, commands)
//! - How to fix it (specific commands or configuration changes)

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::types::UniError;

/// Validates that the project root can be built.
///
/// This function checks that:
/// - The path exists and is a directory
/// - The configure script is present
///
/// # Arguments
/// * `project_root` - The library's top-level source directory
/// * `configure_script` - Path of the configure script relative to `project_root`
pub fn validate_project_root(project_root: &Path, configure_script: &Path) -> Result<(), UniError> {
    if !project_root.is_dir() {
        return Err(UniError::Config(format!(
            "Project root is not a directory: {}\n\n\
             Run from the library's top-level directory or pass --project-root.",
            project_root.display()
        )));
    }

    let configure = project_root.join(configure_script);
    if !configure.is_file() {
        return Err(UniError::Config(format!(
            "Configure script not found: {}\n\n\
             Generate it first (for autotools projects: ./autogen.sh) or set\n\
             `configure_script` in unisource.toml.",
            configure.display()
        )));
    }

    Ok(())
}

/// Runs an external command with consistent error handling.
///
/// Captures both stdout and stderr on failure and formats them into
/// an actionable error message.
///
/// # Arguments
/// * `cmd` - The command to execute
/// * `description` - Human-readable description of what the command does
///
/// # Returns
/// `Ok(())` if the command succeeds, or a `UniError::Toolchain` with detailed output on failure.
pub fn run_command(cmd: Command, description: &str) -> Result<(), UniError> {
    command_stdout(cmd, description).map(|_| ())
}

/// Runs an external command and returns its stdout as text.
pub fn command_stdout(mut cmd: Command, description: &str) -> Result<String, UniError> {
    tracing::debug!(command = ?cmd, "running {}", description);
    let output = cmd.output().map_err(|e| {
        UniError::Toolchain(format!(
            "Failed to start {}.\n\n\
             Error: {}\n\n\
             Ensure the tool is installed and available on PATH.",
            description, e
        ))
    })?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(UniError::Toolchain(format!(
            "{} failed.\n\n\
             Exit status: {}\n\n\
             Stdout:\n{}\n\n\
             Stderr:\n{}",
            description, output.status, stdout, stderr
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs an external command with its stdout redirected into `output_path`.
///
/// The parent directory of `output_path` is created if needed. On failure the
/// partially written file is left in place for inspection.
pub fn run_command_to_file(
    mut cmd: Command,
    output_path: &Path,
    description: &str,
) -> Result<(), UniError> {
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| UniError::io(parent, e))?;
    }
    let file = File::create(output_path).map_err(|e| UniError::io(output_path, e))?;
    cmd.stdout(Stdio::from(file)).stderr(Stdio::piped());

    tracing::debug!(command = ?cmd, output = %output_path.display(), "running {}", description);
    let output = cmd.output().map_err(|e| {
        UniError::Toolchain(format!(
            "Failed to start {}.\n\n\
             Error: {}\n\n\
             Ensure the tool is installed and available on PATH.",
            description, e
        ))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(UniError::Toolchain(format!(
            "{} failed.\n\n\
             Exit status: {}\n\n\
             Stderr:\n{}",
            description, output.status, stderr
        )));
    }
    Ok(())
}

/// Parses `Key: Value` lines as printed by `xcodebuild -sdk <name> -version`.
///
/// Lines without a `": "` separator (the SDK title line, blank lines) are
/// ignored. Later keys override earlier ones.
pub fn parse_key_values(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.trim().split_once(": "))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
