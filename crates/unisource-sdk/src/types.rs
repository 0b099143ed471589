//! Core types for unisource-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`UniError`] - Error types for classification, merging and platform passes
//! - [`Arch`] - The four architecture tags a file can carry
//! - [`Area`] - Which half of the output tree a file lands in
//! - [`PassStep`] / [`PassState`] - Progress of a single platform pass

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Error types for unisource-sdk operations.
///
/// Every variant is fatal for the run: there is no skip-and-continue path,
/// because a missing architecture would silently corrupt the umbrella headers.
///
/// # Example
///
/// ```ignore
/// use unisource_sdk::{UniError, UniversalBuilder, XcodeToolchain};
///
/// match UniversalBuilder::new(".").build(&XcodeToolchain::new()) {
///     Ok(report) => println!("{} umbrella headers", report.umbrella_headers.len()),
///     Err(UniError::Pass { platform, step, .. }) => {
///         eprintln!("{} failed while {}", platform, step);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum UniError {
    /// A configuration error occurred.
    ///
    /// Raised before any platform pass starts: missing SDK information,
    /// a compiler or linker that `xcrun` cannot locate, or an invalid
    /// project layout.
    #[error("configuration error: {0}")]
    Config(String),

    /// An external collaborator (SDK discovery, configure, a generator
    /// script) could not be started or exited with a failure status.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// Reading a source file or writing a destination failed.
    #[error("I/O error at {}: {source}. Check file paths and permissions", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walking a source tree failed (unreadable directory, broken link).
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// The run report could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A platform pass failed. Wraps the underlying error with the platform
    /// and the step that was running.
    #[error("platform pass '{platform}' failed while {step}: {source}")]
    Pass {
        platform: String,
        step: PassStep,
        #[source]
        source: Box<UniError>,
    },
}

impl UniError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UniError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn in_pass(self, platform: &str, step: PassStep) -> Self {
        UniError::Pass {
            platform: platform.to_string(),
            step,
            source: Box::new(self),
        }
    }
}

/// Architecture tag attached to a classified file.
///
/// The declaration order is the order in which umbrella headers list their
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "arm")]
    Arm,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "i386")]
    I386,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    pub const ALL: [Arch; 4] = [Arch::Arm, Arch::Arm64, Arch::I386, Arch::X86_64];

    /// Short architecture id used in file suffixes and build directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::I386 => "i386",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Compiler-defined macro that is only set when compiling for this arch.
    pub fn predefined_macro(&self) -> &'static str {
        match self {
            Arch::Arm => "__arm__",
            Arch::Arm64 => "__arm64__",
            Arch::I386 => "__i386__",
            Arch::X86_64 => "__x86_64__",
        }
    }

    /// Preprocessor guard bracketing content that belongs to this arch.
    pub fn guard(&self) -> Guard {
        Guard {
            prefix: format!("#ifdef {}\n\n", self.predefined_macro()),
            suffix: "\n\n#endif".to_string(),
        }
    }

    /// Parses a short architecture id (`arm`, `arm64`, `i386`, `x86_64`).
    pub fn parse(value: &str) -> Option<Arch> {
        Arch::ALL.into_iter().find(|arch| arch.as_str() == value)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Literal text written before and after a file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub prefix: String,
    pub suffix: String,
}

/// Half of the output tree a classified file is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    /// Mirrors the relative directory layout of the origin tree.
    Sources,
    /// Flat header directory.
    Headers,
}

/// Step of a platform pass, used to identify where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStep {
    Configuring,
    Building,
    Merging,
}

impl fmt::Display for PassStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PassStep::Configuring => "configuring",
            PassStep::Building => "building",
            PassStep::Merging => "merging",
        })
    }
}

/// Lifecycle of a single platform pass.
///
/// Passes advance strictly in declaration order; a failure leaves the pass
/// in the step that failed and aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassState {
    Pending,
    Configuring,
    Building,
    Merging,
    Done,
}

impl PassState {
    /// The state that follows this one, or `None` once the pass is done.
    pub fn next(self) -> Option<PassState> {
        match self {
            PassState::Pending => Some(PassState::Configuring),
            PassState::Configuring => Some(PassState::Building),
            PassState::Building => Some(PassState::Merging),
            PassState::Merging => Some(PassState::Done),
            PassState::Done => None,
        }
    }

    /// The failure step associated with an in-flight state.
    pub fn step(self) -> Option<PassStep> {
        match self {
            PassState::Configuring => Some(PassStep::Configuring),
            PassState::Building => Some(PassStep::Building),
            PassState::Merging => Some(PassStep::Merging),
            PassState::Pending | PassState::Done => None,
        }
    }
}
