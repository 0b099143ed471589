//! External collaborators: SDK discovery, tool lookup, configure and
//! source generators.
//!
//! The orchestrator only talks to these through the [`Toolchain`] trait.
//! [`XcodeToolchain`] is the real implementation backed by `xcodebuild`,
//! `xcrun` and the project's configure script. Every invocation gets its
//! working directory and environment passed explicitly; the current
//! process's directory and environment are never changed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::common::{command_stdout, parse_key_values, run_command, run_command_to_file};
use crate::platform::{PLATFORMS, PlatformDescriptor};
use crate::types::UniError;

/// Key/value information about an installed SDK.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdkInfo {
    values: BTreeMap<String, String>,
}

impl SdkInfo {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Parses the output of `xcodebuild -sdk <name> -version`.
    pub fn parse(text: &str) -> Self {
        Self::new(parse_key_values(text))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Filesystem path of the SDK root (the `Path` key).
    pub fn path(&self) -> Option<&Path> {
        self.get("Path").map(Path::new)
    }
}

/// Absolute paths of the tools a platform's configure step needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub cc: PathBuf,
    pub ld: PathBuf,
}

/// One configure run: script, working directory, host triple and the
/// environment added on top of the inherited one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureInvocation {
    pub script: PathBuf,
    pub build_dir: PathBuf,
    pub triple: String,
    pub env: Vec<(String, String)>,
}

impl ConfigureInvocation {
    pub fn new(
        script: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        platform: &PlatformDescriptor,
        tools: &ToolPaths,
    ) -> Self {
        Self {
            script: script.into(),
            build_dir: build_dir.into(),
            triple: platform.triple().to_string(),
            env: vec![
                ("CC".to_string(), tools.cc.display().to_string()),
                ("LD".to_string(), tools.ld.display().to_string()),
                ("CFLAGS".to_string(), platform.cflags()),
            ],
        }
    }

    pub fn host_arg(&self) -> String {
        format!("--host={}", self.triple)
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A script whose stdout becomes a source file before merging starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorStep {
    /// Script run with `bash`, relative to the project root
    pub script: PathBuf,
    /// File receiving the script's stdout, relative to the project root
    pub output: PathBuf,
}

/// Contracts the orchestrator consumes from the outside world.
pub trait Toolchain {
    /// Returns information about the named SDK (e.g. `iphoneos`).
    fn sdk_info(&self, sdk: &str) -> Result<SdkInfo, UniError>;

    /// Returns the absolute path of `tool` inside the SDK at `sdk_root`.
    fn find_tool(&self, sdk_root: &Path, tool: &str) -> Result<PathBuf, UniError>;

    /// Runs configure to completion, leaving a build tree in
    /// `invocation.build_dir`.
    fn configure(&self, invocation: &ConfigureInvocation) -> Result<(), UniError>;

    /// Runs a generator step from `project_root`.
    fn run_generator(&self, project_root: &Path, step: &GeneratorStep) -> Result<(), UniError>;
}

/// A platform with its SDK root and tools resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlatform {
    pub descriptor: PlatformDescriptor,
    pub tools: ToolPaths,
}

/// Resolves SDK roots and tool paths for all four platforms.
///
/// Each distinct SDK is queried once. Any missing piece is a
/// [`UniError::Config`], raised before a single platform pass has started.
pub fn resolve_platforms(toolchain: &dyn Toolchain) -> Result<Vec<ResolvedPlatform>, UniError> {
    let mut sdk_roots: BTreeMap<&str, PathBuf> = BTreeMap::new();
    let mut resolved = Vec::with_capacity(PLATFORMS.len());

    for spec in PLATFORMS.iter() {
        let sdk_root = match sdk_roots.get(spec.sdk) {
            Some(root) => root.clone(),
            None => {
                let info = toolchain.sdk_info(spec.sdk)?;
                let root = info.path().map(Path::to_path_buf).ok_or_else(|| {
                    UniError::Config(format!(
                        "SDK '{}' did not report a Path.\n\n\
                         Check the installed SDKs with: xcodebuild -showsdks",
                        spec.sdk
                    ))
                })?;
                sdk_roots.insert(spec.sdk, root.clone());
                root
            }
        };

        let descriptor = spec.with_sdk_root(sdk_root);
        let tools = ToolPaths {
            cc: toolchain.find_tool(descriptor.sdk_root(), "clang")?,
            ld: toolchain.find_tool(descriptor.sdk_root(), "ld")?,
        };
        tracing::debug!(
            platform = descriptor.name(),
            sdk_root = %descriptor.sdk_root().display(),
            cc = %tools.cc.display(),
            "resolved platform"
        );
        resolved.push(ResolvedPlatform { descriptor, tools });
    }

    Ok(resolved)
}

/// [`Toolchain`] backed by Xcode's command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct XcodeToolchain;

impl XcodeToolchain {
    pub fn new() -> Self {
        Self
    }
}

impl Toolchain for XcodeToolchain {
    fn sdk_info(&self, sdk: &str) -> Result<SdkInfo, UniError> {
        let mut cmd = Command::new("xcodebuild");
        cmd.args(["-sdk", sdk, "-version"]);
        let stdout = command_stdout(cmd, &format!("xcodebuild -sdk {} -version", sdk))
            .map_err(|e| UniError::Config(format!("SDK discovery for '{}' failed: {}", sdk, e)))?;
        Ok(SdkInfo::parse(&stdout))
    }

    fn find_tool(&self, sdk_root: &Path, tool: &str) -> Result<PathBuf, UniError> {
        let mut cmd = Command::new("xcrun");
        cmd.arg("-sdk").arg(sdk_root).args(["-find", tool]);
        let stdout = command_stdout(cmd, &format!("xcrun -find {}", tool))
            .map_err(|e| UniError::Config(format!("Could not locate '{}': {}", tool, e)))?;
        let path = stdout.trim();
        if path.is_empty() {
            return Err(UniError::Config(format!(
                "xcrun returned no path for '{}' in SDK {}",
                tool,
                sdk_root.display()
            )));
        }
        Ok(PathBuf::from(path))
    }

    fn configure(&self, invocation: &ConfigureInvocation) -> Result<(), UniError> {
        let mut cmd = Command::new(&invocation.script);
        cmd.arg(invocation.host_arg())
            .current_dir(&invocation.build_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        run_command(cmd, &format!("configure for {}", invocation.triple))
    }

    fn run_generator(&self, project_root: &Path, step: &GeneratorStep) -> Result<(), UniError> {
        let mut cmd = Command::new("bash");
        cmd.arg(&step.script).current_dir(project_root);
        run_command_to_file(
            cmd,
            &project_root.join(&step.output),
            &format!("generator {}", step.script.display()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct CountingToolchain {
        sdk_queries: RefCell<Vec<String>>,
        missing_path_for: Option<&'static str>,
    }

    impl Toolchain for CountingToolchain {
        fn sdk_info(&self, sdk: &str) -> Result<SdkInfo, UniError> {
            self.sdk_queries.borrow_mut().push(sdk.to_string());
            if self.missing_path_for == Some(sdk) {
                return Ok(SdkInfo::parse("SDKVersion: 17.2\n"));
            }
            Ok(SdkInfo::parse(&format!("Path: /sdks/{}.sdk\n", sdk)))
        }

        fn find_tool(&self, sdk_root: &Path, tool: &str) -> Result<PathBuf, UniError> {
            Ok(sdk_root.join("usr/bin").join(tool))
        }

        fn configure(&self, _invocation: &ConfigureInvocation) -> Result<(), UniError> {
            Ok(())
        }

        fn run_generator(&self, _root: &Path, _step: &GeneratorStep) -> Result<(), UniError> {
            Ok(())
        }
    }

    #[test]
    fn test_resolve_queries_each_sdk_once() {
        let toolchain = CountingToolchain::default();
        let platforms = resolve_platforms(&toolchain).unwrap();
        assert_eq!(platforms.len(), 4);
        assert_eq!(
            *toolchain.sdk_queries.borrow(),
            vec!["iphonesimulator".to_string(), "iphoneos".to_string()]
        );
        let device64 = &platforms[3];
        assert_eq!(device64.descriptor.sdk_root(), Path::new("/sdks/iphoneos.sdk"));
        assert_eq!(device64.tools.cc, PathBuf::from("/sdks/iphoneos.sdk/usr/bin/clang"));
    }

    #[test]
    fn test_resolve_fails_without_sdk_path() {
        let toolchain = CountingToolchain {
            missing_path_for: Some("iphoneos"),
            ..Default::default()
        };
        let err = resolve_platforms(&toolchain).unwrap_err();
        assert!(matches!(err, UniError::Config(_)));
        assert!(err.to_string().contains("iphoneos"));
    }

    #[test]
    fn test_configure_invocation_environment() {
        let platform = PLATFORMS[2].with_sdk_root("/sdks/iphoneos.sdk");
        let tools = ToolPaths {
            cc: PathBuf::from("/usr/bin/clang"),
            ld: PathBuf::from("/usr/bin/ld"),
        };
        let invocation = ConfigureInvocation::new("/lib/configure", "/lib/build_arm", &platform, &tools);
        assert_eq!(invocation.host_arg(), "--host=arm-apple-darwin11");
        assert_eq!(invocation.env_var("CC"), Some("/usr/bin/clang"));
        assert_eq!(invocation.env_var("LD"), Some("/usr/bin/ld"));
        assert_eq!(
            invocation.env_var("CFLAGS"),
            Some("-arch armv7 -isysroot /sdks/iphoneos.sdk -miphoneos-version-min=5.1.1")
        );
    }

    #[test]
    fn test_sdk_info_path() {
        let info = SdkInfo::parse("iPhoneSimulator 17.2\nPath: /sim.sdk\n");
        assert_eq!(info.path(), Some(Path::new("/sim.sdk")));
        assert_eq!(SdkInfo::default().path(), None);
    }
}
