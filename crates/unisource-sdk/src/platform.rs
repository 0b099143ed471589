//! Platform registry
//!
//! Static descriptions of the four iOS build targets. A [`PlatformSpec`] is
//! known at compile time; the SDK root is only known once SDK discovery has
//! run, at which point the spec becomes a [`PlatformDescriptor`].

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::types::{Arch, Guard};

/// Compile-time description of a build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformSpec {
    /// Human-readable pass name (e.g. "device64")
    pub name: &'static str,
    /// SDK name understood by `xcodebuild -sdk`
    pub sdk: &'static str,
    /// Value passed to the compiler's `-arch` flag
    pub compiler_arch: &'static str,
    /// Architecture tag applied to this platform's outputs
    pub arch: Arch,
    /// Host triple handed to configure
    pub triple: &'static str,
    /// Minimum iOS version the build targets
    pub min_os_version: &'static str,
}

/// The four targets, in the order the orchestrator builds them.
pub const PLATFORMS: [PlatformSpec; 4] = [
    PlatformSpec {
        name: "simulator",
        sdk: "iphonesimulator",
        compiler_arch: "i386",
        arch: Arch::I386,
        triple: "i386-apple-darwin11",
        min_os_version: "5.1.1",
    },
    PlatformSpec {
        name: "simulator64",
        sdk: "iphonesimulator",
        compiler_arch: "x86_64",
        arch: Arch::X86_64,
        triple: "x86_64-apple-darwin13",
        min_os_version: "7.0",
    },
    PlatformSpec {
        name: "device",
        sdk: "iphoneos",
        compiler_arch: "armv7",
        arch: Arch::Arm,
        triple: "arm-apple-darwin11",
        min_os_version: "5.1.1",
    },
    PlatformSpec {
        name: "device64",
        sdk: "iphoneos",
        compiler_arch: "arm64",
        arch: Arch::Arm64,
        triple: "aarch64-apple-darwin13",
        min_os_version: "7.0",
    },
];

impl PlatformSpec {
    /// Binds the spec to the SDK root reported by SDK discovery.
    pub fn with_sdk_root(&self, sdk_root: impl Into<PathBuf>) -> PlatformDescriptor {
        PlatformDescriptor {
            spec: *self,
            sdk_root: sdk_root.into(),
            guard: self.arch.guard(),
        }
    }
}

/// A fully resolved build target. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    spec: PlatformSpec,
    sdk_root: PathBuf,
    guard: Guard,
}

impl PlatformDescriptor {
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn sdk(&self) -> &'static str {
        self.spec.sdk
    }

    pub fn arch(&self) -> Arch {
        self.spec.arch
    }

    pub fn compiler_arch(&self) -> &'static str {
        self.spec.compiler_arch
    }

    pub fn triple(&self) -> &'static str {
        self.spec.triple
    }

    pub fn min_os_version(&self) -> &'static str {
        self.spec.min_os_version
    }

    pub fn sdk_root(&self) -> &Path {
        &self.sdk_root
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    /// Compiler flags selecting this platform's arch, sysroot and minimum OS.
    pub fn cflags(&self) -> String {
        format!(
            "-arch {} -isysroot {} -miphoneos-version-min={}",
            self.spec.compiler_arch,
            self.sdk_root.display(),
            self.spec.min_os_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_registry_covers_every_arch_once() {
        let archs: BTreeSet<Arch> = PLATFORMS.iter().map(|p| p.arch).collect();
        assert_eq!(archs.len(), 4);
        assert_eq!(archs, Arch::ALL.into_iter().collect());
    }

    #[test]
    fn test_descriptor_guard_matches_arch() {
        let device = PLATFORMS[2].with_sdk_root("/sdk/iPhoneOS.sdk");
        assert_eq!(device.arch(), Arch::Arm);
        assert_eq!(device.guard().prefix, "#ifdef __arm__\n\n");
        assert_eq!(device.guard().suffix, "\n\n#endif");
    }

    #[test]
    fn test_cflags() {
        let device64 = PLATFORMS[3].with_sdk_root("/sdk/iPhoneOS.sdk");
        assert_eq!(
            device64.cflags(),
            "-arch arm64 -isysroot /sdk/iPhoneOS.sdk -miphoneos-version-min=7.0"
        );
        let simulator = PLATFORMS[0].with_sdk_root("/sdk/Sim.sdk");
        assert!(simulator.cflags().starts_with("-arch i386 "));
        assert_eq!(simulator.sdk(), "iphonesimulator");
    }
}
