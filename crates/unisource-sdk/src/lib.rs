//! Universal source distributions for autotools libraries on iOS
//!
//! `unisource-sdk` turns a C library that can only be configured for one
//! architecture at a time into a single source tree that compiles for every
//! iOS target at once. Each platform is configured separately; files that
//! differ per architecture are wrapped in `#ifdef __<arch>__` guards, and
//! headers generated per platform get an arch suffix plus an umbrella header
//! including every variant.
//!
//! # Output Layout
//!
//! ```text
//! ios/
//! ├── src/
//! │   ├── prep_cif.c          common, verbatim
//! │   └── arm/sysv.S          #ifdef __arm__ ... #endif
//! ├── include/
//! │   ├── ffi_common.h        common, verbatim
//! │   ├── fficonfig_arm.h     #ifdef __arm__ ... #endif
//! │   ├── fficonfig_arm64.h
//! │   ├── ...
//! │   └── fficonfig.h         #include <fficonfig_arm.h> ...
//! └── merge-report.json
//! ```
//!
//! # Architecture
//!
//! - **Platform**: the four fixed iOS platform descriptors
//! - **Classify**: decides, per file, its architecture and output area
//! - **Merge**: writes guard-wrapped files and records header variants
//! - **Registry**: header basename to set of architectures
//! - **Umbrella**: per-header files including every arch variant
//! - **Builders**: orchestration and the external toolchain
//!
//! # Example
//!
//! ```ignore
//! use unisource_sdk::{UniversalBuilder, XcodeToolchain};
//!
//! fn main() -> Result<(), unisource_sdk::UniError> {
//!     let report = UniversalBuilder::new(".")
//!         .output_dir("ios")
//!         .build(&XcodeToolchain::new())?;
//!
//!     for umbrella in &report.umbrella_headers {
//!         println!("{}", umbrella.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builders;
pub mod classify;
pub mod merge;
pub mod platform;
pub mod registry;
pub mod report;
pub mod types;
pub mod umbrella;

pub use builders::{GeneratorStep, Toolchain, UniversalBuilder, XcodeToolchain, merge_tree};
pub use classify::{ClassifiedFile, RuleSet, classify};
pub use merge::{Destination, MergedFile};
pub use platform::{PLATFORMS, PlatformDescriptor, PlatformSpec};
pub use registry::{HeaderRegistry, RegistrySnapshot};
pub use report::{MergeReport, PlatformReport};
pub use types::{Arch, Area, Guard, PassState, PassStep, UniError};
pub use umbrella::{UmbrellaHeader, UmbrellaPlan};

/// Library version, matching `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_platform_archs_cover_all() {
        let mut archs: Vec<_> = PLATFORMS.iter().map(|p| p.arch).collect();
        archs.sort();
        assert_eq!(archs, Arch::ALL.to_vec());
    }
}
