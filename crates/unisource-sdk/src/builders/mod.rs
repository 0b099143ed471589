//! Build automation for universal iOS source distributions.
//!
//! ## Overview
//!
//! [`UniversalBuilder`] handles the complete pipeline:
//!
//! 1. **Toolchain discovery** - SDK roots and `clang`/`ld` paths for every platform
//! 2. **Generation** - Scripts whose output becomes a source file
//! 3. **Common merge** - The original `src/` and `include/` trees, untagged
//! 4. **Platform passes** - Configure, classify and merge per architecture
//! 5. **Umbrella headers** - One `#include` per arch for every multi-variant header
//!
//! ## Toolchain
//!
//! Everything that talks to the outside world goes through the [`Toolchain`]
//! trait. [`XcodeToolchain`] drives `xcodebuild`, `xcrun` and the project's
//! configure script.
//!
//! ## Builder Options
//!
//! - **`verbose(bool)`** - Log every merged file
//! - **`dry_run(bool)`** - Plan the merge without running configure or writing files
//! - **`clean(bool)`** - Remove the output directory first
//! - **`output_dir(path)`** - Customize output location (default: `ios/`)
//!
//! ## Example
//!
//! ```ignore
//! use unisource_sdk::builders::{UniversalBuilder, XcodeToolchain};
//!
//! let report = UniversalBuilder::new("libffi")
//!     .verbose(true)
//!     .dry_run(true)  // Preview only
//!     .build(&XcodeToolchain::new())?;
//!
//! println!("{} files", report.files_written());
//! # Ok::<(), unisource_sdk::UniError>(())
//! ```

pub mod common;
pub mod toolchain;
pub mod universal;

pub use toolchain::{
    ConfigureInvocation, GeneratorStep, ResolvedPlatform, SdkInfo, ToolPaths, Toolchain, XcodeToolchain,
    resolve_platforms,
};
pub use universal::{DEFAULT_OUTPUT_DIR, TreeMerge, UniversalBuilder, merge_tree};
