//! File merge engine
//!
//! Copies a [`ClassifiedFile`] into the output tree. Tagged content is
//! wrapped in its architecture guard, tagged headers get an architecture
//! suffix so variants never collide in the flat include directory, and every
//! tagged header is recorded in the [`HeaderRegistry`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::ClassifiedFile;
use crate::registry::HeaderRegistry;
use crate::types::{Arch, Area, Guard, UniError};

/// Where merged files are written. An area without a directory receives
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    /// Root of the sources tree, mirroring the origin tree's layout
    pub sources: Option<PathBuf>,
    /// Flat header directory
    pub includes: Option<PathBuf>,
}

impl Destination {
    pub fn new(sources: impl Into<PathBuf>, includes: impl Into<PathBuf>) -> Self {
        Self {
            sources: Some(sources.into()),
            includes: Some(includes.into()),
        }
    }

    pub fn includes_only(includes: impl Into<PathBuf>) -> Self {
        Self {
            sources: None,
            includes: Some(includes.into()),
        }
    }
}

/// File name split into stem and extension, optionally tagged with an arch.
///
/// `ffi.h` tagged with arm64 renders as `ffi_arm64.h`; a name without an
/// extension gets the suffix appended (`Makefile_arm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputName<'a> {
    stem: &'a str,
    extension: Option<&'a str>,
    arch: Option<Arch>,
}

impl<'a> OutputName<'a> {
    pub fn new(file_name: &'a str) -> Self {
        let path = Path::new(file_name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
        let extension = path.extension().and_then(|e| e.to_str());
        Self {
            stem,
            extension,
            arch: None,
        }
    }

    pub fn tagged(mut self, arch: Option<Arch>) -> Self {
        self.arch = arch;
        self
    }

    pub fn stem(&self) -> &'a str {
        self.stem
    }

    pub fn extension(&self) -> Option<&'a str> {
        self.extension
    }
}

impl fmt::Display for OutputName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem)?;
        if let Some(arch) = self.arch {
            write!(f, "_{}", arch)?;
        }
        if let Some(extension) = self.extension {
            write!(f, ".{}", extension)?;
        }
        Ok(())
    }
}

/// Result of merging one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFile {
    pub output: PathBuf,
    pub area: Area,
    pub arch: Option<Arch>,
}

/// Computes where `file` lands without touching the filesystem.
///
/// Only tagged headers are renamed: sources keep their name because the
/// sources area mirrors the origin tree, where variants live in distinct
/// directories.
pub fn output_path(file: &ClassifiedFile, destination: &Destination) -> Result<PathBuf, UniError> {
    match file.area {
        Area::Sources => {
            let root = destination.sources.as_ref().ok_or_else(|| missing_area(file))?;
            Ok(root.join(&file.relative_dir).join(&file.file_name))
        }
        Area::Headers => {
            let root = destination.includes.as_ref().ok_or_else(|| missing_area(file))?;
            let name = OutputName::new(&file.file_name).tagged(file.arch);
            Ok(root.join(name.to_string()))
        }
    }
}

fn missing_area(file: &ClassifiedFile) -> UniError {
    UniError::Config(format!(
        "{} was routed to the {:?} area but no destination was given for it",
        file.source.display(),
        file.area
    ))
}

/// Wraps `content` in `guard`, byte for byte.
pub fn wrap_content(content: &[u8], guard: Option<&Guard>) -> Vec<u8> {
    match guard {
        Some(guard) => {
            let mut out =
                Vec::with_capacity(guard.prefix.len() + content.len() + guard.suffix.len());
            out.extend_from_slice(guard.prefix.as_bytes());
            out.extend_from_slice(content);
            out.extend_from_slice(guard.suffix.as_bytes());
            out
        }
        None => content.to_vec(),
    }
}

/// Merges one classified file into `destination`.
///
/// A later write to the same output path replaces the earlier one; this only
/// happens for common files, which are identical across passes.
///
/// # Errors
///
/// Returns [`UniError::Io`] if the source cannot be read or the destination
/// cannot be created or written.
pub fn merge(
    file: &ClassifiedFile,
    destination: &Destination,
    registry: &mut HeaderRegistry,
) -> Result<MergedFile, UniError> {
    let output = output_path(file, destination)?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| UniError::io(parent, e))?;
    }

    let content = fs::read(&file.source).map_err(|e| UniError::io(&file.source, e))?;
    fs::write(&output, wrap_content(&content, file.guard.as_ref()))
        .map_err(|e| UniError::io(&output, e))?;

    register_variant(file, registry);

    tracing::debug!(
        source = %file.source.display(),
        output = %output.display(),
        arch = file.arch.map(|a| a.as_str()).unwrap_or("common"),
        "merged file"
    );

    Ok(MergedFile {
        output,
        area: file.area,
        arch: file.arch,
    })
}

/// Dry-run counterpart of [`merge`]: computes the output path and records
/// the header variant, but reads and writes nothing.
pub fn preview(
    file: &ClassifiedFile,
    destination: &Destination,
    registry: &mut HeaderRegistry,
) -> Result<MergedFile, UniError> {
    let output = output_path(file, destination)?;
    register_variant(file, registry);
    tracing::info!(
        source = %file.source.display(),
        output = %output.display(),
        "[dry-run] would merge"
    );
    Ok(MergedFile {
        output,
        area: file.area,
        arch: file.arch,
    })
}

fn register_variant(file: &ClassifiedFile, registry: &mut HeaderRegistry) {
    if let (Some(arch), Area::Headers) = (file.arch, file.area) {
        registry.record(&file.file_name, arch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn classified(source: &Path, rel: &str, area: Area, arch: Option<Arch>) -> ClassifiedFile {
        ClassifiedFile {
            source: source.to_path_buf(),
            relative_dir: PathBuf::from(rel),
            file_name: source.file_name().unwrap().to_str().unwrap().to_string(),
            area,
            arch,
            guard: arch.map(|a| a.guard()),
        }
    }

    #[test]
    fn test_output_name() {
        assert_eq!(OutputName::new("ffi.h").to_string(), "ffi.h");
        assert_eq!(
            OutputName::new("ffi.h").tagged(Some(Arch::Arm64)).to_string(),
            "ffi_arm64.h"
        );
        assert_eq!(
            OutputName::new("ffitarget.h").tagged(Some(Arch::X86_64)).to_string(),
            "ffitarget_x86_64.h"
        );
        assert_eq!(
            OutputName::new("config.in.h").tagged(Some(Arch::Arm)).to_string(),
            "config.in_arm.h"
        );
        assert_eq!(
            OutputName::new("Makefile").tagged(Some(Arch::I386)).to_string(),
            "Makefile_i386"
        );
        let name = OutputName::new("sysv.S");
        assert_eq!(name.stem(), "sysv");
        assert_eq!(name.extension(), Some("S"));
    }

    #[test]
    fn test_wrap_content_exact_bytes() {
        let guard = Arch::Arm.guard();
        let body = b"mov r0, r1\n\xff\x00tail";
        let wrapped = wrap_content(body, Some(&guard));
        let mut expected = b"#ifdef __arm__\n\n".to_vec();
        expected.extend_from_slice(body);
        expected.extend_from_slice(b"\n\n#endif");
        assert_eq!(wrapped, expected);
        assert_eq!(wrap_content(body, None), body.to_vec());
    }

    #[test]
    fn test_tagged_source_is_wrapped_and_keeps_name() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("in/arm/sysv.S");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, "asm body").unwrap();

        let dest = Destination::new(tmp.path().join("out/src"), tmp.path().join("out/include"));
        let mut registry = HeaderRegistry::new();
        let merged = merge(
            &classified(&src, "arm", Area::Sources, Some(Arch::Arm)),
            &dest,
            &mut registry,
        )
        .unwrap();

        assert_eq!(merged.output, tmp.path().join("out/src/arm/sysv.S"));
        assert_eq!(
            fs::read_to_string(&merged.output).unwrap(),
            "#ifdef __arm__\n\nasm body\n\n#endif"
        );
        assert!(registry.is_empty(), "sources never enter the registry");
    }

    #[test]
    fn test_common_header_copied_verbatim_and_not_registered() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("ffi_common.h");
        fs::write(&src, "#define COMMON 1\n").unwrap();

        let dest = Destination::includes_only(tmp.path().join("include"));
        let mut registry = HeaderRegistry::new();
        let merged = merge(&classified(&src, "", Area::Headers, None), &dest, &mut registry).unwrap();

        assert_eq!(merged.output, tmp.path().join("include/ffi_common.h"));
        assert_eq!(fs::read(&merged.output).unwrap(), fs::read(&src).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_tagged_headers_never_overwrite_each_other() {
        let tmp = TempDir::new().unwrap();
        let include = tmp.path().join("include");
        let dest = Destination::includes_only(&include);
        let mut registry = HeaderRegistry::new();

        for (arch, body) in [(Arch::I386, "i386 config"), (Arch::Arm64, "arm64 config")] {
            let build = tmp.path().join(format!("build_{}", arch));
            fs::create_dir_all(&build).unwrap();
            let src = build.join("fficonfig.h");
            fs::write(&src, body).unwrap();
            merge(&classified(&src, "", Area::Headers, Some(arch)), &dest, &mut registry).unwrap();
        }

        assert_eq!(
            fs::read_to_string(include.join("fficonfig_i386.h")).unwrap(),
            "#ifdef __i386__\n\ni386 config\n\n#endif"
        );
        assert_eq!(
            fs::read_to_string(include.join("fficonfig_arm64.h")).unwrap(),
            "#ifdef __arm64__\n\narm64 config\n\n#endif"
        );
        assert!(!include.join("fficonfig.h").exists());
        let archs: Vec<_> = registry.archs("fficonfig.h").unwrap().iter().copied().collect();
        assert_eq!(archs, vec![Arch::Arm64, Arch::I386]);
    }

    #[test]
    fn test_unreadable_source_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("arm/trampoline.S");
        let dest = Destination::new(tmp.path().join("src"), tmp.path().join("include"));
        let mut registry = HeaderRegistry::new();
        let err = merge(
            &classified(&missing, "arm", Area::Sources, Some(Arch::Arm)),
            &dest,
            &mut registry,
        )
        .unwrap_err();
        match err {
            UniError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_preview_records_without_writing() {
        let tmp = TempDir::new().unwrap();
        let include = tmp.path().join("include");
        let file = classified(&tmp.path().join("ffi.h"), "", Area::Headers, Some(Arch::X86_64));
        let mut registry = HeaderRegistry::new();

        let merged = preview(&file, &Destination::includes_only(&include), &mut registry).unwrap();
        assert_eq!(merged.output, include.join("ffi_x86_64.h"));
        assert!(!include.exists());
        assert!(registry.archs("ffi.h").unwrap().contains(&Arch::X86_64));
    }

    #[test]
    fn test_output_path_requires_destination() {
        let file = classified(Path::new("a/ffi.c"), "", Area::Sources, None);
        let err = output_path(&file, &Destination::includes_only("include")).unwrap_err();
        assert!(err.to_string().contains("no destination"));
    }
}
