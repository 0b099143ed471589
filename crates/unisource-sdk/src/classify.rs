//! Tree classification
//!
//! Walks a source or build tree and decides, per file, whether it is common
//! or belongs to one architecture, and which half of the output tree it goes
//! to. The decision depends only on the directory the file sits in relative
//! to the tree root:
//!
//! | Relative directory | Rule |
//! |--------------------|------|
//! | `.` (the root) | every file, tagged with the pass architecture (if any) |
//! | `arm`, `aarch64`, `x86` | only the files the rule names, tagged with the rule's arch |
//! | anything else | nothing; the directory is recorded as unrecognized |
//!
//! Classification is lazy: [`Classifier`] is an iterator driven by a sorted
//! `walkdir` traversal, so identical trees always classify identically.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::merge::Destination;
use crate::types::{Arch, Area, Guard, UniError};

/// Extension that routes a file to the headers area.
pub const HEADER_SUFFIX: &str = ".h";

/// Files in an architecture directory that belong to one arch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchRule {
    pub arch: Arch,
    pub files: &'static [&'static str],
}

/// An architecture subdirectory and the rules governing its files.
///
/// A directory may hold sources for more than one arch (`x86` carries both
/// the i386 and the x86_64 implementation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryRule {
    pub dir: &'static str,
    pub rules: &'static [ArchRule],
}

const STANDARD_DIRECTORIES: &[DirectoryRule] = &[
    DirectoryRule {
        dir: "arm",
        rules: &[ArchRule {
            arch: Arch::Arm,
            files: &["sysv.S", "trampoline.S", "ffi.c"],
        }],
    },
    DirectoryRule {
        dir: "aarch64",
        rules: &[ArchRule {
            arch: Arch::Arm64,
            files: &["sysv.S", "ffi.c"],
        }],
    },
    DirectoryRule {
        dir: "x86",
        rules: &[
            ArchRule {
                arch: Arch::I386,
                files: &["darwin.S", "ffi.c"],
            },
            ArchRule {
                arch: Arch::X86_64,
                files: &["darwin64.S", "ffi64.c"],
            },
        ],
    },
];

/// Rule applying to one directory of a walked tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRule<'a> {
    /// The tree root.
    Common,
    /// A known architecture subdirectory.
    Arch(&'a DirectoryRule),
    /// Any other directory. Its files are not merged.
    Unrecognized,
}

/// The fixed set of architecture subdirectory rules.
#[derive(Debug, Clone, Copy)]
pub struct RuleSet {
    directories: &'static [DirectoryRule],
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleSet {
    /// The rule set for the `arm`, `aarch64` and `x86` source directories.
    pub fn standard() -> Self {
        Self {
            directories: STANDARD_DIRECTORIES,
        }
    }

    pub fn directories(&self) -> &'static [DirectoryRule] {
        self.directories
    }

    /// Looks up the rule for a directory given relative to the tree root.
    pub fn lookup(&self, relative_dir: &Path) -> DirRule<'static> {
        if relative_dir.as_os_str().is_empty() || relative_dir == Path::new(".") {
            return DirRule::Common;
        }
        self.directories
            .iter()
            .find(|rule| relative_dir == Path::new(rule.dir))
            .map(DirRule::Arch)
            .unwrap_or(DirRule::Unrecognized)
    }
}

/// A file selected for merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    /// Path of the file as reached through the walk
    pub source: PathBuf,
    /// Directory of the file relative to the tree root (empty for the root)
    pub relative_dir: PathBuf,
    /// File name, unchanged
    pub file_name: String,
    /// Output area the file is routed to
    pub area: Area,
    /// Owning architecture, `None` for common files
    pub arch: Option<Arch>,
    /// Guard wrapped around the content, present exactly when `arch` is
    pub guard: Option<Guard>,
}

impl ClassifiedFile {
    pub fn is_tagged(&self) -> bool {
        self.arch.is_some()
    }
}

/// Returns true when `file_name` is routed to the headers area.
pub fn is_header(file_name: &str) -> bool {
    file_name.ends_with(HEADER_SUFFIX)
}

/// Starts classifying the tree at `root`.
///
/// Files at the root are tagged with `pass_arch`: `None` for the common
/// passes over the original source tree, the platform's arch for passes over
/// a platform's build output. Files whose area has no destination in
/// `destination` are not yielded.
///
/// Symbolic links are followed. A missing `root` yields nothing.
pub fn classify<'a>(
    root: &Path,
    pass_arch: Option<Arch>,
    rules: &'a RuleSet,
    destination: &Destination,
) -> Classifier<'a> {
    let walker = if root.exists() {
        Some(
            WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter(),
        )
    } else {
        tracing::warn!(root = %root.display(), "tree does not exist, nothing to classify");
        None
    };

    Classifier {
        root: root.to_path_buf(),
        pass_arch,
        rules,
        has_sources: destination.sources.is_some(),
        has_includes: destination.includes.is_some(),
        walker,
        unrecognized: BTreeSet::new(),
    }
}

/// Lazy sequence of [`ClassifiedFile`]s for one tree.
///
/// Directories matching no rule are collected while iterating; read them
/// back with [`Classifier::unrecognized_dirs`] once the iterator is drained.
pub struct Classifier<'a> {
    root: PathBuf,
    pass_arch: Option<Arch>,
    rules: &'a RuleSet,
    has_sources: bool,
    has_includes: bool,
    walker: Option<walkdir::IntoIter>,
    unrecognized: BTreeSet<PathBuf>,
}

impl Classifier<'_> {
    /// Unrecognized directories (relative to the root) seen so far.
    pub fn unrecognized_dirs(&self) -> &BTreeSet<PathBuf> {
        &self.unrecognized
    }

    pub fn into_unrecognized_dirs(self) -> BTreeSet<PathBuf> {
        self.unrecognized
    }

    fn classify_entry(&mut self, entry: &DirEntry) -> Option<ClassifiedFile> {
        let relative_dir = entry.path().parent()?.strip_prefix(&self.root).ok()?;
        let Some(file_name) = entry.file_name().to_str() else {
            tracing::debug!(path = %entry.path().display(), "skipping non UTF-8 file name");
            return None;
        };

        let arch = match self.rules.lookup(relative_dir) {
            DirRule::Common => self.pass_arch,
            DirRule::Arch(directory) => {
                let rule = directory
                    .rules
                    .iter()
                    .find(|rule| rule.files.iter().any(|name| *name == file_name))?;
                Some(rule.arch)
            }
            DirRule::Unrecognized => {
                if self.unrecognized.insert(relative_dir.to_path_buf()) {
                    tracing::debug!(
                        dir = %relative_dir.display(),
                        "directory matches no rule, skipping its files"
                    );
                }
                return None;
            }
        };

        let area = if is_header(file_name) && self.has_includes {
            Area::Headers
        } else if self.has_sources {
            Area::Sources
        } else {
            return None;
        };

        Some(ClassifiedFile {
            source: entry.path().to_path_buf(),
            relative_dir: relative_dir.to_path_buf(),
            file_name: file_name.to_string(),
            area,
            arch,
            guard: arch.map(|arch| arch.guard()),
        })
    }
}

impl Iterator for Classifier<'_> {
    type Item = Result<ClassifiedFile, UniError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.as_mut()?.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(UniError::Walk(e))),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(file) = self.classify_entry(&entry) {
                return Some(Ok(file));
            }
        }
    }
}
