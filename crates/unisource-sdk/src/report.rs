//! Run report
//!
//! Summary of one orchestration run, written next to the merged tree as
//! `merge-report.json`. Paths are relative to the output directory and all
//! collections are ordered, so identical runs produce identical reports.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::merge::MergedFile;
use crate::types::{Arch, PassState, UniError};
use crate::umbrella::{UmbrellaHeader, UmbrellaPlan};

/// File name of the report inside the output directory.
pub const REPORT_FILE_NAME: &str = "merge-report.json";

/// Outcome of one platform pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformReport {
    pub name: String,
    pub arch: Arch,
    pub triple: String,
    pub state: PassState,
    /// Files written by the pass, relative to the output directory
    pub files: BTreeSet<String>,
}

/// Summary of a full run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub dry_run: bool,
    /// Untagged files written by the passes over the original trees
    pub common_files: BTreeSet<String>,
    /// Arch-directory sources from the original trees, keyed by their tag
    pub arch_sources: BTreeMap<Arch, BTreeSet<String>>,
    pub platforms: Vec<PlatformReport>,
    pub umbrella_headers: Vec<UmbrellaHeader>,
    /// Dry run only: build directories not configured yet, so their
    /// headers are absent from the umbrella plan
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub missing_build_trees: BTreeSet<String>,
    /// Directories skipped because no rule matched, keyed by walked tree
    pub unrecognized_dirs: BTreeMap<String, BTreeSet<String>>,
}

impl MergeReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn record_umbrellas(&mut self, plan: UmbrellaPlan) {
        self.umbrella_headers = plan.umbrellas;
    }

    /// Files from a pass over an original tree, split by their arch tag.
    pub fn record_original(&mut self, files: &[MergedFile], output_dir: &Path) {
        for file in files {
            let path = relative_display(&file.output, output_dir);
            match file.arch {
                Some(arch) => {
                    self.arch_sources.entry(arch).or_default().insert(path);
                }
                None => {
                    self.common_files.insert(path);
                }
            }
        }
    }

    pub fn record_unrecognized(&mut self, tree: &str, dirs: BTreeSet<PathBuf>) {
        if dirs.is_empty() {
            return;
        }
        self.unrecognized_dirs
            .entry(tree.to_string())
            .or_default()
            .extend(dirs.iter().map(|d| display_path(d)));
    }

    /// Total number of files written, umbrellas included.
    pub fn files_written(&self) -> usize {
        self.common_files.len()
            + self.arch_sources.values().map(BTreeSet::len).sum::<usize>()
            + self.platforms.iter().map(|p| p.files.len()).sum::<usize>()
            + self.umbrella_headers.len()
    }

    /// Writes the report as pretty JSON to `output_dir/merge-report.json`.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf, UniError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::create_dir_all(output_dir).map_err(|e| UniError::io(output_dir, e))?;
        let path = output_dir.join(REPORT_FILE_NAME);
        fs::write(&path, json).map_err(|e| UniError::io(&path, e))?;
        Ok(path)
    }
}

/// Renders `path` relative to `base` with `/` separators.
pub fn relative_display(path: &Path, base: &Path) -> String {
    display_path(path.strip_prefix(base).unwrap_or(path))
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/")
}
