//! Universal source distribution builder
//!
//! Drives the whole pipeline for one library checkout:
//!
//! 1. Resolve SDK roots and compiler/linker paths for all four platforms
//! 2. Run source generators (e.g. the ARM trampoline table)
//! 3. Merge the original `src/` and `include/` trees as common files
//! 4. For each platform: configure in `build_<arch>`, classify the build
//!    output and merge its generated headers tagged with the platform arch
//! 5. Write umbrella headers and `merge-report.json`
//!
//! Platforms are processed one at a time. Every failure is fatal; errors
//! raised inside a platform pass name the platform and the failing step.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use super::common::validate_project_root;
use super::toolchain::{ConfigureInvocation, GeneratorStep, ResolvedPlatform, Toolchain, resolve_platforms};
use crate::classify::{ClassifiedFile, RuleSet, classify};
use crate::merge::{self, Destination, MergedFile};
use crate::registry::HeaderRegistry;
use crate::report::{MergeReport, PlatformReport, relative_display};
use crate::types::{Arch, PassState, PassStep, UniError};
use crate::umbrella;

/// Default output directory, relative to the project root.
pub const DEFAULT_OUTPUT_DIR: &str = "ios";

/// Files merged from one tree, plus the directories no rule matched.
#[derive(Debug, Clone, Default)]
pub struct TreeMerge {
    pub files: Vec<MergedFile>,
    pub unrecognized_dirs: BTreeSet<PathBuf>,
}

/// Classifies `root` and merges every selected file into `destination`.
///
/// With `dry_run` set nothing is read or written, but the registry is still
/// populated so umbrella headers can be planned.
pub fn merge_tree(
    root: &Path,
    pass_arch: Option<Arch>,
    rules: &RuleSet,
    destination: &Destination,
    registry: &mut HeaderRegistry,
    dry_run: bool,
) -> Result<TreeMerge, UniError> {
    let mut classifier = classify(root, pass_arch, rules, destination);
    let mut files = Vec::new();
    for file in classifier.by_ref() {
        files.push(merge_one(&file?, destination, registry, dry_run)?);
    }
    let unrecognized_dirs = classifier.into_unrecognized_dirs();
    warn_unrecognized(root, &unrecognized_dirs);
    Ok(TreeMerge {
        files,
        unrecognized_dirs,
    })
}

fn merge_one(
    file: &ClassifiedFile,
    destination: &Destination,
    registry: &mut HeaderRegistry,
    dry_run: bool,
) -> Result<MergedFile, UniError> {
    if dry_run {
        merge::preview(file, destination, registry)
    } else {
        merge::merge(file, destination, registry)
    }
}

fn warn_unrecognized(root: &Path, dirs: &BTreeSet<PathBuf>) {
    if !dirs.is_empty() {
        tracing::warn!(
            tree = %root.display(),
            count = dirs.len(),
            "skipped files in directories matching no rule"
        );
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Resolved locations for one run.
struct Layout {
    root: PathBuf,
    output: PathBuf,
    sources: PathBuf,
    includes: PathBuf,
}

/// Progress of one platform through its pass.
struct PlatformPass<'a> {
    platform: &'a ResolvedPlatform,
    state: PassState,
}

impl<'a> PlatformPass<'a> {
    fn new(platform: &'a ResolvedPlatform) -> Self {
        Self {
            platform,
            state: PassState::Pending,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            self.state = next;
            tracing::info!(
                platform = self.platform.descriptor.name(),
                arch = %self.platform.descriptor.arch(),
                state = ?next,
                "platform pass"
            );
        }
    }

    fn failed(&self, err: UniError) -> UniError {
        let step = self.state.step().unwrap_or(PassStep::Configuring);
        err.in_pass(self.platform.descriptor.name(), step)
    }
}

/// Builder for a universal iOS source distribution.
pub struct UniversalBuilder {
    /// Top-level directory of the library (contains `configure`)
    project_root: PathBuf,
    /// Output directory, relative to the project root unless absolute
    output_dir: PathBuf,
    /// Original source tree, relative to the project root
    source_dir: PathBuf,
    /// Original public header tree, relative to the project root
    include_dir: PathBuf,
    /// Configure script, relative to the project root
    configure_script: PathBuf,
    /// Per-platform build directories are named `<prefix><arch>`
    build_dir_prefix: String,
    generators: Vec<GeneratorStep>,
    rules: RuleSet,
    verbose: bool,
    dry_run: bool,
    clean: bool,
}

impl UniversalBuilder {
    /// Creates a new builder
    ///
    /// # Arguments
    ///
    /// * `project_root` - Library checkout containing `configure`, `src/` and `include/`
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            source_dir: PathBuf::from("src"),
            include_dir: PathBuf::from("include"),
            configure_script: PathBuf::from("configure"),
            build_dir_prefix: "build_".to_string(),
            generators: Vec::new(),
            rules: RuleSet::standard(),
            verbose: false,
            dry_run: false,
            clean: false,
        }
    }

    /// Logs every merged file at info level instead of debug
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Resolves platforms and plans the merge without running configure or
    /// writing any file
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Removes the output directory before merging
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dir = dir.into();
        self
    }

    pub fn configure_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.configure_script = script.into();
        self
    }

    pub fn build_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.build_dir_prefix = prefix.into();
        self
    }

    pub fn generators(mut self, steps: Vec<GeneratorStep>) -> Self {
        self.generators = steps;
        self
    }

    /// Runs every step and returns the run report.
    ///
    /// # Returns
    ///
    /// * `Ok(MergeReport)` describing every file written
    /// * `Err(UniError::Config)` if SDKs or tools cannot be resolved (nothing is written)
    /// * `Err(UniError::Pass)` if a platform pass fails
    pub fn build(&self, toolchain: &dyn Toolchain) -> Result<MergeReport, UniError> {
        validate_project_root(&self.project_root, &self.configure_script)?;
        let layout = self.layout()?;

        tracing::info!("Resolving SDKs and tools...");
        let platforms = resolve_platforms(toolchain)?;

        let mut report = MergeReport::new(self.dry_run);
        self.run_generators(toolchain, &layout)?;
        self.prepare_output(&layout)?;

        let mut registry = HeaderRegistry::new();

        tracing::info!("Merging common sources and headers...");
        let common = Destination::new(&layout.sources, &layout.includes);
        let headers = Destination::includes_only(&layout.includes);
        for (tree, destination) in [
            (layout.root.join(&self.source_dir), &common),
            (layout.root.join(&self.include_dir), &headers),
        ] {
            let merged = merge_tree(&tree, None, &self.rules, destination, &mut registry, self.dry_run)?;
            self.log_files(&merged.files);
            report.record_original(&merged.files, &layout.output);
            report.record_unrecognized(&relative_display(&tree, &layout.root), merged.unrecognized_dirs);
        }

        for platform in &platforms {
            let pass = self.run_platform(toolchain, &layout, platform, &mut registry, &mut report)?;
            report.platforms.push(pass);
        }

        tracing::info!("Synthesizing umbrella headers...");
        let snapshot = registry.snapshot();
        let plan = if self.dry_run {
            if !report.missing_build_trees.is_empty() {
                tracing::warn!(
                    missing = report.missing_build_trees.len(),
                    "[dry-run] umbrella plan is incomplete: only build trees that already exist were classified"
                );
            }
            umbrella::plan(&snapshot)
        } else {
            umbrella::synthesize(snapshot, &layout.includes)?
        };
        report.record_umbrellas(plan);

        if self.dry_run {
            tracing::info!("[dry-run] Merge simulation completed. No changes were made.");
        } else {
            let path = report.write(&layout.output)?;
            tracing::info!(
                files = report.files_written(),
                report = %path.display(),
                "universal source tree written to {}",
                layout.output.display()
            );
        }

        Ok(report)
    }

    fn layout(&self) -> Result<Layout, UniError> {
        let root = fs::canonicalize(&self.project_root).map_err(|e| UniError::io(&self.project_root, e))?;
        let output = normalize_lexically(&root.join(&self.output_dir));
        Ok(Layout {
            sources: output.join("src"),
            includes: output.join("include"),
            output,
            root,
        })
    }

    fn build_dir(&self, root: &Path, arch: Arch) -> PathBuf {
        root.join(format!("{}{}", self.build_dir_prefix, arch))
    }

    fn run_generators(&self, toolchain: &dyn Toolchain, layout: &Layout) -> Result<(), UniError> {
        for step in &self.generators {
            if self.dry_run {
                tracing::info!(
                    script = %step.script.display(),
                    output = %step.output.display(),
                    "[dry-run] would run generator"
                );
                continue;
            }
            tracing::info!(script = %step.script.display(), "Running generator...");
            toolchain.run_generator(&layout.root, step)?;
        }
        Ok(())
    }

    fn prepare_output(&self, layout: &Layout) -> Result<(), UniError> {
        if !self.clean || !layout.output.exists() {
            return Ok(());
        }
        // symlinks may still point the output above the root
        let resolved = fs::canonicalize(&layout.output).map_err(|e| UniError::io(&layout.output, e))?;
        if layout.root.starts_with(&layout.output) || layout.root.starts_with(&resolved) {
            return Err(UniError::Config(format!(
                "Refusing to clean {}: it contains the project root",
                layout.output.display()
            )));
        }
        if self.dry_run {
            tracing::info!(output = %layout.output.display(), "[dry-run] would remove output directory");
            return Ok(());
        }
        tracing::info!(output = %layout.output.display(), "Removing previous output");
        fs::remove_dir_all(&layout.output).map_err(|e| UniError::io(&layout.output, e))
    }

    fn run_platform(
        &self,
        toolchain: &dyn Toolchain,
        layout: &Layout,
        platform: &ResolvedPlatform,
        registry: &mut HeaderRegistry,
        report: &mut MergeReport,
    ) -> Result<PlatformReport, UniError> {
        let descriptor = &platform.descriptor;
        let arch = descriptor.arch();
        let build_dir = self.build_dir(&layout.root, arch);
        let mut pass = PlatformPass::new(platform);

        pass.advance();
        let invocation = ConfigureInvocation::new(
            layout.root.join(&self.configure_script),
            &build_dir,
            descriptor,
            &platform.tools,
        );
        if self.dry_run {
            if !build_dir.is_dir() {
                report
                    .missing_build_trees
                    .insert(relative_display(&build_dir, &layout.root));
            }
            tracing::info!(
                script = %invocation.script.display(),
                host = %invocation.host_arg(),
                build_dir = %build_dir.display(),
                cflags = invocation.env_var("CFLAGS").unwrap_or_default(),
                "[dry-run] would run configure"
            );
        } else {
            fs::create_dir_all(&build_dir).map_err(|e| pass.failed(UniError::io(&build_dir, e)))?;
            toolchain.configure(&invocation).map_err(|e| pass.failed(e))?;
        }

        pass.advance();
        let headers = Destination::includes_only(&layout.includes);
        let mut classified = Vec::new();
        for tree in [build_dir.clone(), build_dir.join("include")] {
            let mut classifier = classify(&tree, Some(arch), &self.rules, &headers);
            for file in classifier.by_ref() {
                classified.push(file.map_err(|e| pass.failed(e))?);
            }
            let mut unrecognized = classifier.into_unrecognized_dirs();
            // walked as a tree of its own
            unrecognized.remove(Path::new("include"));
            warn_unrecognized(&tree, &unrecognized);
            report.record_unrecognized(&relative_display(&tree, &layout.root), unrecognized);
        }

        pass.advance();
        let mut files = Vec::with_capacity(classified.len());
        for file in &classified {
            let merged = merge_one(file, &headers, registry, self.dry_run).map_err(|e| pass.failed(e))?;
            files.push(merged);
        }
        self.log_files(&files);

        pass.advance();
        Ok(PlatformReport {
            name: descriptor.name().to_string(),
            arch,
            triple: descriptor.triple().to_string(),
            state: pass.state,
            files: files
                .iter()
                .map(|f| relative_display(&f.output, &layout.output))
                .collect(),
        })
    }

    fn log_files(&self, files: &[MergedFile]) {
        if !self.verbose {
            return;
        }
        for file in files {
            tracing::info!(
                output = %file.output.display(),
                arch = file.arch.map(|a| a.as_str()).unwrap_or("common"),
                "  merged"
            );
        }
    }
}
