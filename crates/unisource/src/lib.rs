//! # unisource
//!
//! Command-line tool that turns an autotools C library into a universal iOS
//! source distribution.
//!
//! ## Overview
//!
//! A library like libffi can only be configured for one architecture at a
//! time. `unisource` configures it once per iOS platform and merges the
//! results into a single tree that compiles for all of them:
//!
//! - **Common files** are copied verbatim
//! - **Architecture files** are wrapped in `#ifdef __<arch>__` ... `#endif`
//! - **Generated headers** get an arch suffix (`fficonfig_arm64.h`) plus an
//!   umbrella header including every variant
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter config
//! unisource init
//!
//! # Preview the merge without running configure
//! unisource --dry-run build
//!
//! # Configure all four platforms and write ios/
//! unisource build --clean
//!
//! # Re-merge build trees that already exist
//! unisource merge --tree build_arm=arm --tree build_arm64=arm64 --includes-out ios/include
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Configure every platform and write the universal tree |
//! | `merge` | Classify and merge existing trees without configuring |
//! | `platforms` | Print the supported platforms |
//! | `init` | Write a starter `unisource.toml` |
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--dry-run`** - Preview what would be done without making changes
//! - **`--verbose` / `-v`** - Enable debug logging (`RUST_LOG` overrides)
//! - **`--config`** - Use this config file instead of discovering one
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `unisource.toml`

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use unisource_sdk::builders::DEFAULT_OUTPUT_DIR;
use unisource_sdk::registry::HeaderRegistry;
use unisource_sdk::{Arch, Destination, MergeReport, PLATFORMS, RuleSet, UniversalBuilder, XcodeToolchain, merge_tree, umbrella};

pub mod config;

use config::{CONFIG_FILE_NAME, ConfigResolver, UnisourceConfig};

/// Builds universal iOS source distributions from per-architecture builds.
#[derive(Parser, Debug)]
#[command(name = "unisource", author, version, about = "Universal iOS source distribution builder", long_about = None)]
struct Cli {
    /// Print what would be done without actually doing it
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print verbose output including every merged file
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Config file to use instead of discovering unisource.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configure every platform and merge the results into one source tree.
    Build {
        #[arg(long, help = "Library checkout containing configure (default: config file directory or .)")]
        project_root: Option<PathBuf>,
        #[arg(long, help = "Output directory, relative to the project root (default: ios)")]
        output_dir: Option<PathBuf>,
        #[arg(long, help = "Source tree, relative to the project root (default: src)")]
        source_dir: Option<PathBuf>,
        #[arg(long, help = "Public header tree, relative to the project root (default: include)")]
        include_dir: Option<PathBuf>,
        #[arg(long, help = "Remove the output directory before merging")]
        clean: bool,
    },
    /// Classify and merge existing trees without running configure.
    Merge {
        #[arg(
            long = "tree",
            required = true,
            value_parser = parse_tree,
            help = "Tree to merge, optionally tagged: DIR or DIR=ARCH (repeatable)"
        )]
        trees: Vec<TreeArg>,
        #[arg(long, value_parser = parse_arch, help = "Arch for trees given without one")]
        arch: Option<Arch>,
        #[arg(long, help = "Destination for non-header files")]
        sources_out: Option<PathBuf>,
        #[arg(long, help = "Destination for headers and umbrella headers")]
        includes_out: Option<PathBuf>,
    },
    /// List supported platforms.
    Platforms {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },
    /// Write a starter unisource.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
    },
}

/// A tree given to `merge`, with its optional arch tag.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TreeArg {
    path: PathBuf,
    arch: Option<Arch>,
}

fn parse_arch(value: &str) -> Result<Arch, String> {
    Arch::parse(value).ok_or_else(|| {
        let known: Vec<_> = Arch::ALL.iter().map(|a| a.as_str()).collect();
        format!("unknown arch '{}' (expected one of: {})", value, known.join(", "))
    })
}

fn parse_tree(value: &str) -> Result<TreeArg, String> {
    if let Some((path, arch)) = value.rsplit_once('=')
        && let Some(arch) = Arch::parse(arch)
    {
        return Ok(TreeArg {
            path: PathBuf::from(path),
            arch: Some(arch),
        });
    }
    Ok(TreeArg {
        path: PathBuf::from(value),
        arch: None,
    })
}

/// Installs the tracing subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build {
            project_root,
            output_dir,
            source_dir,
            include_dir,
            clean,
        } => cmd_build(
            BuildArgs {
                project_root,
                output_dir,
                source_dir,
                include_dir,
                clean,
            },
            cli.config.as_deref(),
            cli.dry_run,
            cli.verbose,
        ),
        Command::Merge {
            trees,
            arch,
            sources_out,
            includes_out,
        } => cmd_merge(&trees, arch, sources_out, includes_out, cli.dry_run, cli.verbose),
        Command::Platforms { json } => cmd_platforms(json),
        Command::Init { output } => cmd_init(&output, cli.dry_run),
    }
}

#[derive(Debug, Default)]
struct BuildArgs {
    project_root: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    source_dir: Option<PathBuf>,
    include_dir: Option<PathBuf>,
    clean: bool,
}

/// Resolves CLI arguments against the config file into a builder.
fn resolve_builder(args: BuildArgs, resolver: &ConfigResolver, dry_run: bool, verbose: bool) -> UniversalBuilder {
    let project = resolver.project();
    let project_root = resolver.project_root(args.project_root);

    UniversalBuilder::new(project_root)
        .verbose(verbose)
        .dry_run(dry_run)
        .clean(args.clean)
        .output_dir(resolver.resolve(
            args.output_dir,
            |c| Some(c.project.output_dir.clone()),
            PathBuf::from(DEFAULT_OUTPUT_DIR),
        ))
        .source_dir(args.source_dir.unwrap_or(project.source_dir))
        .include_dir(args.include_dir.unwrap_or(project.include_dir))
        .configure_script(project.configure_script)
        .build_dir_prefix(project.build_dir_prefix)
        .generators(resolver.generators())
}

fn cmd_build(args: BuildArgs, config: Option<&Path>, dry_run: bool, verbose: bool) -> Result<()> {
    let resolver = ConfigResolver::new(config)?;
    if let Some(config_path) = &resolver.config_path {
        println!("Using config file: {:?}", config_path);
    }
    if dry_run {
        println!("  Mode: dry-run (no changes will be made)");
    }

    let project_root = resolver.project_root(args.project_root.clone());
    tracing::debug!(project_root = %project_root.display(), "resolved project root");
    let builder = resolve_builder(args, &resolver, dry_run, verbose);
    let report = builder
        .build(&XcodeToolchain::new())
        .with_context(|| format!("Failed to build universal sources in {:?}", project_root))?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &MergeReport) {
    let verb = if report.dry_run { "Would write" } else { "Wrote" };
    println!("\n{} {} files", verb, report.files_written());
    println!("  Common: {}", report.common_files.len());
    for (arch, files) in &report.arch_sources {
        println!("  Sources for {}: {}", arch, files.len());
    }
    for platform in &report.platforms {
        println!(
            "  {:<12} {:<7} {:<24} {} files",
            platform.name,
            platform.arch,
            platform.triple,
            platform.files.len()
        );
    }
    for header in &report.umbrella_headers {
        println!("  Umbrella {} ({})", header.name, join_archs(&header.archs));
    }
    if !report.missing_build_trees.is_empty() {
        println!(
            "  Not configured yet, umbrella plan incomplete: {}",
            report.missing_build_trees.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    for (tree, dirs) in &report.unrecognized_dirs {
        println!("  Skipped in {}: {}", tree, dirs.iter().cloned().collect::<Vec<_>>().join(", "));
    }
}

fn join_archs<'a>(archs: impl IntoIterator<Item = &'a Arch>) -> String {
    archs.into_iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
}

fn cmd_merge(
    trees: &[TreeArg],
    default_arch: Option<Arch>,
    sources_out: Option<PathBuf>,
    includes_out: Option<PathBuf>,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    if sources_out.is_none() && includes_out.is_none() {
        bail!("Nothing to merge into: pass --sources-out and/or --includes-out");
    }

    let destination = Destination {
        sources: sources_out,
        includes: includes_out.clone(),
    };
    let rules = RuleSet::standard();
    let mut registry = HeaderRegistry::new();

    for tree in trees {
        let arch = tree.arch.or(default_arch);
        let merged = merge_tree(&tree.path, arch, &rules, &destination, &mut registry, dry_run)
            .with_context(|| format!("Failed to merge tree {:?}", tree.path))?;
        println!(
            "{:?} ({}): {} files",
            tree.path,
            arch.map(|a| a.as_str()).unwrap_or("common"),
            merged.files.len()
        );
        if verbose {
            for file in &merged.files {
                println!("  {}", file.output.display());
            }
        }
        for dir in &merged.unrecognized_dirs {
            println!("  skipped {}", dir.display());
        }
    }

    if let Some(includes) = includes_out {
        let snapshot = registry.snapshot();
        let plan = if dry_run {
            umbrella::plan(&snapshot)
        } else {
            umbrella::synthesize(snapshot, &includes)
                .with_context(|| format!("Failed to write umbrella headers to {:?}", includes))?
        };
        for header in &plan.umbrellas {
            println!("Umbrella {} ({})", header.name, join_archs(&header.archs));
        }
    }

    Ok(())
}

fn cmd_platforms(as_json: bool) -> Result<()> {
    if as_json {
        let platforms: Vec<_> = PLATFORMS
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "sdk": p.sdk,
                    "arch": p.arch,
                    "compiler_arch": p.compiler_arch,
                    "triple": p.triple,
                    "min_os_version": p.min_os_version,
                    "guard": p.arch.predefined_macro(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&platforms)?);
        return Ok(());
    }

    println!(
        "{:<12} {:<16} {:<7} {:<8} {:<24} {:<8} GUARD",
        "NAME", "SDK", "ARCH", "-arch", "TRIPLE", "MIN OS"
    );
    for p in PLATFORMS.iter() {
        println!(
            "{:<12} {:<16} {:<7} {:<8} {:<24} {:<8} {}",
            p.name,
            p.sdk,
            p.arch,
            p.compiler_arch,
            p.triple,
            p.min_os_version,
            p.arch.predefined_macro()
        );
    }
    Ok(())
}

fn cmd_init(output: &Path, dry_run: bool) -> Result<()> {
    if output.exists() {
        bail!("{:?} already exists; remove it first to regenerate", output);
    }
    if dry_run {
        println!("[dry-run] Would write {:?}", output);
        return Ok(());
    }
    fs::write(output, UnisourceConfig::generate_starter_toml())
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("Generated {:?}", output);
    println!("\nNext steps:");
    println!("  1. Edit {} to match the library layout", CONFIG_FILE_NAME);
    println!("  2. Run 'unisource --dry-run build' to preview the merge");
    println!("  3. Run 'unisource build' to write the universal tree");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["unisource", "build", "--clean", "-v", "--dry-run"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.dry_run);
        match cli.command {
            Command::Build { clean, output_dir, .. } => {
                assert!(clean);
                assert!(output_dir.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_merge_trees() {
        let cli = Cli::try_parse_from([
            "unisource",
            "merge",
            "--tree",
            "build_arm=arm",
            "--tree",
            "src",
            "--arch",
            "x86_64",
            "--includes-out",
            "out/include",
        ])
        .unwrap();
        match cli.command {
            Command::Merge { trees, arch, includes_out, sources_out } => {
                assert_eq!(
                    trees,
                    vec![
                        TreeArg { path: PathBuf::from("build_arm"), arch: Some(Arch::Arm) },
                        TreeArg { path: PathBuf::from("src"), arch: None },
                    ]
                );
                assert_eq!(arch, Some(Arch::X86_64));
                assert_eq!(includes_out, Some(PathBuf::from("out/include")));
                assert!(sources_out.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_arch() {
        assert!(Cli::try_parse_from(["unisource", "merge", "--tree", "t", "--arch", "mips"]).is_err());
        assert!(Cli::try_parse_from(["unisource", "merge"]).is_err());
    }

    #[test]
    fn tree_with_unknown_suffix_is_a_path() {
        assert_eq!(
            parse_tree("weird=dir").unwrap(),
            TreeArg { path: PathBuf::from("weird=dir"), arch: None }
        );
    }

    #[test]
    fn cli_overrides_config() {
        let mut config = UnisourceConfig::default();
        config.project.output_dir = PathBuf::from("from-config");
        config.project.source_dir = PathBuf::from("lib");
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: Some(PathBuf::from("/work/libffi/unisource.toml")),
        };

        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "configure", "#!/bin/sh\n");
        write(tmp.path(), "lib/common.h", "/* c */\n");
        write(tmp.path(), "src/ignored.h", "/* i */\n");

        let args = BuildArgs {
            project_root: Some(tmp.path().to_path_buf()),
            output_dir: Some(PathBuf::from("cli-out")),
            ..Default::default()
        };
        // dry run: only the common passes see real trees
        let report = resolve_builder(args, &resolver, true, false)
            .build(&FixedToolchain)
            .unwrap();
        assert!(report.common_files.contains("include/common.h"));
        assert!(!report.common_files.contains("include/ignored.h"));
        assert!(!tmp.path().join("cli-out").exists());
    }

    struct FixedToolchain;

    impl unisource_sdk::Toolchain for FixedToolchain {
        fn sdk_info(&self, sdk: &str) -> Result<unisource_sdk::builders::SdkInfo, unisource_sdk::UniError> {
            Ok(unisource_sdk::builders::SdkInfo::parse(&format!("Path: /sdks/{}\n", sdk)))
        }

        fn find_tool(&self, sdk_root: &Path, tool: &str) -> Result<PathBuf, unisource_sdk::UniError> {
            Ok(sdk_root.join(tool))
        }

        fn configure(&self, _: &unisource_sdk::builders::ConfigureInvocation) -> Result<(), unisource_sdk::UniError> {
            Ok(())
        }

        fn run_generator(&self, _: &Path, _: &unisource_sdk::GeneratorStep) -> Result<(), unisource_sdk::UniError> {
            Ok(())
        }
    }

    #[test]
    fn merge_command_writes_umbrellas() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "build_arm/fficonfig.h", "arm\n");
        write(tmp.path(), "build_arm64/fficonfig.h", "arm64\n");
        let includes = tmp.path().join("out/include");

        let trees = vec![
            TreeArg { path: tmp.path().join("build_arm"), arch: Some(Arch::Arm) },
            TreeArg { path: tmp.path().join("build_arm64"), arch: None },
        ];
        cmd_merge(&trees, Some(Arch::Arm64), None, Some(includes.clone()), false, false).unwrap();

        assert_eq!(
            fs::read_to_string(includes.join("fficonfig_arm.h")).unwrap(),
            "#ifdef __arm__\n\narm\n\n\n#endif"
        );
        assert_eq!(
            fs::read_to_string(includes.join("fficonfig.h")).unwrap(),
            "#include <fficonfig_arm.h>\n#include <fficonfig_arm64.h>\n"
        );
    }

    #[test]
    fn merge_command_needs_a_destination() {
        let trees = vec![TreeArg { path: PathBuf::from("."), arch: None }];
        let err = cmd_merge(&trees, None, None, None, false, false).unwrap_err();
        assert!(err.to_string().contains("Nothing to merge into"));
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        cmd_init(&path, false).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("[[generate]]"));

        let err = cmd_init(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(fs::read_to_string(&path).unwrap(), written);
    }

    #[test]
    fn platforms_command_runs() {
        cmd_platforms(true).unwrap();
        cmd_platforms(false).unwrap();
    }
}
