//! Configuration file support for unisource.
//!
//! `unisource.toml` persists project layout settings so they don't have to be
//! passed on every invocation.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. The path given with `--config`
//! 2. Current working directory (`./unisource.toml`)
//! 3. Parent directories (up to the repository root or filesystem root)
//!
//! When a file is found and no `--project-root` is given, the directory
//! holding it is the project root.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! source_dir = "src"
//! include_dir = "include"
//! output_dir = "ios"
//!
//! [[generate]]
//! script = "src/arm/gentramp.sh"
//! output = "src/arm/trampoline.S"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use unisource_sdk::GeneratorStep;

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "unisource.toml";

/// Root configuration structure for `unisource.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnisourceConfig {
    /// Project layout.
    pub project: ProjectConfig,

    /// Generator steps, run in order before merging.
    #[serde(rename = "generate")]
    pub generators: Vec<GeneratorStep>,
}

/// Project layout, all paths relative to the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Original source tree. Defaults to `src`.
    pub source_dir: PathBuf,

    /// Original public header tree. Defaults to `include`.
    pub include_dir: PathBuf,

    /// Output directory for the universal tree. Defaults to `ios`.
    pub output_dir: PathBuf,

    /// Configure script. Defaults to `configure`.
    pub configure_script: PathBuf,

    /// Build directories are named `<prefix><arch>`. Defaults to `build_`.
    pub build_dir_prefix: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            include_dir: PathBuf::from("include"),
            output_dir: PathBuf::from(unisource_sdk::builders::DEFAULT_OUTPUT_DIR),
            configure_script: PathBuf::from("configure"),
            build_dir_prefix: "build_".to_string(),
        }
    }
}

impl UnisourceConfig {
    /// Loads configuration from the specified file path.
    ///
    /// # Returns
    ///
    /// * `Ok(UnisourceConfig)` - Successfully loaded configuration
    /// * `Err` - If the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: UnisourceConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Searches for `unisource.toml` from the current directory upward.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// The result parses back to the default configuration plus the ARM
    /// trampoline generator step.
    pub fn generate_starter_toml() -> String {
        r#"# unisource configuration file
# CLI flags override these settings when provided.
# All paths are relative to the directory holding this file.

[project]
# Original source tree; arm/, aarch64/ and x86/ hold per-arch sources
source_dir = "src"

# Original public headers
include_dir = "include"

# Output directory for the universal source tree (default: ios)
output_dir = "ios"

# Script run once per platform with --host=<triple>
configure_script = "configure"

# Per-platform build directories: build_arm, build_arm64, build_i386, build_x86_64
build_dir_prefix = "build_"

# Generator steps run with bash from the project root before merging.
# Stdout is written to `output`.
[[generate]]
script = "src/arm/gentramp.sh"
output = "src/arm/trampoline.S"
"#
        .to_string()
    }
}

/// Merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<UnisourceConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Loads `explicit` if given, otherwise discovers a config file.
    ///
    /// A missing explicit file is an error; finding nothing by discovery is not.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        let found = match explicit {
            Some(path) => Some((UnisourceConfig::load_from_file(path)?, path.to_path_buf())),
            None => UnisourceConfig::discover()?,
        };
        Ok(match found {
            Some((config, path)) => Self {
                config: Some(config),
                config_path: Some(path),
            },
            None => Self::default(),
        })
    }

    /// Project layout from config, or defaults.
    pub fn project(&self) -> ProjectConfig {
        self.config
            .as_ref()
            .map(|c| c.project.clone())
            .unwrap_or_default()
    }

    /// Generator steps from config.
    pub fn generators(&self) -> Vec<GeneratorStep> {
        self.config
            .as_ref()
            .map(|c| c.generators.clone())
            .unwrap_or_default()
    }

    /// Directory holding the loaded config file.
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .map(|dir| if dir.as_os_str().is_empty() { Path::new(".") } else { dir })
    }

    /// Project root: CLI value, then the config file's directory, then `.`.
    pub fn project_root(&self, cli_value: Option<PathBuf>) -> PathBuf {
        cli_value
            .or_else(|| self.config_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Returns
    ///
    /// The resolved value, preferring CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&UnisourceConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = UnisourceConfig::default();
        assert_eq!(config.project.source_dir, PathBuf::from("src"));
        assert_eq!(config.project.include_dir, PathBuf::from("include"));
        assert_eq!(config.project.output_dir, PathBuf::from("ios"));
        assert_eq!(config.project.configure_script, PathBuf::from("configure"));
        assert_eq!(config.project.build_dir_prefix, "build_");
        assert!(config.generators.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let toml_content = r#"
[project]
output_dir = "dist/ios"
build_dir_prefix = "out-"

[[generate]]
script = "gen/a.sh"
output = "src/a.S"

[[generate]]
script = "gen/b.sh"
output = "src/b.S"
"#;
        std::fs::write(&config_path, toml_content).unwrap();

        let config = UnisourceConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.project.output_dir, PathBuf::from("dist/ios"));
        assert_eq!(config.project.build_dir_prefix, "out-");
        // unspecified fields keep their defaults
        assert_eq!(config.project.source_dir, PathBuf::from("src"));
        assert_eq!(config.generators.len(), 2);
        assert_eq!(config.generators[1].output, PathBuf::from("src/b.S"));
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[project\nsource_dir = 3").unwrap();
        let err = UnisourceConfig::load_from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_discover_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[project]\noutput_dir = \"universal\"\n").unwrap();
        let nested = temp_dir.path().join("src/arm");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = UnisourceConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(config.project.output_dir, PathBuf::from("universal"));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_no_config() {
        let temp_dir = TempDir::new().unwrap();
        // Create a .git directory to stop the search
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let result = UnisourceConfig::discover_from(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_starter_toml_parses() {
        let config: UnisourceConfig = toml::from_str(&UnisourceConfig::generate_starter_toml()).unwrap();
        assert_eq!(config.project, ProjectConfig::default());
        assert_eq!(
            config.generators,
            vec![GeneratorStep {
                script: PathBuf::from("src/arm/gentramp.sh"),
                output: PathBuf::from("src/arm/trampoline.S"),
            }]
        );
    }

    #[test]
    fn test_config_resolver() {
        let mut config = UnisourceConfig::default();
        config.project.output_dir = PathBuf::from("from-config");
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: Some(PathBuf::from("/work/libffi/unisource.toml")),
        };

        // CLI value takes precedence
        let out = resolver.resolve(Some(PathBuf::from("cli")), |c| Some(c.project.output_dir.clone()), PathBuf::from("ios"));
        assert_eq!(out, PathBuf::from("cli"));

        // Config value used when CLI is None
        let out = resolver.resolve(None, |c| Some(c.project.output_dir.clone()), PathBuf::from("ios"));
        assert_eq!(out, PathBuf::from("from-config"));

        assert_eq!(resolver.project_root(None), PathBuf::from("/work/libffi"));
        assert_eq!(resolver.project_root(Some(PathBuf::from("/other"))), PathBuf::from("/other"));
    }

    #[test]
    fn test_resolver_without_config() {
        let resolver = ConfigResolver::default();
        let out = resolver.resolve(None, |c| Some(c.project.output_dir.clone()), PathBuf::from("ios"));
        assert_eq!(out, PathBuf::from("ios"));
        assert_eq!(resolver.project_root(None), PathBuf::from("."));
        assert_eq!(resolver.project(), ProjectConfig::default());
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ConfigResolver::new(Some(&temp_dir.path().join("nope.toml"))).is_err());
    }
}
