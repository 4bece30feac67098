//! Configuration loading for graph construction
//!
//! Reads `hpg.toml`, searched for from the analyzed directory upwards.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::graph::GraphOptions;
use crate::interproc::LinkOptions;

pub const CONFIG_FILENAME: &str = "hpg.toml";

pub const DEFAULT_PDG_TIMEOUT_MS: u64 = 600_000;

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["analysis", "output"];
const KNOWN_ANALYSIS_KEYS: &[&str] = &[
    "pdg_timeout_ms",
    "interprocedural",
    "event_handlers",
    "local_storage",
];
const KNOWN_OUTPUT_KEYS: &[&str] = &["ast_edges", "pretty"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid TOML in '{path}': {message}")]
    ParseError { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct ConfigResult {
    pub config: Config,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Wall-clock budget for def-use construction, in milliseconds.
    pub pdg_timeout_ms: u64,
    pub interprocedural: bool,
    pub event_handlers: bool,
    pub local_storage: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pdg_timeout_ms: DEFAULT_PDG_TIMEOUT_MS,
            interprocedural: true,
            event_handlers: true,
            local_storage: true,
        }
    }
}

impl AnalysisConfig {
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            event_handlers: self.event_handlers,
            local_storage: self.local_storage,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub ast_edges: bool,
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            ast_edges: true,
            pretty: false,
        }
    }
}

impl OutputConfig {
    pub fn graph_options(&self) -> GraphOptions {
        GraphOptions {
            ast_edges: self.ast_edges,
        }
    }
}

pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse(path: &Path, content: &str) -> Result<Config, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = read(path)?;
    parse(path, &content)
}

pub fn load_config_with_warnings(path: &Path) -> Result<ConfigResult, ConfigError> {
    let content = read(path)?;
    let config = parse(path, &content)?;
    let warnings = detect_unknown_keys(&content);

    Ok(ConfigResult { config, warnings })
}

fn detect_unknown_keys(content: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let table: toml::Table = match content.parse() {
        Ok(t) => t,
        Err(_) => return warnings,
    };

    let known_top: HashSet<&str> = KNOWN_TOP_LEVEL_KEYS.iter().copied().collect();
    for key in table.keys() {
        if !known_top.contains(key.as_str()) {
            warnings.push(format!("Unknown config option: '{}'", key));
        }
    }

    for (section, known) in [("analysis", KNOWN_ANALYSIS_KEYS), ("output", KNOWN_OUTPUT_KEYS)] {
        if let Some(toml::Value::Table(values)) = table.get(section) {
            for key in values.keys() {
                if !known.contains(&key.as_str()) {
                    warnings.push(format!("Unknown config option in [{}]: '{}'", section, key));
                }
            }
        }
    }

    warnings
}

pub fn load_config_or_default(start_dir: &Path) -> Config {
    find_config_file(start_dir)
        .and_then(|path| load_config(&path).ok())
        .unwrap_or_default()
}

pub fn load_config_or_default_with_warnings(start_dir: &Path) -> ConfigResult {
    match find_config_file(start_dir) {
        Some(path) => load_config_with_warnings(&path).unwrap_or_default(),
        None => ConfigResult::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn create_temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("Failed to create temp dir")
    }

    #[test]
    fn load_config_from_file() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            r#"
[analysis]
pdg_timeout_ms = 1500
event_handlers = false

[output]
pretty = true
"#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();

        assert_eq!(config.analysis.pdg_timeout_ms, 1500);
        assert!(!config.analysis.event_handlers);
        assert!(config.analysis.local_storage);
        assert!(config.analysis.interprocedural);
        assert!(config.output.pretty);
        assert!(config.output.ast_edges);
    }

    #[test]
    fn default_config_when_missing() {
        let dir = create_temp_dir();
        let config = load_config_or_default(dir.path());

        assert_eq!(config, Config::default());
        assert_eq!(config.analysis.pdg_timeout_ms, DEFAULT_PDG_TIMEOUT_MS);
        assert!(config.analysis.interprocedural);
        assert!(!config.output.pretty);
    }

    #[test]
    fn error_on_invalid_toml() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "this is not valid { toml }").unwrap();

        let result = load_config(&config_path);

        match result {
            Err(ConfigError::ParseError { path, message }) => {
                assert_eq!(path, config_path);
                assert!(!message.is_empty());
            }
            other => panic!("Expected ParseError, got {other:?}"),
        }
    }

    #[test]
    fn wrong_value_type_is_a_parse_error() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "[analysis]\npdg_timeout_ms = \"soon\"").unwrap();

        assert!(matches!(
            load_config(&config_path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = create_temp_dir();

        let result = load_config(&dir.path().join(CONFIG_FILENAME));

        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn find_config_file_in_parent_directory() {
        let parent = create_temp_dir();
        let child = parent.path().join("subdir");
        fs::create_dir(&child).unwrap();
        let config_path = parent.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "").unwrap();

        let found = find_config_file(&child);

        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn find_config_file_returns_none_when_not_found() {
        let dir = create_temp_dir();

        assert!(find_config_file(dir.path()).is_none());
    }

    #[test]
    fn unknown_keys_produce_warnings() {
        let dir = create_temp_dir();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &config_path,
            "verbose = true\n[analysis]\ntimeout = 3\n[output]\nformat = \"dot\"",
        )
        .unwrap();

        let result = load_config_with_warnings(&config_path).unwrap();

        assert_eq!(
            result.warnings,
            vec![
                "Unknown config option: 'verbose'",
                "Unknown config option in [analysis]: 'timeout'",
                "Unknown config option in [output]: 'format'",
            ]
        );
        assert_eq!(result.config, Config::default());
    }

    #[test]
    fn options_follow_the_config() {
        let config = Config {
            analysis: AnalysisConfig {
                local_storage: false,
                ..AnalysisConfig::default()
            },
            output: OutputConfig {
                ast_edges: false,
                pretty: false,
            },
        };

        assert!(config.analysis.link_options().event_handlers);
        assert!(!config.analysis.link_options().local_storage);
        assert!(!config.output.graph_options().ast_edges);
    }

    #[test]
    fn config_error_display_is_helpful() {
        let err = ConfigError::ParseError {
            path: PathBuf::from("/path/to/hpg.toml"),
            message: "expected `=`".to_string(),
        };

        let msg = format!("{}", err);

        assert!(msg.contains("/path/to/hpg.toml"));
        assert!(msg.contains("expected `=`"));
    }
}
