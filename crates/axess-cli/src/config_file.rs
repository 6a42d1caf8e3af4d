use std::{fs, io, path::Path};

use axess_core::CleanerConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    #[serde(flatten)]
    pub cleaner: CleanerConfig,
}

/// Error type for configuration loading operations.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error when reading the file.
    Io(io::Error),
    /// TOML parsing error.
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error: {}", err),
            ConfigError::Parse(err) => write!(f, "TOML parsing error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err)
    }
}

/// Loads the cleaner configuration from a TOML file.
///
/// Missing keys keep their default values. Unknown delimiters are rejected while parsing, so a
/// typo in `delimiters` does not silently disable a rewrite.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok(config)
}

#[inline]
fn parse_config(s: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(s)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use axess_core::{DEFAULT_MAX_PASSES, Delimiter};

    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
max-expansion-passes = 10
delimiters = ["$"]
add-package = true

[macros]
R = "\\mathbb{R}"
eps = "\\varepsilon"
        "#;
        let config = parse_config(toml_content).unwrap();
        assert_eq!(config.cleaner.max_expansion_passes, 10);
        assert_eq!(config.cleaner.delimiters, [Delimiter::Inline]);
        assert!(config.cleaner.add_package);
        let names: Vec<_> = config
            .cleaner
            .macros
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, ["R", "eps"]);
        assert_eq!(config.cleaner.macros[1].1, "\\varepsilon");
    }

    #[test]
    fn test_invalid_config() {
        let invalid_toml = "invalid_toml";
        let result = parse_config(invalid_toml);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unsupported_delimiter() {
        let result = parse_config(r#"delimiters = ["$", "\\["]"#);
        let Err(ConfigError::Parse(err)) = result else {
            panic!("expected a parse error");
        };
        assert!(err.to_string().contains(r#"Unsupported delimiter "\[""#));
    }

    #[test]
    fn test_partial_config() {
        let toml_content = r#"
[macros]
R = "\\mathbb{R}"
        "#;
        let config = parse_config(toml_content).unwrap();
        assert_eq!(config.cleaner.max_expansion_passes, DEFAULT_MAX_PASSES);
        assert_eq!(
            config.cleaner.delimiters,
            [Delimiter::Inline, Delimiter::Display]
        );
        assert!(!config.cleaner.add_package);
        assert_eq!(config.cleaner.macros.len(), 1);
    }
}
