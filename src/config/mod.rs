//! Configuration loading and validation.
//!
//! Arena templates are parsed from YAML, validated against the victory-rule
//! registry, and handed to the arena manager. The core consumes only
//! validated values.

use std::path::Path;

use tracing::warn;

use crate::error::{ConfigError, Severity};
use crate::victory::VictoryRegistry;

pub mod schema;
pub mod validation;

pub use schema::{ArenaTemplate, ArenasConfig, TeamLayout};
pub use validation::{has_errors, validate};

/// Loads and validates a configuration file.
///
/// Warnings are logged; errors fail the load with every issue attached.
///
/// # Errors
///
/// Returns [`ConfigError::MissingFile`] if the path does not exist,
/// [`ConfigError::ParseError`] on malformed YAML, and
/// [`ConfigError::ValidationError`] when validation finds hard errors.
pub fn load(path: &Path, rules: &VictoryRegistry) -> Result<ArenasConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let config: ArenasConfig =
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let issues = validate(&config, rules);
    for issue in issues.iter().filter(|i| i.severity == Severity::Warning) {
        warn!(path = %issue.path, "{}", issue.message);
    }

    if has_errors(&issues) {
        return Err(ConfigError::ValidationError {
            path: path.display().to_string(),
            errors: issues,
        });
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_valid_file() {
        let file = write_config(
            r"
templates:
  - name: duel
    min_players: 2
    teams: { count: 2, capacity: 2 }
    victory_rule: last_team_standing
",
        );
        let config = load(file.path(), &VictoryRegistry::with_builtins()).unwrap();
        assert_eq!(config.templates.len(), 1);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load(
            Path::new("/definitely/not/here.yaml"),
            &VictoryRegistry::with_builtins(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let file = write_config("templates: [ {{{{");
        let err = load(file.path(), &VictoryRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn validation_errors_fail_load() {
        let file = write_config(
            r"
templates:
  - name: duel
    min_players: 2
    teams: { count: 2, capacity: 2 }
    victory_rule: coin_flip
",
        );
        let err = load(file.path(), &VictoryRegistry::with_builtins()).unwrap_err();
        match err {
            ConfigError::ValidationError { errors, .. } => {
                assert!(!errors.is_empty());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
