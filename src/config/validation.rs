//! Template validation.
//!
//! Runs after parsing and before registration. Errors block the
//! configuration; warnings are logged and tolerated. Victory-rule
//! existence is checked here so an unknown rule fails at load time,
//! never mid-match.

use std::collections::HashSet;

use crate::config::schema::ArenasConfig;
use crate::error::{Severity, ValidationIssue};
use crate::victory::VictoryRegistry;

/// Validates a parsed configuration against a victory-rule registry.
///
/// Returns every issue found; the caller decides whether any are fatal via
/// [`has_errors`].
#[must_use]
pub fn validate(config: &ArenasConfig, rules: &VictoryRegistry) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut seen_names: HashSet<&str> = HashSet::new();

    for (i, template) in config.templates.iter().enumerate() {
        let at = |field: &str| format!("templates[{i}].{field}");

        if template.name.is_empty() {
            issues.push(error(at("name"), "template name must not be empty"));
        } else if !seen_names.insert(&template.name) {
            issues.push(error(
                at("name"),
                format!("duplicate template name '{}'", template.name),
            ));
        }

        if template.teams.count == 0 {
            issues.push(error(at("teams.count"), "at least one team is required"));
        }
        if template.teams.capacity == 0 {
            issues.push(error(
                at("teams.capacity"),
                "team capacity must be positive",
            ));
        }
        if let Some(names) = &template.teams.names {
            if names.len() != usize::from(template.teams.count) {
                issues.push(warning(
                    at("teams.names"),
                    format!(
                        "{} names given for {} teams",
                        names.len(),
                        template.teams.count
                    ),
                ));
            }
        }

        if template.min_players == 0 {
            issues.push(error(at("min_players"), "minimum players must be positive"));
        } else if template.min_players > template.max_players() {
            issues.push(error(
                at("min_players"),
                format!(
                    "minimum {} exceeds layout capacity {}",
                    template.min_players,
                    template.max_players()
                ),
            ));
        }

        if template.countdown.is_zero() {
            issues.push(error(at("countdown"), "countdown must be positive"));
        }
        if template.restore_timeout.is_zero() {
            issues.push(error(
                at("restore_timeout"),
                "restoration timeout must be positive",
            ));
        }
        if template.time_limit.is_none() {
            issues.push(warning(
                at("time_limit"),
                "no time limit; a stuck match only ends by forfeit or shutdown",
            ));
        }

        if !rules.contains(&template.victory_rule) {
            issues.push(error(
                at("victory_rule"),
                format!("unknown victory rule '{}'", template.victory_rule),
            ));
        }
        if template.victory_rule == "score_target" && template.score_target.is_none() {
            issues.push(warning(
                at("score_target"),
                "score_target rule without an explicit target; defaulting to 10",
            ));
        }
    }

    issues
}

/// Whether any issue is a hard error.
#[must_use]
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

fn error(path: String, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        path,
        message: message.into(),
        severity: Severity::Error,
    }
}

fn warning(path: String, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        path,
        message: message.into(),
        severity: Severity::Warning,
    }
}
