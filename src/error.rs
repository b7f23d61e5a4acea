//! Error types for `arenad`.
//!
//! Participant-facing failures (join rejections) are typed results the
//! command layer can translate into user messaging. Structural invariant
//! violations (illegal phase transitions) are loud `PhaseError`s. Module
//! handler failures are contained at the dispatch site and never propagate
//! into the state machine.

use std::path::PathBuf;
use thiserror::Error;

use crate::arena::lifecycle::Phase;
use crate::ids::{InstanceId, PlayerId};

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `arenad` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Template registration error (unknown victory rule, bad layout)
    pub const TEMPLATE_ERROR: i32 = 4;

    /// Lifecycle state machine error (invalid transition)
    pub const PHASE_ERROR: i32 = 5;

    /// Tournament orchestration error
    pub const TOURNAMENT_ERROR: i32 = 6;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `arenad` operations.
///
/// Aggregates all domain-specific errors and provides a unified interface
/// for error handling and exit code mapping.
#[derive(Debug, Error)]
pub enum ArenadError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Template registration error
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Join/leave rejection
    #[error(transparent)]
    Join(#[from] JoinError),

    /// Lifecycle state machine error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Tournament orchestration error
    #[error(transparent)]
    Tournament(#[from] TournamentError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ArenadError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Template(_) => ExitCode::TEMPLATE_ERROR,
            Self::Phase(_) => ExitCode::PHASE_ERROR,
            Self::Tournament(_) => ExitCode::TOURNAMENT_ERROR,
            Self::Join(_) => ExitCode::ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "templates[2].teams")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Validation failure that prevents the configuration from being used
    Error,
    /// Potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Template Errors
// ============================================================================

/// Template registration errors.
///
/// These are fatal at registration time — an arena template that references
/// an unregistered victory rule is rejected before any instance can exist.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template references a victory rule that is not registered
    #[error("unknown victory rule '{rule}' in template '{template}'")]
    UnknownVictoryRule {
        /// The unrecognized rule identifier
        rule: String,
        /// Name of the offending template
        template: String,
    },

    /// A template with this name is already registered
    #[error("template '{0}' is already registered")]
    DuplicateTemplate(String),

    /// No template registered under this name
    #[error("no template named '{0}'")]
    NotFound(String),

    /// Team layout cannot satisfy the player bounds
    #[error("template '{template}': {message}")]
    InvalidLayout {
        /// Name of the offending template
        template: String,
        /// What is wrong with the layout
        message: String,
    },
}

// ============================================================================
// Join Errors
// ============================================================================

/// Rejections returned to a participant attempting to join an arena.
///
/// These never crash anything — the command layer turns them into
/// user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// The player already holds an active membership somewhere
    #[error("player {player} is already in arena {arena}")]
    AlreadyMember {
        /// The player attempting to join
        player: PlayerId,
        /// The arena holding their existing membership
        arena: InstanceId,
    },

    /// Every team in the arena is at capacity
    #[error("arena {0} is full")]
    ArenaFull(InstanceId),

    /// The arena's current phase does not accept joins
    #[error("arena {arena} is not joinable in phase {phase}")]
    InvalidPhase {
        /// The arena that rejected the join
        arena: InstanceId,
        /// Its current phase
        phase: Phase,
    },

    /// No running instance with this id
    #[error("no arena instance {0}")]
    NoSuchInstance(InstanceId),
}

// ============================================================================
// Lifecycle Errors
// ============================================================================

/// Lifecycle state machine errors.
///
/// An `IllegalTransition` is a programmer error: the scheduler never asks
/// the machine to perform one, so surfacing it loudly is correct.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Attempted transition not present in the transition table
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition {
        /// Phase the machine was in
        from: Phase,
        /// Phase that was requested
        to: Phase,
    },

    /// A terminal decision was already recorded for this instance
    #[error("decision already recorded for instance {0}")]
    AlreadyDecided(InstanceId),
}

// ============================================================================
// Handler Errors
// ============================================================================

/// Failure reported by a module handler during event dispatch.
///
/// Contained at the dispatch site: logged with the module identity, never
/// propagated to other handlers or the state machine.
#[derive(Debug, Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Creates a handler error from anything displayable.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// ============================================================================
// Tournament Errors
// ============================================================================

/// Tournament orchestration errors.
#[derive(Debug, Error)]
pub enum TournamentError {
    /// Not enough participants to form a bracket
    #[error("need at least 2 participants, got {0}")]
    NotEnoughParticipants(usize),

    /// The tournament has already started
    #[error("tournament already started")]
    AlreadyStarted,

    /// Scheduling the next round failed
    #[error("failed to schedule round {round}: {message}")]
    ScheduleFailed {
        /// Round number that could not be scheduled
        round: u32,
        /// Reason scheduling failed
        message: String,
    },
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `arenad` operations.
pub type Result<T> = std::result::Result<T, ArenadError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::TEMPLATE_ERROR, 4);
        assert_eq!(ExitCode::PHASE_ERROR, 5);
        assert_eq!(ExitCode::TOURNAMENT_ERROR, 6);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_template_error_exit_code() {
        let err: ArenadError = TemplateError::UnknownVictoryRule {
            rule: "nope".to_string(),
            template: "duel".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::TEMPLATE_ERROR);
    }

    #[test]
    fn test_phase_error_exit_code() {
        let err: ArenadError = PhaseError::IllegalTransition {
            from: Phase::Idle,
            to: Phase::Active,
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::PHASE_ERROR);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: ArenadError = ConfigError::MissingFile {
            path: PathBuf::from("/missing.yaml"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_join_error_display() {
        let err = JoinError::ArenaFull(InstanceId::nil());
        assert!(err.to_string().contains("is full"));
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "templates[0].countdown".to_string(),
            message: "must be positive".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: must be positive at templates[0].countdown"
        );
    }

    #[test]
    fn test_validation_issue_warning_display() {
        let issue = ValidationIssue {
            path: "templates[1].time_limit".to_string(),
            message: "no time limit set".to_string(),
            severity: Severity::Warning,
        };
        assert!(issue.to_string().starts_with("warning:"));
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = PhaseError::IllegalTransition {
            from: Phase::Waiting,
            to: Phase::Ending,
        };
        assert!(err.to_string().contains("waiting"));
        assert!(err.to_string().contains("ending"));
    }
}
