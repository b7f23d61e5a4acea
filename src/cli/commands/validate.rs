//! The `validate` command: check configuration files without running them.

use serde_json::json;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config;
use crate::error::{ArenadError, ConfigError, Severity};
use crate::victory::VictoryRegistry;

/// Validates each file in turn, stopping at the first hard failure.
///
/// # Errors
///
/// Returns the underlying [`ConfigError`] for the first file that fails to
/// parse or validate; issues are printed before the error propagates.
pub fn run(args: &ValidateArgs) -> Result<(), ArenadError> {
    let rules = VictoryRegistry::with_builtins();

    for path in &args.files {
        match config::load(path, &rules) {
            Ok(loaded) => match args.format {
                OutputFormat::Human => {
                    println!(
                        "{}: ok ({} templates)",
                        path.display(),
                        loaded.templates.len()
                    );
                }
                OutputFormat::Json => {
                    let report = json!({
                        "file": path.display().to_string(),
                        "valid": true,
                        "templates": loaded.templates.len(),
                    });
                    println!("{report}");
                }
            },
            Err(ConfigError::ValidationError { path: file, errors }) => {
                match args.format {
                    OutputFormat::Human => {
                        println!("{file}: invalid");
                        for issue in &errors {
                            println!("  {issue}");
                        }
                    }
                    OutputFormat::Json => {
                        let issues: Vec<_> = errors
                            .iter()
                            .map(|i| {
                                json!({
                                    "path": i.path,
                                    "message": i.message,
                                    "severity": match i.severity {
                                        Severity::Error => "error",
                                        Severity::Warning => "warning",
                                    },
                                })
                            })
                            .collect();
                        let report = json!({
                            "file": file,
                            "valid": false,
                            "issues": issues,
                        });
                        println!("{report}");
                    }
                }
                return Err(ConfigError::ValidationError { path: file, errors }.into());
            }
            Err(other) => return Err(other.into()),
        }
    }

    Ok(())
}
