//! CLI command dispatch and handlers.
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod host;
pub mod rules;
pub mod validate;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands};
use crate::error::ArenadError;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), ArenadError> {
    match cli.command {
        Commands::Run(args) => host::run(&args, cancel).await,
        Commands::Validate(args) => validate::run(&args),
        Commands::Rules(args) => {
            rules::run(&args);
            Ok(())
        }
    }
}
