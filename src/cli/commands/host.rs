//! The `run` command: bring up the arena host and hold it until shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::args::RunArgs;
use crate::config;
use crate::error::ArenadError;
use crate::event::EventBus;
use crate::manager::ArenaManager;
use crate::observability::{init_metrics, EventEmitter, JsonlEventLog};
use crate::victory::VictoryRegistry;

/// Runs the arena host until the cancellation token fires.
///
/// # Errors
///
/// Returns a config error if the template configuration cannot be loaded,
/// or a template error if registration or prewarming fails.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), ArenadError> {
    init_metrics();

    let rules = Arc::new(VictoryRegistry::with_builtins());
    info!(config = %args.config.display(), "loading configuration");
    let loaded = config::load(&args.config, &rules)?;

    let bus = Arc::new(EventBus::new());
    let emitter = match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::stderr(),
    };
    JsonlEventLog::install(&bus, emitter);

    let manager = Arc::new(ArenaManager::new(bus, rules));
    manager.load_config(loaded)?;
    info!(
        templates = manager.template_names().len(),
        "arena host ready"
    );

    if args.prewarm {
        for name in manager.template_names() {
            let arena = manager.create_instance(&name)?;
            info!(template = %name, arena = %arena.id(), "prewarmed instance");
        }
    }

    cancel.cancelled().await;
    info!("shutting down arena host");
    manager.shutdown();
    Ok(())
}
