//! Metrics collection for `arenad`.
//!
//! Thin typed wrappers over the `metrics` facade. Without an installed
//! recorder every call is a silent no-op, so the core records
//! unconditionally and the host decides whether anything listens.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::arena::Phase;
use crate::ids::ModuleId;

/// Guard to prevent double-registration of metric descriptions.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Maximum length for labels derived from configuration values.
///
/// Template names come from user config and are used directly as labels;
/// this caps them to keep cardinality bounded.
const MAX_LABEL_LEN: usize = 64;

/// Registers metric descriptions with the global recorder. Idempotent.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return;
    }
    describe_counter!(
        "arenad_phase_transitions_total",
        "Total number of lifecycle phase transitions"
    );
    describe_counter!("arenad_joins_total", "Total number of accepted joins");
    describe_counter!(
        "arenad_handler_failures_total",
        "Total number of contained event handler failures"
    );
    describe_gauge!(
        "arenad_active_instances",
        "Number of arena instances currently registered"
    );
}

/// Records one lifecycle transition.
pub fn record_transition(from: Phase, to: Phase, forced: bool) {
    counter!(
        "arenad_phase_transitions_total",
        "from" => from.to_string(),
        "to" => to.to_string(),
        "forced" => if forced { "true" } else { "false" },
    )
    .increment(1);
}

/// Records one accepted join, labelled by template.
pub fn record_join(template: &str) {
    counter!("arenad_joins_total", "template" => sanitize_label(template)).increment(1);
}

/// Records one contained handler failure, labelled by module.
pub fn record_handler_failure(module: &ModuleId) {
    counter!(
        "arenad_handler_failures_total",
        "module" => sanitize_label(&module.0)
    )
    .increment(1);
}

/// Sets the active-instance gauge.
#[allow(clippy::cast_precision_loss)]
pub fn record_active_instances(count: usize) {
    gauge!("arenad_active_instances").set(count as f64);
}

/// Sanitizes a configuration-derived string for use as a label.
///
/// Truncates to [`MAX_LABEL_LEN`] characters and replaces characters
/// invalid in Prometheus-style labels with underscores.
fn sanitize_label(name: &str) -> String {
    name.chars()
        .take(MAX_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_passes_clean_names() {
        assert_eq!(sanitize_label("duel-4v4"), "duel-4v4");
    }

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_label("duel:4v4 north"), "duel_4v4_north");
    }

    #[test]
    fn sanitize_truncates_long_names() {
        let long = "x".repeat(10_000);
        assert_eq!(sanitize_label(&long).len(), MAX_LABEL_LEN);
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // metrics macros silently no-op when no global recorder is installed
        init_metrics();
        init_metrics();
        record_transition(Phase::Waiting, Phase::Starting, false);
        record_join("duel");
        record_handler_failure(&ModuleId::from("scoreboard"));
        record_active_instances(3);
    }
}
