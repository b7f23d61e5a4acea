//! The `rules` command: list registered victory rules.

use serde_json::json;

use crate::cli::args::{OutputFormat, RulesArgs};
use crate::victory::VictoryRegistry;

/// Prints the built-in victory rule identifiers.
pub fn run(args: &RulesArgs) {
    let names = VictoryRegistry::with_builtins().rule_names();
    match args.format {
        OutputFormat::Human => {
            for name in names {
                println!("{name}");
            }
        }
        OutputFormat::Json => {
            println!("{}", json!({ "rules": names }));
        }
    }
}
