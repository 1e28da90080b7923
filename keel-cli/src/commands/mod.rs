//! CLI command implementations.

pub mod apply;
pub mod plan;
pub mod reap;
pub mod uninstall;

use crate::config::Context;
use crate::output;

/// Print where a command is about to work.
fn print_target(ctx: &Context, prefix: &str) {
    output::kv("Database", ctx.provider.as_str());
    output::kv(
        "Namespace",
        if prefix.is_empty() { "(none)" } else { prefix },
    );
    output::newline();
}
