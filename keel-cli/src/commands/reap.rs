//! `keel reap` - drop namespace tables the catalog no longer declares.

use keel_migrate::Reconciler;
use keel_schema::EntityCatalog;

use super::print_target;
use crate::cli::ReapArgs;
use crate::config::Context;
use crate::error::CliResult;
use crate::output;

/// Run the reap command
pub async fn run(ctx: &Context, args: ReapArgs) -> CliResult<()> {
    output::header("Reap");

    let catalog = ctx.catalog()?;
    let prefix = catalog.namespace_prefix().to_string();
    print_target(ctx, &prefix);

    if prefix.is_empty() {
        output::warn("No namespace prefix configured; nothing is considered obsolete");
        return Ok(());
    }

    let config = ctx
        .reconcile_config()
        .dry_run(ctx.config.reconcile.dry_run || args.dry_run);

    let mut conn = ctx.connect().await?;
    let report = Reconciler::with_config(catalog, config)
        .reap(&mut *conn)
        .await?;

    output::report(&report);
    Ok(())
}
