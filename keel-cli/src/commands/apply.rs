//! `keel apply` - reconcile the database with the catalog.

use keel_migrate::Reconciler;
use keel_schema::EntityCatalog;

use super::print_target;
use crate::cli::ApplyArgs;
use crate::config::Context;
use crate::error::CliResult;
use crate::output;

/// Run the apply command
pub async fn run(ctx: &Context, args: ApplyArgs) -> CliResult<()> {
    output::header("Apply");

    let catalog = ctx.catalog()?;
    print_target(ctx, catalog.namespace_prefix());

    let settings = &ctx.config.reconcile;
    let config = ctx
        .reconcile_config()
        .drop_obsolete(settings.drop_obsolete && !args.keep_obsolete)
        .dry_run(settings.dry_run || args.dry_run);

    let mut conn = ctx.connect().await?;
    let report = Reconciler::with_config(catalog, config)
        .reconcile(&mut *conn)
        .await?;

    output::report(&report);
    Ok(())
}
