//! `keel plan` - show what `keel apply` would run.

use keel_migrate::Reconciler;
use keel_schema::EntityCatalog;

use super::print_target;
use crate::cli::PlanArgs;
use crate::config::Context;
use crate::error::CliResult;
use crate::output;

/// Run the plan command
pub async fn run(ctx: &Context, args: PlanArgs) -> CliResult<()> {
    output::header("Plan");

    let catalog = ctx.catalog()?;
    print_target(ctx, catalog.namespace_prefix());

    let config = ctx
        .reconcile_config()
        .drop_obsolete(ctx.config.reconcile.drop_obsolete && !args.keep_obsolete);

    let mut conn = ctx.connect().await?;
    let report = Reconciler::with_config(catalog, config)
        .plan(&mut *conn)
        .await?;

    output::report(&report);
    Ok(())
}
