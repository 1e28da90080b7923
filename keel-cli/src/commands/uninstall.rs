//! `keel uninstall` - drop every catalog table.

use keel_migrate::Reconciler;
use keel_schema::EntityCatalog;

use super::print_target;
use crate::cli::UninstallArgs;
use crate::config::Context;
use crate::error::CliResult;
use crate::output;

/// Run the uninstall command
pub async fn run(ctx: &Context, args: UninstallArgs) -> CliResult<()> {
    output::header("Uninstall");

    let catalog = ctx.catalog()?;
    print_target(ctx, catalog.namespace_prefix());

    let dry_run = ctx.config.reconcile.dry_run || args.dry_run;
    if !dry_run && !args.yes {
        let count = catalog.known_table_names()?.len();
        output::warn(&format!("This drops up to {count} tables and all their data."));
        if !output::confirm("Continue?") {
            output::info("Uninstall cancelled");
            return Ok(());
        }
        output::newline();
    }

    let config = ctx.reconcile_config().dry_run(dry_run);

    let mut conn = ctx.connect().await?;
    let report = Reconciler::with_config(catalog, config)
        .uninstall(&mut *conn)
        .await?;

    output::report(&report);
    Ok(())
}
