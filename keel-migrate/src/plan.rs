//! Dependency-ordered migration planning.
//!
//! The planner turns a [`SchemaDelta`] into statements that can run one at a
//! time without violating foreign keys:
//!
//! 1. Every operation is checked against a virtual copy of the schema.
//! 2. Operations whose preconditions hold are scheduled and applied to the
//!    virtual schema; the rest wait for the next pass.
//! 3. When a pass makes no progress the remaining operations either form a
//!    reference cycle, which is broken, or cannot succeed at all, which is an
//!    error.
//!
//! ```text
//! -- This fails:
//! CREATE TABLE "posts" (... REFERENCES "users" ("id"));  -- "users" doesn't exist!
//! CREATE TABLE "users" (...);
//!
//! -- This works:
//! CREATE TABLE "users" (...);
//! CREATE TABLE "posts" (... REFERENCES "users" ("id"));
//! ```

use std::collections::{BTreeSet, HashMap};

use keel_schema::{ColumnDefinition, ForeignKeyDefinition, SchemaSnapshot, TableDefinition};
use tracing::debug;

use crate::diff::{SchemaDelta, TableDiff};
use crate::error::PlanError;
use crate::sql::SqlGenerator;

/// One scheduled operation and the statements it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub description: String,
    pub statements: Vec<String>,
}

/// Ordered statements for a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    pub steps: Vec<PlannedStep>,
}

impl MigrationPlan {
    /// Create an empty plan.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All statements in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|s| s.statements.iter().cloned())
            .collect()
    }

    /// Check if the plan does nothing.
    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(|s| s.statements.is_empty())
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.steps.iter().map(|s| s.statements.len()).sum()
    }

    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            "Nothing to do".to_string()
        } else {
            format!("{} steps, {} statements", self.steps.len(), self.len())
        }
    }
}

/// Orders a delta against the schema it will run on.
pub struct MigrationPlanner<'a> {
    generator: &'a dyn SqlGenerator,
    actual: &'a SchemaSnapshot,
}

impl<'a> MigrationPlanner<'a> {
    /// Create a planner for deltas computed against `actual`.
    pub fn new(generator: &'a dyn SqlGenerator, actual: &'a SchemaSnapshot) -> Self {
        Self { generator, actual }
    }

    /// Order `delta` so that every statement's references exist when it runs.
    ///
    /// Fails before producing any statement if a foreign key targets a table
    /// or column that will never exist, or if a dropped table is still
    /// referenced by a table that survives.
    pub fn plan(&self, delta: &SchemaDelta) -> Result<MigrationPlan, PlanError> {
        let mut pending: Vec<Operation> = delta
            .new_tables
            .iter()
            .cloned()
            .map(Operation::Create)
            .chain(delta.changed_tables.iter().cloned().map(Operation::Alter))
            .chain(delta.dropped_tables.iter().cloned().map(Operation::Drop))
            .collect();

        let mut schema = VirtualSchema::new(self.actual, self.generator);
        let mut plan = MigrationPlan::empty();

        while !pending.is_empty() {
            let mut progressed = false;
            let mut i = 0;
            while i < pending.len() {
                if schema.can_apply(&pending[i]) {
                    let op = pending.remove(i);
                    self.schedule(&op, false, &mut schema, &mut plan);
                    progressed = true;
                } else {
                    i += 1;
                }
            }

            if !progressed {
                self.break_deadlock(&mut pending, &mut schema, &mut plan)?;
            }
        }

        debug!(summary = %plan.summary(), "Planned migration");
        Ok(plan)
    }

    fn schedule(
        &self,
        op: &Operation,
        in_cycle: bool,
        schema: &mut VirtualSchema,
        plan: &mut MigrationPlan,
    ) {
        let step = match op {
            Operation::Create(table) => PlannedStep {
                description: format!("Create table {}", table.name),
                statements: self.generator.create_table(table),
            },
            Operation::Alter(diff) => PlannedStep {
                description: format!("Alter table {} ({})", diff.table, diff.summary()),
                statements: self.generator.alter_table(diff),
            },
            Operation::Drop(table) => PlannedStep {
                description: format!("Drop table {}", table.name),
                statements: if in_cycle {
                    self.generator.drop_table_in_cycle(&table.name)
                } else {
                    vec![self.generator.drop_table(&table.name)]
                },
            },
            Operation::AddForeignKeys { table, foreign_keys } => PlannedStep {
                description: format!("Add foreign keys to {table}"),
                statements: foreign_keys
                    .iter()
                    .filter_map(|fk| self.generator.add_foreign_key(table, fk))
                    .collect(),
            },
        };
        debug!(step = %step.description, in_cycle, "Scheduled");
        schema.apply(op);
        plan.steps.push(step);
    }

    /// Make progress when no pending operation can run as is.
    fn break_deadlock(
        &self,
        pending: &mut Vec<Operation>,
        schema: &mut VirtualSchema,
        plan: &mut MigrationPlan,
    ) -> Result<(), PlanError> {
        let pending_creates: BTreeSet<&str> = pending
            .iter()
            .filter_map(|op| match op {
                Operation::Create(t) => Some(t.name.as_str()),
                _ => None,
            })
            .collect();

        // New tables waiting on each other: create one without the offending
        // keys and add them once the targets exist.
        let blocked_on_creates = pending.iter().position(|op| {
            matches!(op, Operation::Create(_) | Operation::Alter(_)) && {
                let unmet = schema.unmet_references(op);
                !unmet.is_empty()
                    && unmet.iter().all(|fk| {
                        fk.referenced_table != op.table()
                            && pending_creates.contains(fk.referenced_table.as_str())
                    })
            }
        });

        if let Some(index) = blocked_on_creates {
            let deferred: Vec<ForeignKeyDefinition> = schema
                .unmet_references(&pending[index])
                .into_iter()
                .cloned()
                .collect();
            let table = pending[index].table().to_string();
            let can_add_later = deferred
                .iter()
                .all(|fk| self.generator.add_foreign_key(&table, fk).is_some());

            if can_add_later {
                debug!(table = %table, count = deferred.len(), "Deferring foreign keys");
                let op = pending.remove(index);
                pending.insert(index, op.without_foreign_keys(&deferred));
                pending.push(Operation::AddForeignKeys {
                    table,
                    foreign_keys: deferred,
                });
            } else {
                // Constraints are only enforced on data, so the table can be
                // created before its targets.
                let op = pending.remove(index);
                self.schedule(&op, true, schema, plan);
            }
            return Ok(());
        }

        let pending_drops: BTreeSet<&str> = pending
            .iter()
            .filter_map(|op| match op {
                Operation::Drop(t) => Some(t.name.as_str()),
                _ => None,
            })
            .collect();

        // Obsolete tables referencing each other.
        let blocked_on_drops = pending.iter().position(|op| {
            matches!(op, Operation::Drop(_)) && {
                let referrers = schema.referrers(op.table());
                referrers.iter().all(|r| pending_drops.contains(r.as_str()))
            }
        });

        if let Some(index) = blocked_on_drops {
            let target = pending[index].table().to_string();
            let detach: Vec<(String, Vec<ForeignKeyDefinition>)> = schema
                .referrers(&target)
                .into_iter()
                .map(|r| {
                    let fks = schema.references_between(&r, &target);
                    (r, fks)
                })
                .collect();
            let can_detach = detach.iter().all(|(r, fks)| {
                fks.iter()
                    .all(|fk| self.generator.drop_foreign_key(r, fk).is_some())
            });

            if can_detach {
                for (referrer, fks) in detach {
                    let statements = fks
                        .iter()
                        .filter_map(|fk| self.generator.drop_foreign_key(&referrer, fk))
                        .collect();
                    debug!(table = %referrer, target = %target, "Detaching foreign keys");
                    plan.steps.push(PlannedStep {
                        description: format!("Drop foreign keys from {referrer}"),
                        statements,
                    });
                    schema.remove_references(&referrer, &fks);
                }
            } else {
                let op = pending.remove(index);
                self.schedule(&op, true, schema, plan);
            }
            return Ok(());
        }

        Err(self.diagnose(pending, schema))
    }

    /// Explain why nothing in `pending` can run.
    fn diagnose(&self, pending: &[Operation], schema: &VirtualSchema) -> PlanError {
        let will_exist = |table: &str| {
            schema.tables.contains_key(table)
                || pending
                    .iter()
                    .any(|op| matches!(op, Operation::Create(t) if t.name == table))
        };
        let will_have_column = |table: &str, column: &str| {
            schema
                .tables
                .get(table)
                .is_some_and(|t| t.columns.contains(column))
                || pending.iter().any(|op| match op {
                    Operation::Create(t) => t.name == table && t.has_column(column),
                    Operation::Alter(d) => d.table == table && d.after.has_column(column),
                    _ => false,
                })
        };

        for op in pending {
            if let Operation::Drop(table) = op {
                let blocker = schema.referrers(&table.name).into_iter().find(|r| {
                    let dropping = pending
                        .iter()
                        .any(|o| matches!(o, Operation::Drop(t) if &t.name == r));
                    let detaching = pending.iter().any(|o| {
                        matches!(o, Operation::Alter(d) if &d.table == r
                            && !d.after.references(&table.name))
                    });
                    !dropping && !detaching
                });
                if let Some(referenced_by) = blocker {
                    return PlanError::DropBlocked {
                        table: table.name.clone(),
                        referenced_by,
                    };
                }
                continue;
            }

            if let Operation::Alter(diff) = op {
                // A referrer only unblocks by going away or by dropping the key.
                let blocker = schema.column_referrers(diff).into_iter().find(|r| {
                    !pending.iter().any(|o| match o {
                        Operation::Drop(t) => t.name == r.referenced_by,
                        Operation::Alter(d) => {
                            d.table == r.referenced_by
                                && !d.after.foreign_keys.iter().any(|fk| {
                                    fk.referenced_table == diff.table
                                        && fk.referenced_columns.contains(&r.column)
                                })
                        }
                        _ => false,
                    })
                });
                if let Some(r) = blocker {
                    let column = format!("{}.{}", diff.table, r.column);
                    return if r.removed {
                        PlanError::DropBlocked {
                            table: column,
                            referenced_by: r.referenced_by,
                        }
                    } else {
                        PlanError::ReferencedColumnChanged {
                            column,
                            referenced_by: r.referenced_by,
                        }
                    };
                }
            }

            let own_columns = op.own_columns();
            for fk in schema.unmet_references(op) {
                let is_self = fk.referenced_table == op.table();
                if !is_self && !will_exist(fk.referenced_table.as_str()) {
                    return PlanError::UnknownReference {
                        table: op.table().to_string(),
                        constraint: fk.name.clone(),
                        referenced_table: fk.referenced_table.clone(),
                    };
                }
                let missing = fk.referenced_columns.iter().find(|c| {
                    let own = is_self
                        && own_columns.is_some_and(|cols| cols.iter().any(|oc| &oc.name == *c));
                    !own && !will_have_column(fk.referenced_table.as_str(), c.as_str())
                });
                if let Some(column) = missing {
                    return PlanError::UnknownReferencedColumn {
                        table: op.table().to_string(),
                        constraint: fk.name.clone(),
                        referenced_table: fk.referenced_table.clone(),
                        column: column.clone(),
                    };
                }
            }
        }

        let mut tables: Vec<String> = Vec::new();
        for op in pending {
            if !tables.iter().any(|t| t == op.table()) {
                tables.push(op.table().to_string());
            }
        }
        PlanError::CycleDetected { tables }
    }
}

/// A unit of scheduling.
#[derive(Debug, Clone)]
enum Operation {
    Create(TableDefinition),
    Alter(TableDiff),
    Drop(TableDefinition),
    AddForeignKeys {
        table: String,
        foreign_keys: Vec<ForeignKeyDefinition>,
    },
}

impl Operation {
    fn table(&self) -> &str {
        match self {
            Self::Create(t) | Self::Drop(t) => &t.name,
            Self::Alter(d) => &d.table,
            Self::AddForeignKeys { table, .. } => table,
        }
    }

    /// Foreign keys whose targets must exist before this runs.
    fn required_references(&self) -> &[ForeignKeyDefinition] {
        match self {
            Self::Create(t) => &t.foreign_keys,
            Self::Alter(d) => &d.added_foreign_keys,
            Self::AddForeignKeys { foreign_keys, .. } => foreign_keys,
            Self::Drop(_) => &[],
        }
    }

    /// Columns the table has once this ran, when not yet in the virtual schema.
    fn own_columns(&self) -> Option<&[ColumnDefinition]> {
        match self {
            Self::Create(t) => Some(&t.columns),
            Self::Alter(d) => Some(&d.after.columns),
            _ => None,
        }
    }

    fn without_foreign_keys(self, deferred: &[ForeignKeyDefinition]) -> Self {
        let keep = |fk: &ForeignKeyDefinition| !deferred.iter().any(|d| d.name == fk.name);
        match self {
            Self::Create(mut table) => {
                table.foreign_keys.retain(keep);
                Self::Create(table)
            }
            Self::Alter(mut diff) => {
                diff.added_foreign_keys.retain(keep);
                diff.after.foreign_keys.retain(keep);
                Self::Alter(diff)
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
struct VirtualTable {
    columns: BTreeSet<String>,
    foreign_keys: Vec<ForeignKeyDefinition>,
}

impl From<&TableDefinition> for VirtualTable {
    fn from(table: &TableDefinition) -> Self {
        Self {
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            foreign_keys: table.foreign_keys.clone(),
        }
    }
}

/// A foreign key that keeps an Alter from running.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ColumnReferrer {
    referenced_by: String,
    column: String,
    /// The Alter removes the column rather than changing it.
    removed: bool,
}

/// The schema as it will be after the operations scheduled so far.
#[derive(Debug, Clone)]
struct VirtualSchema {
    tables: HashMap<String, VirtualTable>,
    type_change_keeps_references: bool,
}

impl VirtualSchema {
    fn new(snapshot: &SchemaSnapshot, generator: &dyn SqlGenerator) -> Self {
        Self {
            tables: snapshot
                .tables()
                .map(|t| (t.name.clone(), VirtualTable::from(t)))
                .collect(),
            type_change_keeps_references: generator.type_change_keeps_references(),
        }
    }

    fn reference_satisfied(&self, op: &Operation, fk: &ForeignKeyDefinition) -> bool {
        if fk.referenced_table == op.table() {
            if let Some(columns) = op.own_columns() {
                return fk
                    .referenced_columns
                    .iter()
                    .all(|c| columns.iter().any(|own| &own.name == c));
            }
        }
        self.tables.get(&fk.referenced_table).is_some_and(|t| {
            fk.referenced_columns
                .iter()
                .all(|c| t.columns.contains(c))
        })
    }

    fn unmet_references<'o>(&self, op: &'o Operation) -> Vec<&'o ForeignKeyDefinition> {
        op.required_references()
            .iter()
            .filter(|fk| !self.reference_satisfied(op, fk))
            .collect()
    }

    /// Other tables with a foreign key to `table`, sorted.
    fn referrers(&self, table: &str) -> Vec<String> {
        let mut referrers: Vec<String> = self
            .tables
            .iter()
            .filter(|(name, t)| {
                name.as_str() != table && t.foreign_keys.iter().any(|fk| fk.referenced_table == table)
            })
            .map(|(name, _)| name.clone())
            .collect();
        referrers.sort();
        referrers
    }

    fn references_between(&self, from: &str, to: &str) -> Vec<ForeignKeyDefinition> {
        self.tables
            .get(from)
            .map(|t| {
                t.foreign_keys
                    .iter()
                    .filter(|fk| fk.referenced_table == to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove_references(&mut self, table: &str, fks: &[ForeignKeyDefinition]) {
        if let Some(t) = self.tables.get_mut(table) {
            t.foreign_keys
                .retain(|fk| !fks.iter().any(|d| d.name == fk.name));
        }
    }

    /// Foreign keys on other tables that `diff` would break while they exist:
    /// keys on a removed column, on a primary key that is replaced, or on a
    /// column whose type changes where the dialect checks referrers.
    fn column_referrers(&self, diff: &TableDiff) -> Vec<ColumnReferrer> {
        let mut disturbed: Vec<(&str, bool)> = diff
            .removed_columns
            .iter()
            .map(|c| (c.name.as_str(), true))
            .collect();
        if !self.type_change_keeps_references {
            disturbed.extend(
                diff.modified_columns
                    .iter()
                    .filter(|c| c.type_changed())
                    .map(|c| (c.name(), false)),
            );
        }
        if diff.primary_key.is_some() {
            disturbed.extend(diff.before.primary_key.iter().map(|c| (c.as_str(), false)));
        }

        let mut blocked = Vec::new();
        for (name, t) in &self.tables {
            if name == &diff.table {
                continue;
            }
            for fk in t.foreign_keys.iter().filter(|fk| fk.referenced_table == diff.table) {
                let hit = disturbed
                    .iter()
                    .find(|(column, _)| fk.referenced_columns.iter().any(|r| r == column));
                if let Some((column, removed)) = hit {
                    blocked.push(ColumnReferrer {
                        referenced_by: name.clone(),
                        column: column.to_string(),
                        removed: *removed,
                    });
                }
            }
        }
        blocked.sort();
        blocked.dedup();
        blocked
    }

    fn can_apply(&self, op: &Operation) -> bool {
        match op {
            Operation::Drop(table) => self.referrers(&table.name).is_empty(),
            Operation::Alter(diff) => {
                self.unmet_references(op).is_empty() && self.column_referrers(diff).is_empty()
            }
            _ => self.unmet_references(op).is_empty(),
        }
    }

    fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Create(table) => {
                self.tables.insert(table.name.clone(), VirtualTable::from(table));
            }
            Operation::Alter(diff) => {
                self.tables
                    .insert(diff.table.clone(), VirtualTable::from(&diff.after));
            }
            Operation::Drop(table) => {
                self.tables.remove(&table.name);
            }
            Operation::AddForeignKeys {
                table,
                foreign_keys,
            } => {
                if let Some(t) = self.tables.get_mut(table) {
                    t.foreign_keys.extend(foreign_keys.iter().cloned());
                }
            }
        }
    }
}
