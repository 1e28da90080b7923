//! Integration tests for diffing, planning and reaping without a database.
//!
//! These tests drive the public API end to end against in-memory snapshots
//! and the PostgreSQL statement generator.

use std::collections::BTreeSet;

use keel::migrate::{
    MigrationPlanner, PlanError, PostgresSqlGenerator, diff, drop_delta, find_obsolete,
};
use keel::schema::{
    Catalog, ColumnDefinition, ColumnType, EntityCatalog, ForeignKeyDefinition, SchemaSnapshot,
    TableDefinition,
};
use pretty_assertions::assert_eq;

fn table(name: &str, columns: &[&str]) -> TableDefinition {
    let mut builder = TableDefinition::builder(name)
        .column(ColumnDefinition::new("id", ColumnType::Integer).auto_increment());
    for column in columns {
        builder = builder.column(ColumnDefinition::new(*column, ColumnType::Text).nullable(true));
    }
    builder.primary_key(["id"]).build().unwrap()
}

fn with_reference(name: &str, target: &str) -> TableDefinition {
    TableDefinition::builder(name)
        .column(ColumnDefinition::new("id", ColumnType::Integer).auto_increment())
        .column(ColumnDefinition::new("target_id", ColumnType::Integer))
        .primary_key(["id"])
        .foreign_key(ForeignKeyDefinition::new(
            format!("fk_{name}_target"),
            ["target_id"],
            target,
            ["id"],
        ))
        .build()
        .unwrap()
}

fn statements(desired: &[TableDefinition], actual: &SchemaSnapshot) -> Vec<String> {
    let delta = diff(desired, actual);
    MigrationPlanner::new(&PostgresSqlGenerator, actual)
        .plan(&delta)
        .unwrap()
        .statements()
}

/// Test a new table yields one CREATE TABLE
#[test]
fn test_new_table_is_created() {
    let desired = vec![table("A", &["name"])];
    let delta = diff(&desired, &SchemaSnapshot::empty());
    assert_eq!(delta.new_tables.len(), 1);
    assert_eq!(delta.new_tables[0].name, "A");

    let stmts = statements(&desired, &SchemaSnapshot::empty());
    assert_eq!(stmts.len(), 1);
    assert!(stmts[0].starts_with("CREATE TABLE \"A\" ("));
}

/// Test a new column yields one ALTER TABLE ADD COLUMN
#[test]
fn test_added_column_is_altered() {
    let actual = SchemaSnapshot::from_tables([table("A", &["name"])]).unwrap();
    let desired = vec![table("A", &["name", "email"])];

    let delta = diff(&desired, &actual);
    assert!(delta.new_tables.is_empty());
    assert_eq!(delta.changed_tables.len(), 1);
    assert_eq!(delta.changed_tables[0].added_columns[0].name, "email");

    assert_eq!(
        statements(&desired, &actual),
        vec!["ALTER TABLE \"A\" ADD COLUMN \"email\" TEXT;"]
    );
}

/// Test identical schemas produce no delta and no statements
#[test]
fn test_identical_schema_is_a_no_op() {
    let desired = vec![table("A", &["name"]), with_reference("B", "A")];
    let actual = SchemaSnapshot::from_tables(desired.clone()).unwrap();

    assert!(diff(&desired, &actual).is_empty());
    assert!(statements(&desired, &actual).is_empty());
}

/// Test referenced tables are created before their referrers
#[test]
fn test_creates_follow_references() {
    // Catalog order puts the referrer first.
    let desired = vec![with_reference("Posts", "Users"), table("Users", &["name"])];
    let stmts = statements(&desired, &SchemaSnapshot::empty());

    let users = stmts
        .iter()
        .position(|s| s.starts_with("CREATE TABLE \"Users\""))
        .unwrap();
    let posts = stmts
        .iter()
        .position(|s| s.starts_with("CREATE TABLE \"Posts\""))
        .unwrap();
    assert!(users < posts);
}

/// Test a reference to a table that will never exist is rejected
#[test]
fn test_unknown_reference_is_rejected() {
    let desired = vec![with_reference("Posts", "Missing")];
    let delta = diff(&desired, &SchemaSnapshot::empty());
    let err = MigrationPlanner::new(&PostgresSqlGenerator, &SchemaSnapshot::empty())
        .plan(&delta)
        .unwrap_err();
    assert!(matches!(err, PlanError::UnknownReference { .. }));
}

/// Test the reaper only selects prefixed tables the catalog no longer knows
#[test]
fn test_reaper_respects_prefix_and_known_names() {
    let actual = SchemaSnapshot::from_tables([
        table("A", &[]),
        table("prefixB_Obsolete", &[]),
        table("prefixB_Kept", &[]),
        table("Other_Table", &[]),
    ])
    .unwrap();

    let catalog = Catalog::new("prefixB_")
        .with_table(table("A", &[]))
        .with_table(table("prefixB_Kept", &[]));
    let known = catalog.known_table_names().unwrap();

    let obsolete = find_obsolete(&actual, &known, catalog.namespace_prefix());
    assert_eq!(obsolete, BTreeSet::from(["prefixB_Obsolete".to_string()]));
}

/// Test dropping a referenced table detaches surviving referrers first
#[test]
fn test_drop_detaches_survivors() {
    let actual =
        SchemaSnapshot::from_tables([table("AcmeOld", &[]), with_reference("Users", "AcmeOld")])
            .unwrap();
    let names = BTreeSet::from(["AcmeOld".to_string()]);

    let delta = drop_delta(&actual, &names);
    assert_eq!(delta.dropped_tables.len(), 1);
    assert_eq!(delta.changed_tables.len(), 1);
    assert_eq!(delta.changed_tables[0].table, "Users");

    let stmts = MigrationPlanner::new(&PostgresSqlGenerator, &actual)
        .plan(&delta)
        .unwrap()
        .statements();
    assert_eq!(
        stmts,
        vec![
            "ALTER TABLE \"Users\" DROP CONSTRAINT \"fk_Users_target\";",
            "DROP TABLE \"AcmeOld\";",
        ]
    );
}
