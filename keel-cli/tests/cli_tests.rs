//! Integration tests for the Keel CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CATALOG: &str = r#"
package = "acme_blog"

[[table]]
name = "AcmeBlogAuthors"
primary_key = ["id"]

[[table.column]]
name = "id"
type = "integer"
auto_increment = true

[[table.column]]
name = "name"
type = "string"
length = 100

[[table]]
name = "AcmeBlogPosts"
primary_key = ["id"]

[[table.column]]
name = "id"
type = "integer"
auto_increment = true

[[table.column]]
name = "author_id"
type = "integer"

[[table.foreign_key]]
name = "fk_posts_author"
columns = ["author_id"]
references = { table = "AcmeBlogAuthors", columns = ["id"] }
"#;

/// Get the keel binary
#[allow(deprecated)]
fn keel_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("keel").unwrap();
    cmd.current_dir(dir)
        .env_remove("KEEL_CONFIG")
        .env_remove("KEEL_DATABASE_URL")
        .env_remove("RUST_LOG");
    cmd
}

/// Write a project with a file-backed SQLite database.
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("keel.toml"),
        r#"
[package]
catalog = "catalog.toml"

[database]
url = "sqlite://app.db"

[log]
level = "warn"
"#,
    )
    .unwrap();
    fs::write(dir.path().join("catalog.toml"), CATALOG).unwrap();
    dir
}

#[test]
fn test_help_command() {
    let dir = TempDir::new().unwrap();
    keel_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: keel"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("reap"))
        .stdout(predicate::str::contains("uninstall"));
}

#[test]
fn test_missing_url_fails() {
    let dir = TempDir::new().unwrap();
    keel_cmd(dir.path())
        .arg("plan")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no database URL"));
}

#[test]
fn test_plan_lists_statements_without_running_them() {
    let dir = project();

    keel_cmd(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("AcmeBlogAuthors"))
        .stdout(predicate::str::contains("CREATE TABLE \"AcmeBlogPosts\""))
        .stdout(predicate::str::contains("Would run 2 statements"));

    // Planning again still wants both tables.
    keel_cmd(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would run 2 statements"));
}

#[test]
fn test_apply_then_plan_is_up_to_date() {
    let dir = project();

    keel_cmd(dir.path())
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 created"));

    keel_cmd(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Schema is up to date"));
}

#[test]
fn test_apply_dry_run() {
    let dir = project();

    keel_cmd(dir.path())
        .args(["apply", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would run"));

    keel_cmd(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would run 2 statements"));
}

#[test]
fn test_reap_drops_obsolete_tables() {
    let dir = project();
    keel_cmd(dir.path()).arg("apply").assert().success();

    // Drop the posts table from the catalog.
    let shrunk = CATALOG
        .split("[[table]]\nname = \"AcmeBlogPosts\"")
        .next()
        .unwrap()
        .to_string();
    fs::write(dir.path().join("catalog.toml"), shrunk).unwrap();

    keel_cmd(dir.path())
        .arg("reap")
        .assert()
        .success()
        .stdout(predicate::str::contains("DROP TABLE \"AcmeBlogPosts\""))
        .stdout(predicate::str::contains("1 dropped"));

    keel_cmd(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Schema is up to date"));
}

#[test]
fn test_uninstall() {
    let dir = project();
    keel_cmd(dir.path()).arg("apply").assert().success();

    keel_cmd(dir.path())
        .args(["uninstall", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 dropped"));

    keel_cmd(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would run 2 statements"));
}

#[test]
fn test_invalid_catalog_touches_nothing() {
    let dir = project();
    fs::write(
        dir.path().join("catalog.toml"),
        "[[table]]\nname = \"AcmeBlogBroken\"\nprimary_key = [\"missing\"]\n",
    )
    .unwrap();

    keel_cmd(dir.path()).arg("apply").assert().failure().code(1);
    assert!(!dir.path().join("app.db").exists());
}
