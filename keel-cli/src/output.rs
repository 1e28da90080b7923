//! Styled terminal output utilities.

use keel_migrate::{MigrationError, ReconcileReport};
use owo_colors::OwoColorize;

/// Print a header/title
pub fn header(text: &str) {
    println!();
    println!("{}", text.bold().cyan());
    println!("{}", "─".repeat(text.chars().count()).dimmed());
    println!();
}

/// Print a section header
pub fn section(text: &str) {
    println!("{}", text.bold().white());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a success message
pub fn success(text: &str) {
    println!("{} {}", "✔".green().bold(), text.green());
}

/// Print an info message
pub fn info(text: &str) {
    println!("{} {}", "ℹ".blue().bold(), text);
}

/// Print a warning message
pub fn warn(text: &str) {
    println!("{} {}", "⚠".yellow().bold(), text.yellow());
}

/// Print an error message
pub fn error(text: &str) {
    eprintln!("{} {}", "✖".red().bold(), text.red());
}

/// Print a list item
pub fn list_item(text: &str) {
    println!("  {} {}", "•".dimmed(), text);
}

/// Print a numbered list item
pub fn numbered_item(number: usize, text: &str) {
    println!("  {}. {}", number.to_string().dimmed(), text);
}

/// Print a newline
pub fn newline() {
    println!();
}

/// Print dimmed text
pub fn dim(text: &str) {
    println!("{}", text.dimmed());
}

/// Print SQL, one statement per block
pub fn sql(statements: &[String]) {
    for (i, statement) in statements.iter().enumerate() {
        numbered_item(i + 1, "");
        for line in statement.lines() {
            println!("     {}", line.bright_white());
        }
    }
}

/// Ask for confirmation
pub fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};

    print!("{} {} ", prompt, "[y/N]".dimmed());
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print the tables touched by a run and its statements.
pub fn report(report: &ReconcileReport) {
    if !report.has_changes() {
        success(&report.summary());
        return;
    }

    for (label, tables) in [
        ("Dropped", &report.dropped_tables),
        ("Created", &report.created_tables),
        ("Altered", &report.altered_tables),
    ] {
        if tables.is_empty() {
            continue;
        }
        section(label);
        for table in tables {
            list_item(table);
        }
        newline();
    }

    section("Statements");
    sql(&report.statements);
    newline();

    if report.dry_run {
        info(&report.summary());
    } else {
        success(&report.summary());
    }
}

/// Print what ran before a failed statement and what never ran.
pub fn migration_failure(failure: &MigrationError) {
    applied_before_failure(&failure.applied);
    let skipped = failure.not_attempted();
    if skipped > 0 {
        eprintln!("{}", format!("{skipped} statement(s) not attempted.").dimmed());
    }
}

/// Print the statements that ran before a failure.
pub fn applied_before_failure(applied: &[String]) {
    eprintln!();
    if applied.is_empty() {
        eprintln!("{}", "No statements were applied.".dimmed());
        return;
    }
    eprintln!("{}", "Applied before the failure:".dimmed());
    for statement in applied {
        eprintln!("  {} {}", "•".dimmed(), statement.lines().next().unwrap_or_default());
    }
}
