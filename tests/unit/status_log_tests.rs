//! Unit tests for the markdown status log.

use std::fs;

use agent_vault::status_log::markdown::ACTIVITY_MARKER;
use agent_vault::status_log::{MarkdownStatusLog, StatusEntry, StatusLog};

#[test]
fn first_append_creates_dashboard() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = MarkdownStatusLog::new(dir.path().join("Dashboard.md"));

    log.append(&StatusEntry::success("promoted a.md")).expect("append");

    let doc = fs::read_to_string(log.path()).expect("read");
    assert!(doc.starts_with("# Agent Vault Dashboard"));
    assert!(doc.contains(ACTIVITY_MARKER));
    assert!(doc.contains("| promoted a.md | success |"));
}

#[test]
fn newest_row_is_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = MarkdownStatusLog::new(dir.path().join("Dashboard.md"));
    log.append(&StatusEntry::success("first")).expect("append");
    log.append(&StatusEntry::failure("second", "boom")).expect("append");

    let doc = fs::read_to_string(log.path()).expect("read");
    let second = doc.find("| second | error: boom |").expect("second row");
    let first = doc.find("| first | success |").expect("first row");
    assert!(second < first);
}

#[test]
fn existing_content_is_preserved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("Dashboard.md");
    fs::write(
        &path,
        "# My Notes\n\n**Last Updated**: 2020-01-01\n\nKeep this paragraph.\n",
    )
    .expect("write");
    let log = MarkdownStatusLog::new(path.clone());

    log.append(&StatusEntry::success("executed x.md").with_detail("sent"))
        .expect("append");

    let doc = fs::read_to_string(path).expect("read");
    assert!(doc.contains("Keep this paragraph."));
    assert!(!doc.contains("2020-01-01"));
    assert!(doc.contains("## Recent Activity"));
    assert!(doc.contains("| executed x.md | success: sent |"));
}

#[test]
fn unwritable_location_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = MarkdownStatusLog::new(dir.path().join("missing").join("Dashboard.md"));
    assert!(log.append(&StatusEntry::success("x")).is_err());
}
