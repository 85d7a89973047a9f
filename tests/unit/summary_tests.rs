//! Unit tests for weekly summary scheduling and rendering.

use std::fs;

use agent_vault::models::{FrontMatter, Queue, TaskRecord};
use agent_vault::orchestrator::summary::{write_summary, WeeklySchedule};
use agent_vault::vault::Vault;
use agent_vault::AppError;
use chrono::{Datelike, TimeZone, Timelike, Utc, Weekday};

#[test]
fn schedule_parses_short_and_long_weekdays() {
    assert_eq!(WeeklySchedule::parse("sun", "23:00").expect("short").weekday, Weekday::Sun);
    assert_eq!(WeeklySchedule::parse("Monday", "08:15").expect("long").weekday, Weekday::Mon);
    assert!(matches!(WeeklySchedule::parse("someday", "08:00"), Err(AppError::Config(_))));
    assert!(matches!(WeeklySchedule::parse("sun", "8pm"), Err(AppError::Config(_))));
}

#[test]
fn next_run_later_the_same_day() {
    let schedule = WeeklySchedule::parse("thu", "23:00").expect("schedule");
    // 2026-01-15 is a Thursday.
    let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).single().expect("now");
    let next = schedule.next_after(now);
    assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).single().expect("next"));
}

#[test]
fn next_run_is_strictly_after_now() {
    let schedule = WeeklySchedule::parse("thu", "23:00").expect("schedule");
    let now = Utc.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).single().expect("now");
    assert_eq!(
        schedule.next_after(now),
        Utc.with_ymd_and_hms(2026, 1, 22, 23, 0, 0).single().expect("next")
    );
}

#[test]
fn next_run_wraps_the_week() {
    let schedule = WeeklySchedule::parse("mon", "06:30").expect("schedule");
    let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).single().expect("now");
    let next = schedule.next_after(now);
    assert_eq!(next.weekday(), Weekday::Mon);
    assert_eq!((next.hour(), next.minute()), (6, 30));
    assert_eq!(next.day(), 19);
}

#[test]
fn summary_counts_queues_and_recent_completions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = Vault::open(dir.path()).expect("open");
    vault.ensure_layout().expect("layout");
    let record = |name: &str| TaskRecord::new(name, FrontMatter::new().with("status", "done"), "\n");
    vault.create_task(&Queue::Done, &record("finished.md")).expect("done");
    vault.create_task(&Queue::Inbox, &record("new.md")).expect("inbox");

    let now = Utc::now();
    let path = write_summary(&vault, now).expect("summary");

    assert_eq!(
        path,
        vault
            .briefings_dir()
            .join(format!("{}_Weekly_Summary.md", now.format("%Y-%m-%d")))
    );
    let doc = fs::read_to_string(path).expect("read");
    assert!(doc.contains("type: weekly_summary"));
    assert!(doc.contains("- Inbox: 1\n"));
    assert!(doc.contains("- Done: 1\n"));
    assert!(doc.contains("- Approved: 0\n"));
    assert!(doc.contains("## Completed in the Last 7 Days (1)"));
    assert!(doc.contains("- finished.md ("));
}

#[test]
fn empty_week_lists_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = Vault::open(dir.path()).expect("open");
    vault.ensure_layout().expect("layout");
    let doc = fs::read_to_string(write_summary(&vault, Utc::now()).expect("summary")).expect("read");
    assert!(doc.contains("(0)\n- None\n"));
}
