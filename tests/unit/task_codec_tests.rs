//! Unit tests for the task record codec and typed envelope.
//!
//! # Scenarios covered
//!
//! | Scenario |
//! |----------|
//! | Header keys keep file order through parse and render |
//! | Body text is preserved byte for byte |
//! | Missing or unterminated fences are rejected |
//! | Known types require their type-specific keys |
//! | Unknown types stay representable |
//! | Status edits replace the key in place |

use agent_vault::models::{FrontMatter, Priority, TaskKind, TaskRecord, TaskStatus};
use agent_vault::AppError;

const SAMPLE: &str = "---\ntitle: Review Report\ncreated: 2026-01-15T10:30:00+00:00\nsource: cloud-api\nstatus: new\npriority: high\n---\n\n# Review Report\n\nPlease review the Q4 numbers.\n";

#[test]
fn render_reproduces_parsed_file() {
    let record = TaskRecord::parse("20260115_103000_ReviewReport.md", SAMPLE).expect("parse");
    assert_eq!(record.render(), SAMPLE);
}

#[test]
fn header_fields_are_exposed() {
    let record = TaskRecord::parse("20260115_103000_ReviewReport.md", SAMPLE).expect("parse");
    assert_eq!(record.front_matter.get("title"), Some("Review Report"));
    assert_eq!(record.status(), Some(TaskStatus::New));
    assert_eq!(record.priority(), Priority::High);
    assert_eq!(record.stem(), "20260115_103000_ReviewReport");
    let created = record.created().expect("created");
    assert_eq!(created.to_rfc3339(), "2026-01-15T10:30:00+00:00");
}

#[test]
fn naive_created_timestamp_is_read_as_utc() {
    let text = "---\ncreated: 2026-01-15T10:30:00.123456\n---\nbody\n";
    let record = TaskRecord::parse("a.md", text).expect("parse");
    assert_eq!(
        record.created().expect("created").format("%H:%M:%S").to_string(),
        "10:30:00"
    );
}

#[test]
fn byte_order_mark_is_ignored() {
    let text = format!("\u{feff}{SAMPLE}");
    let record = TaskRecord::parse("a.md", &text).expect("parse");
    assert_eq!(record.front_matter.get("status"), Some("new"));
}

#[test]
fn missing_fence_is_rejected() {
    let err = TaskRecord::parse("a.md", "# just markdown\n").expect_err("must fail");
    assert!(matches!(err, AppError::TaskFormat(_)));
}

#[test]
fn unterminated_header_is_rejected() {
    let err = TaskRecord::parse("a.md", "---\ntype: task\nstatus: new\n").expect_err("must fail");
    assert!(matches!(err, AppError::TaskFormat(_)));
}

#[test]
fn header_line_without_colon_is_rejected() {
    let err = TaskRecord::parse("a.md", "---\nnot a pair\n---\n").expect_err("must fail");
    assert!(err.to_string().contains("malformed header line"));
}

#[test]
fn values_may_contain_colons() {
    let text = "---\ncreated: 2026-01-15T10:30:00+00:00\nurl: https://example.com/x\n---\n";
    let record = TaskRecord::parse("a.md", text).expect("parse");
    assert_eq!(record.front_matter.get("url"), Some("https://example.com/x"));
}

#[test]
fn set_status_replaces_in_place() {
    let mut record = TaskRecord::parse("a.md", SAMPLE).expect("parse");
    record.set_status(&TaskStatus::Approved);
    let keys: Vec<&str> = record.front_matter.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["title", "created", "source", "status", "priority"]);
    assert!(record.render().contains("status: approved\n"));
}

#[test]
fn header_values_are_flattened_to_one_line() {
    let mut fm = FrontMatter::new();
    fm.set("subject", "line one\nline two");
    assert_eq!(fm.get("subject"), Some("line one line two"));
}

#[test]
fn email_draft_requires_recipient() {
    let text = "---\ntype: email_draft\nsubject: hi\n---\n";
    let record = TaskRecord::parse("d.md", text).expect("parse");
    assert!(matches!(record.kind(), Err(AppError::TaskFormat(_))));
}

#[test]
fn email_draft_targets_email_by_default() {
    let text = "---\ntype: email_draft\nrecipient: ops@example.com\nsubject: hi\n---\n";
    let record = TaskRecord::parse("d.md", text).expect("parse");
    assert_eq!(
        record.kind().expect("kind"),
        TaskKind::EmailDraft {
            recipient: "ops@example.com".into(),
            subject: "hi".into()
        }
    );
    assert_eq!(record.target_system().as_deref(), Some("email"));
}

#[test]
fn explicit_target_wins_over_kind_default() {
    let text = "---\ntype: social_post\nplatform: linkedin\ntarget: buffer\n---\n";
    let record = TaskRecord::parse("p.md", text).expect("parse");
    assert_eq!(record.target_system().as_deref(), Some("buffer"));
}

#[test]
fn untyped_record_is_a_general_task() {
    let record = TaskRecord::parse("a.md", SAMPLE).expect("parse");
    assert_eq!(
        record.kind().expect("kind"),
        TaskKind::General {
            title: Some("Review Report".into())
        }
    );
    assert_eq!(record.target_system(), None);
}

#[test]
fn unknown_type_is_preserved() {
    let record = TaskRecord::parse("a.md", "---\ntype: whatsapp_reply\n---\n").expect("parse");
    let kind = record.kind().expect("kind");
    assert_eq!(kind.type_name(), "whatsapp_reply");
}

#[test]
fn append_section_keeps_existing_body() {
    let mut record = TaskRecord::parse("a.md", SAMPLE).expect("parse");
    record.append_section("Approved by local-agent", &["Approved at: now".to_owned()]);
    assert!(record.body.starts_with("\n# Review Report\n\nPlease review the Q4 numbers.\n"));
    assert!(record.body.ends_with("\n## Approved by local-agent\nApproved at: now\n"));
}
