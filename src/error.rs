use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{AttendanceStatus, ForumThreadStatus};

/// Rule violations surfaced to the caller. None of these are fatal; the CLI
/// prints them and moves on.
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("no attendance record for student {student_id} in {subject_id} on {taken_on}")]
    RecordNotFound {
        student_id: i64,
        subject_id: String,
        taken_on: NaiveDate,
    },
    #[error("justification can only be requested for an absence (record is {0})")]
    JustificationNotAbsent(AttendanceStatus),
    #[error("no pending justification to resolve (record is {0})")]
    JustificationNotPending(AttendanceStatus),
    #[error("thread is not awaiting moderation (thread is {0})")]
    ThreadNotPending(ForumThreadStatus),
    #[error("a reason is required when requesting changes to a publication")]
    RevisionReasonRequired,
    #[error("thread can no longer be edited by its author (thread is {0})")]
    ThreadNotEditable(ForumThreadStatus),
}
