//! Forum thread moderation. Moderators act only on pending threads; authors
//! can rework a thread sent back for revision, which returns it to the
//! moderation queue.

use crate::error::RuleError;
use crate::models::{ForumThread, ForumThreadStatus, NotificationDraft, NotificationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    Approve,
    Reject,
    NeedsRevision,
}

/// Applies a moderator decision to a pending thread and produces the
/// notification for its author. Requesting changes requires a reason; a
/// rejection reason is optional and falls back to the thread title in the
/// notification details.
pub fn moderate(
    thread: &mut ForumThread,
    decision: ModerationDecision,
    reason: Option<String>,
) -> Result<NotificationDraft, RuleError> {
    if thread.status != ForumThreadStatus::Pending {
        return Err(RuleError::ThreadNotPending(thread.status));
    }

    let draft = match decision {
        ModerationDecision::Approve => {
            thread.status = ForumThreadStatus::Approved;
            NotificationDraft {
                user_id: thread.author_id,
                kind: NotificationKind::ForumThreadApproved,
                text: "Tu publicación del foro ha sido aprobada.".to_string(),
                details: Some(format!("Título: {}", thread.title)),
            }
        }
        ModerationDecision::Reject => {
            thread.status = ForumThreadStatus::Rejected;
            let details = reason
                .clone()
                .unwrap_or_else(|| format!("Título: {}", thread.title));
            thread.rejection_reason = reason;
            NotificationDraft {
                user_id: thread.author_id,
                kind: NotificationKind::ForumThreadRejected,
                text: "Tu publicación del foro ha sido rechazada.".to_string(),
                details: Some(details),
            }
        }
        ModerationDecision::NeedsRevision => {
            let reason = reason.ok_or(RuleError::RevisionReasonRequired)?;
            thread.status = ForumThreadStatus::NeedsRevision;
            thread.rejection_reason = Some(reason.clone());
            NotificationDraft {
                user_id: thread.author_id,
                kind: NotificationKind::ForumThreadNeedsRevision,
                text: "Se solicitaron cambios en tu publicación.".to_string(),
                details: Some(format!("Motivo: {reason}")),
            }
        }
    };

    Ok(draft)
}

/// Author rework. Allowed while pending or sent back for revision; puts the
/// thread back in the moderation queue and clears the previous reason.
pub fn author_edit(
    thread: &mut ForumThread,
    title: String,
    content: String,
) -> Result<(), RuleError> {
    match thread.status {
        ForumThreadStatus::Pending | ForumThreadStatus::NeedsRevision => {
            thread.title = title;
            thread.content = content;
            thread.status = ForumThreadStatus::Pending;
            thread.rejection_reason = None;
            Ok(())
        }
        other => Err(RuleError::ThreadNotEditable(other)),
    }
}

pub fn toggle_lock(thread: &mut ForumThread) {
    thread.locked = !thread.locked;
}
