//! Orchestration over the store: each operation reads the records it needs,
//! runs the pure rules, then persists the mutated record and any notifications
//! in one pass. Store failures are surfaced to the caller and logged; there is
//! no retry, since every write is an idempotent upsert by natural key.

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::forum::{self, ModerationDecision};
use crate::justification;
use crate::models::{
    AttendanceRecord, AttendanceStatus, ForumThread, ForumThreadStatus, JustificationFile,
    Notification, NotificationDraft, NotificationKind, QrSession, Role,
};
use crate::notify;
use crate::qr::{self, QrOutcome, QrPayload};
use crate::standing;
use crate::store::{IdSource, RecordStore};

/// What a marking call did, including every notification it emitted.
#[derive(Debug)]
pub struct MarkOutcome {
    pub record: AttendanceRecord,
    pub notifications: Vec<Notification>,
}

/// Upserts one attendance mark by (student, subject, date) and runs the
/// absence trigger when a record transitions into absent. A brand-new absence
/// additionally gets the fixed absence notice before any threshold alert.
pub async fn mark_attendance<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    student_id: i64,
    subject_id: &str,
    taken_on: NaiveDate,
    status: AttendanceStatus,
) -> anyhow::Result<MarkOutcome> {
    let before_records = store.records_for(student_id, subject_id).await?;
    let existing = before_records
        .iter()
        .find(|r| r.taken_on == taken_on)
        .cloned();

    let subject = store.get_subject(subject_id).await?;
    let mut drafts: Vec<NotificationDraft> = Vec::new();
    let mut became_absent = false;

    let record = match existing {
        Some(old) => {
            if old.status != AttendanceStatus::Absent && status == AttendanceStatus::Absent {
                became_absent = true;
            }
            let mut updated = old;
            updated.status = status;
            updated
        }
        None => {
            if status == AttendanceStatus::Absent {
                became_absent = true;
                let subject_name = subject
                    .as_ref()
                    .map(|s| s.name.as_str())
                    .unwrap_or("una materia");
                drafts.push(notify::new_absence(student_id, subject_name));
            }
            AttendanceRecord::new(ids.next_id(), student_id, subject_id, taken_on, status)
        }
    };

    if became_absent {
        let mut after_records = before_records.clone();
        match after_records.iter_mut().find(|r| r.taken_on == taken_on) {
            Some(slot) => *slot = record.clone(),
            None => after_records.push(record.clone()),
        }

        let before = standing::evaluate(&before_records);
        let after = standing::evaluate(&after_records);
        let subject_name = subject
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("Materia Desconocida");
        drafts.extend(notify::absence_alerts(
            student_id,
            subject_name,
            &before,
            &after,
        ));
    }

    store
        .upsert_record(&record)
        .await
        .context("failed to persist attendance record")?;
    let notifications = deliver(store, ids, now, drafts).await?;

    info!(
        student_id,
        subject_id,
        status = record.status.as_str(),
        emitted = notifications.len(),
        "attendance marked"
    );
    Ok(MarkOutcome {
        record,
        notifications,
    })
}

/// Moves an absent record into pending justification and notifies the
/// student's assigned preceptor, matched by career.
pub async fn request_justification<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    student_id: i64,
    subject_id: &str,
    taken_on: NaiveDate,
    reason: String,
    file: Option<JustificationFile>,
) -> anyhow::Result<AttendanceRecord> {
    let mut record = require_record(store, student_id, subject_id, taken_on).await?;
    justification::request(&mut record, reason, file)?;
    store.upsert_record(&record).await?;

    let subject_name = subject_name_or(store, subject_id, "una materia").await?;
    let student = store.get_user(student_id).await?;
    let preceptor = match &student {
        Some(student) => store.find_preceptor(&student.career_id).await?,
        None => None,
    };

    match (student, preceptor) {
        (Some(student), Some(preceptor)) => {
            deliver(
                store,
                ids,
                now,
                vec![NotificationDraft {
                    user_id: preceptor.id,
                    kind: NotificationKind::JustificationRequest,
                    text: format!("{} ha solicitado una justificación.", student.name),
                    details: Some(format!("Materia: {subject_name}")),
                }],
            )
            .await?;
        }
        _ => warn!(
            student_id,
            subject_id, "no assigned preceptor to notify for justification request"
        ),
    }

    Ok(record)
}

/// Resolves a pending justification and notifies the student of the outcome.
pub async fn resolve_justification<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    student_id: i64,
    subject_id: &str,
    taken_on: NaiveDate,
    approved: bool,
) -> anyhow::Result<AttendanceRecord> {
    let mut record = require_record(store, student_id, subject_id, taken_on).await?;
    justification::resolve(&mut record, approved)?;
    store.upsert_record(&record).await?;

    let subject_name = subject_name_or(store, subject_id, "una materia").await?;
    let (kind, verdict) = if approved {
        (NotificationKind::JustificationApproved, "aprobada")
    } else {
        (NotificationKind::JustificationRejected, "rechazada")
    };
    deliver(
        store,
        ids,
        now,
        vec![NotificationDraft {
            user_id: student_id,
            kind,
            text: format!("Tu solicitud de justificación ha sido {verdict}."),
            details: Some(format!("Materia: {subject_name}")),
        }],
    )
    .await?;

    Ok(record)
}

/// Posts a new thread into the moderation queue.
pub async fn post_thread<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    author_id: i64,
    title: String,
    content: String,
) -> anyhow::Result<ForumThread> {
    let author = store
        .get_user(author_id)
        .await?
        .with_context(|| format!("unknown author {author_id}"))?;
    let thread = ForumThread {
        id: ids.next_id(),
        author_id,
        title,
        content,
        career_id: author.career_id,
        year: author.year,
        status: ForumThreadStatus::Pending,
        rejection_reason: None,
        locked: false,
        created_at: now,
    };
    store.put_thread(&thread).await?;
    Ok(thread)
}

pub async fn moderate_thread<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    thread_id: Uuid,
    decision: ModerationDecision,
    reason: Option<String>,
) -> anyhow::Result<ForumThread> {
    let mut thread = require_thread(store, thread_id).await?;
    let draft = forum::moderate(&mut thread, decision, reason)?;
    store.put_thread(&thread).await?;
    deliver(store, ids, now, vec![draft]).await?;
    Ok(thread)
}

pub async fn edit_thread<S: RecordStore>(
    store: &mut S,
    thread_id: Uuid,
    title: String,
    content: String,
) -> anyhow::Result<ForumThread> {
    let mut thread = require_thread(store, thread_id).await?;
    forum::author_edit(&mut thread, title, content)?;
    store.put_thread(&thread).await?;
    Ok(thread)
}

pub async fn toggle_thread_lock<S: RecordStore>(
    store: &mut S,
    thread_id: Uuid,
) -> anyhow::Result<ForumThread> {
    let mut thread = require_thread(store, thread_id).await?;
    forum::toggle_lock(&mut thread);
    store.put_thread(&thread).await?;
    Ok(thread)
}

/// Opens a five-minute QR check-in window anchored at the institute.
pub async fn create_qr_session<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    preceptor_id: i64,
    subject_id: &str,
) -> anyhow::Result<QrSession> {
    let preceptor = store
        .get_user(preceptor_id)
        .await?
        .with_context(|| format!("unknown user {preceptor_id}"))?;
    if preceptor.role != Role::Preceptor {
        bail!("only a preceptor can open a QR attendance session");
    }
    store
        .get_subject(subject_id)
        .await?
        .with_context(|| format!("unknown subject {subject_id}"))?;

    let session = QrSession {
        id: ids.next_id(),
        subject_id: subject_id.to_string(),
        preceptor_id,
        created_at: now,
        expires_at: now + qr::session_duration(),
        location: qr::INSTITUTE_LOCATION,
        radius_m: qr::VALID_RADIUS_M,
    };
    store.put_qr_session(&session).await?;
    info!(session_id = %session.id, subject_id, "qr session opened");
    Ok(session)
}

/// Verifies a scanned QR token for a student at a reported position. Every
/// failure degrades to a code from the closed outcome set; a success marks the
/// student present for today through the normal marking path.
pub async fn verify_qr_checkin<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    student_id: i64,
    token: &str,
    location: crate::models::Coordinates,
) -> anyhow::Result<QrOutcome> {
    let student = match store.get_user(student_id).await? {
        Some(user) if user.role == Role::Student => user,
        _ => return Ok(QrOutcome::Invalid),
    };

    let payload: QrPayload = match serde_json::from_str(token) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(student_id, %err, "malformed qr payload");
            return Ok(QrOutcome::Invalid);
        }
    };

    let session = match store.get_qr_session(payload.session_id).await? {
        Some(session) => session,
        None => return Ok(QrOutcome::Invalid),
    };

    let outcome = qr::verify(&session, now, &location);
    if outcome == QrOutcome::Success {
        mark_attendance(
            store,
            ids,
            now,
            student.id,
            &session.subject_id,
            now.date_naive(),
            AttendanceStatus::Present,
        )
        .await?;
    }
    Ok(outcome)
}

/// Fans an announcement out to every student matching the optional career and
/// year filters; returns how many notifications were delivered.
pub async fn announce<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    text: &str,
    career_id: Option<&str>,
    year: Option<i32>,
) -> anyhow::Result<usize> {
    let students = store.list_students(career_id, year).await?;
    let drafts = students
        .iter()
        .map(|student| NotificationDraft {
            user_id: student.id,
            kind: NotificationKind::Announcement,
            text: "Nuevo anuncio".to_string(),
            details: Some(text.to_string()),
        })
        .collect();
    let delivered = deliver(store, ids, now, drafts).await?;
    Ok(delivered.len())
}

async fn deliver<S: RecordStore>(
    store: &mut S,
    ids: &mut impl IdSource,
    now: DateTime<Utc>,
    drafts: Vec<NotificationDraft>,
) -> anyhow::Result<Vec<Notification>> {
    let mut delivered = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let notification = draft.into_notification(ids.next_id(), now);
        store
            .push_notification(&notification)
            .await
            .context("failed to persist notification")?;
        delivered.push(notification);
    }
    Ok(delivered)
}

async fn require_record<S: RecordStore>(
    store: &S,
    student_id: i64,
    subject_id: &str,
    taken_on: NaiveDate,
) -> anyhow::Result<AttendanceRecord> {
    store
        .find_record(student_id, subject_id, taken_on)
        .await?
        .ok_or_else(|| {
            crate::error::RuleError::RecordNotFound {
                student_id,
                subject_id: subject_id.to_string(),
                taken_on,
            }
            .into()
        })
}

async fn require_thread<S: RecordStore>(
    store: &S,
    thread_id: Uuid,
) -> anyhow::Result<ForumThread> {
    store
        .get_thread(thread_id)
        .await?
        .with_context(|| format!("unknown forum thread {thread_id}"))
}

async fn subject_name_or<S: RecordStore>(
    store: &S,
    subject_id: &str,
    fallback: &str,
) -> anyhow::Result<String> {
    Ok(store
        .get_subject(subject_id)
        .await?
        .map(|s| s.name)
        .unwrap_or_else(|| fallback.to_string()))
}
