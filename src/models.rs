use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Justified,
    PendingJustification,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Justified => "justified",
            AttendanceStatus::PendingJustification => "pending_justification",
        }
    }

    /// Label shown to users, as the institute names these states.
    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Presente",
            AttendanceStatus::Absent => "Ausente",
            AttendanceStatus::Justified => "Justificado",
            AttendanceStatus::PendingJustification => "Pendiente",
        }
    }

    /// Justified and pending-justification absences both count as covered
    /// when computing presentism.
    pub fn counts_as_covered(&self) -> bool {
        matches!(
            self,
            AttendanceStatus::Present
                | AttendanceStatus::Justified
                | AttendanceStatus::PendingJustification
        )
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AttendanceStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "justified" => Ok(AttendanceStatus::Justified),
            "pending_justification" => Ok(AttendanceStatus::PendingJustification),
            other => Err(anyhow::anyhow!("unknown attendance status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JustificationFile {
    pub name: String,
    pub mime: String,
    pub content_base64: String,
}

/// One attendance mark. Natural identity is (student_id, subject_id, taken_on);
/// re-marking the same key updates the record in place.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: i64,
    pub subject_id: String,
    pub taken_on: NaiveDate,
    pub status: AttendanceStatus,
    pub justification_reason: Option<String>,
    pub justification_file: Option<JustificationFile>,
}

impl AttendanceRecord {
    pub fn new(
        id: Uuid,
        student_id: i64,
        subject_id: impl Into<String>,
        taken_on: NaiveDate,
        status: AttendanceStatus,
    ) -> Self {
        AttendanceRecord {
            id,
            student_id,
            subject_id: subject_id.into(),
            taken_on,
            status,
            justification_reason: None,
            justification_file: None,
        }
    }
}

/// Derived per (student, subject); never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standing {
    pub total_classes: usize,
    pub absences: usize,
    pub attendance_percent: f64,
    pub is_libre: bool,
    pub is_warning_absences: bool,
    pub is_warning_percent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Announcement,
    Absence,
    JustificationApproved,
    JustificationRejected,
    JustificationRequest,
    ForumThreadApproved,
    ForumThreadRejected,
    ForumThreadNeedsRevision,
    AttendanceWarning,
    AttendanceStatusLibre,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Announcement => "announcement",
            NotificationKind::Absence => "absence",
            NotificationKind::JustificationApproved => "justification_approved",
            NotificationKind::JustificationRejected => "justification_rejected",
            NotificationKind::JustificationRequest => "justification_request",
            NotificationKind::ForumThreadApproved => "forum_thread_approved",
            NotificationKind::ForumThreadRejected => "forum_thread_rejected",
            NotificationKind::ForumThreadNeedsRevision => "forum_thread_needs_revision",
            NotificationKind::AttendanceWarning => "attendance_warning",
            NotificationKind::AttendanceStatusLibre => "attendance_status_libre",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Announcement => "Anuncio",
            NotificationKind::Absence => "Falta",
            NotificationKind::JustificationApproved => "Justificación Aprobada",
            NotificationKind::JustificationRejected => "Justificación Rechazada",
            NotificationKind::JustificationRequest => "Solicitud de Justificación",
            NotificationKind::ForumThreadApproved => "Publicación Aprobada",
            NotificationKind::ForumThreadRejected => "Publicación Rechazada",
            NotificationKind::ForumThreadNeedsRevision => "Revisión de Publicación Solicitada",
            NotificationKind::AttendanceWarning => "Alerta de Asistencia",
            NotificationKind::AttendanceStatusLibre => "Condición: Libre",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "announcement" => Ok(NotificationKind::Announcement),
            "absence" => Ok(NotificationKind::Absence),
            "justification_approved" => Ok(NotificationKind::JustificationApproved),
            "justification_rejected" => Ok(NotificationKind::JustificationRejected),
            "justification_request" => Ok(NotificationKind::JustificationRequest),
            "forum_thread_approved" => Ok(NotificationKind::ForumThreadApproved),
            "forum_thread_rejected" => Ok(NotificationKind::ForumThreadRejected),
            "forum_thread_needs_revision" => Ok(NotificationKind::ForumThreadNeedsRevision),
            "attendance_warning" => Ok(NotificationKind::AttendanceWarning),
            "attendance_status_libre" => Ok(NotificationKind::AttendanceStatusLibre),
            other => Err(anyhow::anyhow!("unknown notification kind '{other}'")),
        }
    }
}

/// Immutable after creation, except for the read flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub text: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// A notification the rule engine wants to emit, before the service layer
/// stamps it with an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub text: String,
    pub details: Option<String>,
}

impl NotificationDraft {
    pub fn into_notification(self, id: Uuid, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id,
            user_id: self.user_id,
            kind: self.kind,
            text: self.text,
            details: self.details,
            created_at,
            read: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Preceptor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Preceptor => "preceptor",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "student" => Ok(Role::Student),
            "preceptor" => Ok(Role::Preceptor),
            other => Err(anyhow::anyhow!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub career_id: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub career_id: String,
    pub year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForumThreadStatus {
    Pending,
    Approved,
    Rejected,
    NeedsRevision,
}

impl ForumThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForumThreadStatus::Pending => "pending",
            ForumThreadStatus::Approved => "approved",
            ForumThreadStatus::Rejected => "rejected",
            ForumThreadStatus::NeedsRevision => "needs_revision",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ForumThreadStatus::Pending => "Pendiente",
            ForumThreadStatus::Approved => "Aprobado",
            ForumThreadStatus::Rejected => "Rechazado",
            ForumThreadStatus::NeedsRevision => "Necesita Revisión",
        }
    }
}

impl fmt::Display for ForumThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ForumThreadStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ForumThreadStatus::Pending),
            "approved" => Ok(ForumThreadStatus::Approved),
            "rejected" => Ok(ForumThreadStatus::Rejected),
            "needs_revision" => Ok(ForumThreadStatus::NeedsRevision),
            other => Err(anyhow::anyhow!("unknown thread status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForumThread {
    pub id: Uuid,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub career_id: String,
    pub year: i32,
    pub status: ForumThreadStatus,
    pub rejection_reason: Option<String>,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QrSession {
    pub id: Uuid,
    pub subject_id: String,
    pub preceptor_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub location: Coordinates,
    pub radius_m: f64,
}

/// Profile sections a student can hide from classmates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileSection {
    Overview,
    Classmates,
    Absences,
    History,
    Stats,
    Agenda,
    Notes,
    Forums,
    QrAttendance,
}

/// Visibility map with a default-visible policy: a section is hidden only when
/// explicitly set to false.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewPermissions {
    overrides: std::collections::HashMap<ProfileSection, bool>,
}

impl ViewPermissions {
    pub fn set(&mut self, section: ProfileSection, visible: bool) {
        self.overrides.insert(section, visible);
    }

    pub fn is_visible(&self, section: ProfileSection) -> bool {
        self.overrides.get(&section).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_code() {
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Justified,
            AttendanceStatus::PendingJustification,
        ] {
            assert_eq!(status.as_str().parse::<AttendanceStatus>().unwrap(), status);
        }
    }

    #[test]
    fn covered_statuses_include_pending_justification() {
        assert!(AttendanceStatus::Present.counts_as_covered());
        assert!(AttendanceStatus::Justified.counts_as_covered());
        assert!(AttendanceStatus::PendingJustification.counts_as_covered());
        assert!(!AttendanceStatus::Absent.counts_as_covered());
    }

    #[test]
    fn sections_are_visible_unless_explicitly_hidden() {
        let mut permissions = ViewPermissions::default();
        assert!(permissions.is_visible(ProfileSection::Agenda));

        permissions.set(ProfileSection::Absences, false);
        assert!(!permissions.is_visible(ProfileSection::Absences));
        assert!(permissions.is_visible(ProfileSection::History));

        permissions.set(ProfileSection::Absences, true);
        assert!(permissions.is_visible(ProfileSection::Absences));
    }
}
