use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    AttendanceRecord, ForumThread, Notification, QrSession, Role, Subject, User,
};

/// Id provider. Production code draws random v4 uuids; tests substitute a
/// sequential source so record and notification ids are predictable.
pub trait IdSource {
    fn next_id(&mut self) -> Uuid;
}

#[derive(Debug, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&mut self) -> Uuid {
        Uuid::new_v4()
    }
}

#[derive(Debug, Default)]
pub struct SequentialIds(u128);

impl IdSource for SequentialIds {
    fn next_id(&mut self) -> Uuid {
        self.0 += 1;
        Uuid::from_u128(self.0)
    }
}

/// Persistence seam for the rule engine. The backing document store is an
/// opaque collaborator; this trait is the list/get/put surface the engine
/// needs, so every rule can be exercised against [`MemoryStore`] without a
/// database. Writes are idempotent upserts keyed by natural identity and rely
/// on the single-writer assumption of the marking UI.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Every record for one (student, subject) pair.
    async fn records_for(
        &self,
        student_id: i64,
        subject_id: &str,
    ) -> anyhow::Result<Vec<AttendanceRecord>>;

    async fn find_record(
        &self,
        student_id: i64,
        subject_id: &str,
        taken_on: NaiveDate,
    ) -> anyhow::Result<Option<AttendanceRecord>>;

    async fn all_records(&self) -> anyhow::Result<Vec<AttendanceRecord>>;

    /// Insert-or-replace by (student, subject, date).
    async fn upsert_record(&mut self, record: &AttendanceRecord) -> anyhow::Result<()>;

    async fn get_subject(&self, subject_id: &str) -> anyhow::Result<Option<Subject>>;
    async fn list_subjects(&self) -> anyhow::Result<Vec<Subject>>;

    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>>;
    async fn find_preceptor(&self, career_id: &str) -> anyhow::Result<Option<User>>;
    async fn list_students(
        &self,
        career_id: Option<&str>,
        year: Option<i32>,
    ) -> anyhow::Result<Vec<User>>;

    async fn push_notification(&mut self, notification: &Notification) -> anyhow::Result<()>;
    async fn notifications_for(&self, user_id: i64) -> anyhow::Result<Vec<Notification>>;
    /// Flips unread notifications to read; returns how many changed.
    async fn mark_notifications_read(&mut self, user_id: i64) -> anyhow::Result<usize>;

    async fn get_thread(&self, thread_id: Uuid) -> anyhow::Result<Option<ForumThread>>;
    async fn put_thread(&mut self, thread: &ForumThread) -> anyhow::Result<()>;

    async fn get_qr_session(&self, session_id: Uuid) -> anyhow::Result<Option<QrSession>>;
    async fn put_qr_session(&mut self, session: &QrSession) -> anyhow::Result<()>;
}

/// In-memory store used by the test suite and the rule-engine examples.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub records: Vec<AttendanceRecord>,
    pub users: Vec<User>,
    pub subjects: Vec<Subject>,
    pub notifications: Vec<Notification>,
    pub threads: HashMap<Uuid, ForumThread>,
    pub qr_sessions: HashMap<Uuid, QrSession>,
}

impl RecordStore for MemoryStore {
    async fn records_for(
        &self,
        student_id: i64,
        subject_id: &str,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.student_id == student_id && r.subject_id == subject_id)
            .cloned()
            .collect())
    }

    async fn find_record(
        &self,
        student_id: i64,
        subject_id: &str,
        taken_on: NaiveDate,
    ) -> anyhow::Result<Option<AttendanceRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| {
                r.student_id == student_id
                    && r.subject_id == subject_id
                    && r.taken_on == taken_on
            })
            .cloned())
    }

    async fn all_records(&self) -> anyhow::Result<Vec<AttendanceRecord>> {
        Ok(self.records.clone())
    }

    async fn upsert_record(&mut self, record: &AttendanceRecord) -> anyhow::Result<()> {
        match self.records.iter_mut().find(|r| {
            r.student_id == record.student_id
                && r.subject_id == record.subject_id
                && r.taken_on == record.taken_on
        }) {
            Some(existing) => *existing = record.clone(),
            None => self.records.push(record.clone()),
        }
        Ok(())
    }

    async fn get_subject(&self, subject_id: &str) -> anyhow::Result<Option<Subject>> {
        Ok(self.subjects.iter().find(|s| s.id == subject_id).cloned())
    }

    async fn list_subjects(&self) -> anyhow::Result<Vec<Subject>> {
        Ok(self.subjects.clone())
    }

    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_preceptor(&self, career_id: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.role == Role::Preceptor && u.career_id == career_id)
            .cloned())
    }

    async fn list_students(
        &self,
        career_id: Option<&str>,
        year: Option<i32>,
    ) -> anyhow::Result<Vec<User>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.role == Role::Student)
            .filter(|u| career_id.map_or(true, |c| u.career_id == c))
            .filter(|u| year.map_or(true, |y| u.year == y))
            .cloned()
            .collect())
    }

    async fn push_notification(&mut self, notification: &Notification) -> anyhow::Result<()> {
        self.notifications.push(notification.clone());
        Ok(())
    }

    async fn notifications_for(&self, user_id: i64) -> anyhow::Result<Vec<Notification>> {
        let mut list: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn mark_notifications_read(&mut self, user_id: i64) -> anyhow::Result<usize> {
        let mut changed = 0;
        for notification in self
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            notification.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn get_thread(&self, thread_id: Uuid) -> anyhow::Result<Option<ForumThread>> {
        Ok(self.threads.get(&thread_id).cloned())
    }

    async fn put_thread(&mut self, thread: &ForumThread) -> anyhow::Result<()> {
        self.threads.insert(thread.id, thread.clone());
        Ok(())
    }

    async fn get_qr_session(&self, session_id: Uuid) -> anyhow::Result<Option<QrSession>> {
        Ok(self.qr_sessions.get(&session_id).cloned())
    }

    async fn put_qr_session(&mut self, session: &QrSession) -> anyhow::Result<()> {
        self.qr_sessions.insert(session.id, session.clone());
        Ok(())
    }
}
