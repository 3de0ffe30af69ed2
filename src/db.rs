use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AttendanceRecord, AttendanceStatus, Coordinates, ForumThread, ForumThreadStatus,
    JustificationFile, Notification, NotificationKind, QrSession, Role, Subject, User,
};
use crate::store::RecordStore;

/// Postgres-backed store. All writes are idempotent upserts keyed by the
/// natural identity of each row.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn record_from_row(row: &PgRow) -> anyhow::Result<AttendanceRecord> {
    let status: String = row.get("status");
    let file_name: Option<String> = row.get("justification_file_name");
    let justification_file = file_name.map(|name| JustificationFile {
        name,
        mime: row
            .get::<Option<String>, _>("justification_file_mime")
            .unwrap_or_default(),
        content_base64: row
            .get::<Option<String>, _>("justification_file_data")
            .unwrap_or_default(),
    });

    Ok(AttendanceRecord {
        id: row.get("id"),
        student_id: row.get("student_id"),
        subject_id: row.get("subject_id"),
        taken_on: row.get("taken_on"),
        status: status.parse()?,
        justification_reason: row.get("justification_reason"),
        justification_file,
    })
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("full_name"),
        email: row.get("email"),
        role: role.parse()?,
        career_id: row.get("career_id"),
        year: row.get("year"),
    })
}

fn subject_from_row(row: &PgRow) -> Subject {
    Subject {
        id: row.get("id"),
        name: row.get("name"),
        career_id: row.get("career_id"),
        year: row.get("year"),
    }
}

fn notification_from_row(row: &PgRow) -> anyhow::Result<Notification> {
    let kind: String = row.get("kind");
    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: kind.parse::<NotificationKind>()?,
        text: row.get("text"),
        details: row.get("details"),
        created_at: row.get("created_at"),
        read: row.get("read"),
    })
}

fn thread_from_row(row: &PgRow) -> anyhow::Result<ForumThread> {
    let status: String = row.get("status");
    Ok(ForumThread {
        id: row.get("id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        content: row.get("content"),
        career_id: row.get("career_id"),
        year: row.get("year"),
        status: status.parse::<ForumThreadStatus>()?,
        rejection_reason: row.get("rejection_reason"),
        locked: row.get("locked"),
        created_at: row.get("created_at"),
    })
}

fn qr_session_from_row(row: &PgRow) -> QrSession {
    QrSession {
        id: row.get("id"),
        subject_id: row.get("subject_id"),
        preceptor_id: row.get("preceptor_id"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        location: Coordinates {
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
        },
        radius_m: row.get("radius_m"),
    }
}

const RECORD_COLUMNS: &str = "id, student_id, subject_id, taken_on, status, \
     justification_reason, justification_file_name, justification_file_mime, \
     justification_file_data";

impl RecordStore for PgStore {
    async fn records_for(
        &self,
        student_id: i64,
        subject_id: &str,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_engine.attendance_records \
             WHERE student_id = $1 AND subject_id = $2 ORDER BY taken_on"
        ))
        .bind(student_id)
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn find_record(
        &self,
        student_id: i64,
        subject_id: &str,
        taken_on: NaiveDate,
    ) -> anyhow::Result<Option<AttendanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_engine.attendance_records \
             WHERE student_id = $1 AND subject_id = $2 AND taken_on = $3"
        ))
        .bind(student_id)
        .bind(subject_id)
        .bind(taken_on)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn all_records(&self) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_engine.attendance_records \
             ORDER BY student_id, subject_id, taken_on"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn upsert_record(&mut self, record: &AttendanceRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_engine.attendance_records
            (id, student_id, subject_id, taken_on, status,
             justification_reason, justification_file_name,
             justification_file_mime, justification_file_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (student_id, subject_id, taken_on) DO UPDATE
            SET status = EXCLUDED.status,
                justification_reason = EXCLUDED.justification_reason,
                justification_file_name = EXCLUDED.justification_file_name,
                justification_file_mime = EXCLUDED.justification_file_mime,
                justification_file_data = EXCLUDED.justification_file_data
            "#,
        )
        .bind(record.id)
        .bind(record.student_id)
        .bind(&record.subject_id)
        .bind(record.taken_on)
        .bind(record.status.as_str())
        .bind(&record.justification_reason)
        .bind(record.justification_file.as_ref().map(|f| f.name.as_str()))
        .bind(record.justification_file.as_ref().map(|f| f.mime.as_str()))
        .bind(
            record
                .justification_file
                .as_ref()
                .map(|f| f.content_base64.as_str()),
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_subject(&self, subject_id: &str) -> anyhow::Result<Option<Subject>> {
        let row = sqlx::query(
            "SELECT id, name, career_id, year FROM attendance_engine.subjects WHERE id = $1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(subject_from_row))
    }

    async fn list_subjects(&self) -> anyhow::Result<Vec<Subject>> {
        let rows = sqlx::query(
            "SELECT id, name, career_id, year FROM attendance_engine.subjects \
             ORDER BY career_id, year, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(subject_from_row).collect())
    }

    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, full_name, email, role, career_id, year \
             FROM attendance_engine.users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_preceptor(&self, career_id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, full_name, email, role, career_id, year \
             FROM attendance_engine.users \
             WHERE role = 'preceptor' AND career_id = $1 \
             ORDER BY id LIMIT 1",
        )
        .bind(career_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_students(
        &self,
        career_id: Option<&str>,
        year: Option<i32>,
    ) -> anyhow::Result<Vec<User>> {
        let mut query = String::from(
            "SELECT id, full_name, email, role, career_id, year \
             FROM attendance_engine.users WHERE role = 'student'",
        );
        if career_id.is_some() {
            query.push_str(" AND career_id = $1");
            if year.is_some() {
                query.push_str(" AND year = $2");
            }
        } else if year.is_some() {
            query.push_str(" AND year = $1");
        }
        query.push_str(" ORDER BY id");

        let mut rows = sqlx::query(&query);
        if let Some(value) = career_id {
            rows = rows.bind(value);
        }
        if let Some(value) = year {
            rows = rows.bind(value);
        }

        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(user_from_row).collect()
    }

    async fn push_notification(&mut self, notification: &Notification) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_engine.notifications
            (id, user_id, kind, text, details, created_at, read)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.text)
        .bind(&notification.details)
        .bind(notification.created_at)
        .bind(notification.read)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn notifications_for(&self, user_id: i64) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT id, user_id, kind, text, details, created_at, read \
             FROM attendance_engine.notifications \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_notifications_read(&mut self, user_id: i64) -> anyhow::Result<usize> {
        let result = sqlx::query(
            "UPDATE attendance_engine.notifications SET read = TRUE \
             WHERE user_id = $1 AND NOT read",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn get_thread(&self, thread_id: Uuid) -> anyhow::Result<Option<ForumThread>> {
        let row = sqlx::query(
            "SELECT id, author_id, title, content, career_id, year, status, \
             rejection_reason, locked, created_at \
             FROM attendance_engine.forum_threads WHERE id = $1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(thread_from_row).transpose()
    }

    async fn put_thread(&mut self, thread: &ForumThread) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_engine.forum_threads
            (id, author_id, title, content, career_id, year, status,
             rejection_reason, locked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                content = EXCLUDED.content,
                status = EXCLUDED.status,
                rejection_reason = EXCLUDED.rejection_reason,
                locked = EXCLUDED.locked
            "#,
        )
        .bind(thread.id)
        .bind(thread.author_id)
        .bind(&thread.title)
        .bind(&thread.content)
        .bind(&thread.career_id)
        .bind(thread.year)
        .bind(thread.status.as_str())
        .bind(&thread.rejection_reason)
        .bind(thread.locked)
        .bind(thread.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_qr_session(&self, session_id: Uuid) -> anyhow::Result<Option<QrSession>> {
        let row = sqlx::query(
            "SELECT id, subject_id, preceptor_id, created_at, expires_at, \
             latitude, longitude, radius_m \
             FROM attendance_engine.qr_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(qr_session_from_row))
    }

    async fn put_qr_session(&mut self, session: &QrSession) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_engine.qr_sessions
            (id, subject_id, preceptor_id, created_at, expires_at,
             latitude, longitude, radius_m)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(session.id)
        .bind(&session.subject_id)
        .bind(session.preceptor_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.location.latitude)
        .bind(session.location.longitude)
        .bind(session.radius_m)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Loads a realistic demo roster: two careers, a cohort of students, and
/// attendance that exercises the libre and justification paths.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users: Vec<(i64, &str, &str, Role, &str, i32)> = vec![
        (1, "Carlos Gomez", "carlos@preceptor.com", Role::Preceptor, "dev", 1),
        (2, "Ana Rodriguez", "ana@preceptor.com", Role::Preceptor, "design", 1),
        (101, "Juan Perez", "juan@dev.com", Role::Student, "dev", 1),
        (102, "Maria Lopez", "maria@dev.com", Role::Student, "dev", 1),
        (103, "Pedro Martinez", "pedro@dev.com", Role::Student, "dev", 2),
        (104, "Laura Vargas", "laura@dev.com", Role::Student, "dev", 1),
        (201, "Lucia Fernandez", "lucia@design.com", Role::Student, "design", 1),
        (202, "Diego Sanchez", "diego@design.com", Role::Student, "design", 1),
    ];

    for (id, name, email, role, career_id, year) in users {
        sqlx::query(
            r#"
            INSERT INTO attendance_engine.users (id, full_name, email, role, career_id, year)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                role = EXCLUDED.role,
                career_id = EXCLUDED.career_id,
                year = EXCLUDED.year
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role.as_str())
        .bind(career_id)
        .bind(year)
        .execute(pool)
        .await?;
    }

    let subjects = vec![
        ("dev-1-algo", "Algoritmos y Estructuras de Datos", "dev", 1),
        ("dev-1-prog1", "Programación I", "dev", 1),
        ("dev-1-arq", "Arquitectura de Computadoras", "dev", 1),
        ("dev-2-db", "Bases de Datos", "dev", 2),
        ("des-1-dg1", "Diseño Gráfico I", "design", 1),
        ("des-1-photo", "Fotografía", "design", 1),
    ];

    for (id, name, career_id, year) in subjects {
        sqlx::query(
            r#"
            INSERT INTO attendance_engine.subjects (id, name, career_id, year)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(career_id)
        .bind(year)
        .execute(pool)
        .await?;
    }

    // Juan is libre in Algoritmos: nine absences plus six presents.
    for i in 0..9u32 {
        let taken_on = date(2024, 6, 2 + i * 2)?;
        seed_record(pool, 101, "dev-1-algo", taken_on, AttendanceStatus::Absent).await?;
    }
    for i in 0..6u32 {
        let taken_on = date(2024, 7, 2 + i * 2)?;
        seed_record(pool, 101, "dev-1-algo", taken_on, AttendanceStatus::Present).await?;
    }

    // Juan in Programación I: five absences out of 25, one warning away.
    for day in 1..=25u32 {
        let status = if matches!(day, 3 | 8 | 14 | 20 | 24) {
            AttendanceStatus::Absent
        } else {
            AttendanceStatus::Present
        };
        seed_record(pool, 101, "dev-1-prog1", date(2024, 6, day)?, status).await?;
    }

    // Maria in Programación I: a pending justification and a few absences.
    for day in 1..=20u32 {
        let status = if day == 5 {
            AttendanceStatus::PendingJustification
        } else if matches!(day, 9 | 16) {
            AttendanceStatus::Absent
        } else {
            AttendanceStatus::Present
        };
        seed_record(pool, 102, "dev-1-prog1", date(2024, 6, day)?, status).await?;
    }
    sqlx::query(
        r#"
        UPDATE attendance_engine.attendance_records
        SET justification_reason = $1,
            justification_file_name = $2,
            justification_file_mime = $3,
            justification_file_data = ''
        WHERE student_id = 102 AND subject_id = 'dev-1-prog1' AND taken_on = $4
        "#,
    )
    .bind("Turno con el dentista, adjunto comprobante de asistencia a la consulta.")
    .bind("comprobante_dentista.pdf")
    .bind("application/pdf")
    .bind(date(2024, 6, 5)?)
    .execute(pool)
    .await?;

    // Lucia in Fotografía: clean card.
    for day in 1..=12u32 {
        seed_record(pool, 201, "des-1-photo", date(2024, 6, day)?, AttendanceStatus::Present)
            .await?;
    }

    // One thread waiting for moderation.
    sqlx::query(
        r#"
        INSERT INTO attendance_engine.forum_threads
        (id, author_id, title, content, career_id, year, status,
         rejection_reason, locked, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, FALSE, $8)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("7b1e9c2a-5a41-4b63-9f1d-0d6f2b6c9e01")?)
    .bind(102i64)
    .bind("¿Cómo instalar el entorno de desarrollo para Programación I?")
    .bind("Estoy teniendo problemas para configurar el entorno que pidió el profesor.")
    .bind("dev")
    .bind(1i32)
    .bind(ForumThreadStatus::Pending.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_record(
    pool: &PgPool,
    student_id: i64,
    subject_id: &str,
    taken_on: NaiveDate,
    status: AttendanceStatus,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance_engine.attendance_records
        (id, student_id, subject_id, taken_on, status)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (student_id, subject_id, taken_on) DO UPDATE
        SET status = EXCLUDED.status
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(subject_id)
    .bind(taken_on)
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

fn date(year: i32, month: u32, day: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).context("invalid date")
}

/// Imports attendance marks from a CSV file. Each row goes through the normal
/// marking path so re-marks update in place and notifications fire.
pub async fn import_csv(
    store: &mut PgStore,
    ids: &mut impl crate::store::IdSource,
    now: DateTime<Utc>,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: i64,
        subject_id: String,
        taken_on: NaiveDate,
        status: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut marked = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status: AttendanceStatus = row
            .status
            .parse()
            .with_context(|| format!("row for student {}", row.student_id))?;
        crate::service::mark_attendance(
            store,
            ids,
            now,
            row.student_id,
            &row.subject_id,
            row.taken_on,
            status,
        )
        .await?;
        marked += 1;
    }

    Ok(marked)
}
