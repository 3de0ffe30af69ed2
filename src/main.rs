use std::path::PathBuf;

use anyhow::Context;
use base64::Engine;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod db;
mod error;
mod forum;
mod justification;
mod models;
mod notify;
mod prefs;
mod qr;
mod report;
mod service;
mod standing;
mod store;

use models::{AttendanceStatus, Coordinates, JustificationFile};
use store::{RandomIds, RecordStore};

#[derive(Parser)]
#[command(name = "attendance-engine")]
#[command(about = "Attendance standing and notification rule engine for the institute", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance marks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Mark (or re-mark) a student's attendance for one class day
    Mark {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: String,
        /// Class date, YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// One of: present, absent, justified, pending_justification
        #[arg(long)]
        status: String,
    },
    /// Show standings per student and subject
    Standing {
        #[arg(long)]
        student: Option<i64>,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Manage absence justifications
    #[command(subcommand)]
    Justify(JustifyCommands),
    /// Manage forum threads and their moderation
    #[command(subcommand)]
    Thread(ThreadCommands),
    /// QR check-in sessions
    #[command(subcommand)]
    Qr(QrCommands),
    /// Send an announcement to students
    Announce {
        #[arg(long)]
        text: String,
        #[arg(long)]
        career: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// List a user's notifications
    Notifications {
        #[arg(long)]
        user: i64,
        /// Also flip everything unread to read
        #[arg(long, default_value_t = false)]
        mark_read: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Read or change persisted appearance preferences
    #[command(subcommand)]
    Prefs(PrefsCommands),
}

#[derive(Subcommand)]
enum JustifyCommands {
    /// Request justification for an absence
    Request {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        reason: String,
        /// Supporting document to attach
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Approve a pending justification
    Approve {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        date: String,
    },
    /// Reject a pending justification
    Reject {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        date: String,
    },
}

#[derive(Subcommand)]
enum ThreadCommands {
    /// Post a new thread into the moderation queue
    Post {
        #[arg(long)]
        author: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Author rework of a thread sent back for revision
    Edit {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Moderate a pending thread
    Moderate {
        #[arg(long)]
        id: Uuid,
        /// One of: approve, reject, needs-revision
        #[arg(long)]
        decision: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Lock or unlock a thread
    Lock {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum QrCommands {
    /// Open a five-minute check-in session for a subject
    CreateSession {
        #[arg(long)]
        preceptor: i64,
        #[arg(long)]
        subject: String,
    },
    /// Verify a scanned token at a reported position
    Verify {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        token: String,
        #[arg(long)]
        latitude: f64,
        #[arg(long)]
        longitude: f64,
    },
}

#[derive(Subcommand)]
enum PrefsCommands {
    /// Print one preference, or all of them
    Get {
        key: Option<String>,
        #[arg(long, default_value = "attendance-prefs.json")]
        file: PathBuf,
    },
    /// Change a preference
    Set {
        key: String,
        value: String,
        #[arg(long, default_value = "attendance-prefs.json")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Preferences are local state; they never touch the database.
    let command = match cli.command {
        Commands::Prefs(command) => return handle_prefs(command),
        command => command,
    };

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let mut store = db::PgStore::new(pool);
    let mut ids = RandomIds;
    let now = Utc::now();

    match command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(store.pool()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let marked = db::import_csv(&mut store, &mut ids, now, &csv).await?;
            println!("Marked {marked} attendance records from {}.", csv.display());
        }
        Commands::Mark {
            student,
            subject,
            date,
            status,
        } => {
            let outcome = service::mark_attendance(
                &mut store,
                &mut ids,
                now,
                student,
                &subject,
                parse_date(&date)?,
                status.parse::<AttendanceStatus>()?,
            )
            .await?;
            println!(
                "Marked {} for student {student} in {subject} on {date}.",
                outcome.record.status
            );
            for notification in &outcome.notifications {
                println!(
                    "  -> [{}] {}",
                    notification.kind.label(),
                    notification.text
                );
            }
        }
        Commands::Standing { student, subject } => {
            let records = store.all_records().await?;
            let students = store.list_students(None, None).await?;
            let subjects = store.list_subjects().await?;
            let standings = report::standings(&records, &students, &subjects);

            let mut shown = 0usize;
            for entry in standings.iter().filter(|e| {
                student.map_or(true, |id| e.student_id == id)
                    && subject.as_deref().map_or(true, |s| e.subject_id == s)
            }) {
                println!(
                    "- {} en {}: presentismo {:.1}%, {} faltas de {} clases{}",
                    entry.student_name,
                    entry.subject_name,
                    entry.standing.attendance_percent,
                    entry.standing.absences,
                    entry.standing.total_classes,
                    if entry.standing.is_libre { " [LIBRE]" } else { "" }
                );
                shown += 1;
            }
            if shown == 0 {
                println!("No attendance records for this scope.");
            }
        }
        Commands::Justify(command) => match command {
            JustifyCommands::Request {
                student,
                subject,
                date,
                reason,
                file,
            } => {
                let attachment = file.map(read_attachment).transpose()?;
                service::request_justification(
                    &mut store,
                    &mut ids,
                    now,
                    student,
                    &subject,
                    parse_date(&date)?,
                    reason,
                    attachment,
                )
                .await?;
                println!("Justification requested; the preceptor has been notified.");
            }
            JustifyCommands::Approve {
                student,
                subject,
                date,
            } => {
                service::resolve_justification(
                    &mut store,
                    &mut ids,
                    now,
                    student,
                    &subject,
                    parse_date(&date)?,
                    true,
                )
                .await?;
                println!("Justification approved.");
            }
            JustifyCommands::Reject {
                student,
                subject,
                date,
            } => {
                service::resolve_justification(
                    &mut store,
                    &mut ids,
                    now,
                    student,
                    &subject,
                    parse_date(&date)?,
                    false,
                )
                .await?;
                println!("Justification rejected.");
            }
        },
        Commands::Thread(command) => match command {
            ThreadCommands::Post {
                author,
                title,
                content,
            } => {
                let thread =
                    service::post_thread(&mut store, &mut ids, now, author, title, content)
                        .await?;
                println!("Thread {} posted, awaiting moderation.", thread.id);
            }
            ThreadCommands::Edit { id, title, content } => {
                let thread = service::edit_thread(&mut store, id, title, content).await?;
                println!("Thread {} updated, back in the moderation queue.", thread.id);
            }
            ThreadCommands::Moderate {
                id,
                decision,
                reason,
            } => {
                let decision = parse_decision(&decision)?;
                let thread =
                    service::moderate_thread(&mut store, &mut ids, now, id, decision, reason)
                        .await?;
                println!("Thread {} is now {}.", thread.id, thread.status);
            }
            ThreadCommands::Lock { id } => {
                let thread = service::toggle_thread_lock(&mut store, id).await?;
                println!(
                    "Thread {} is now {}.",
                    thread.id,
                    if thread.locked { "locked" } else { "unlocked" }
                );
            }
        },
        Commands::Qr(command) => match command {
            QrCommands::CreateSession { preceptor, subject } => {
                let session =
                    service::create_qr_session(&mut store, &mut ids, now, preceptor, &subject)
                        .await?;
                let token = serde_json::to_string(&qr::QrPayload {
                    session_id: session.id,
                })?;
                println!("Session open until {}.", session.expires_at);
                println!("Token: {token}");
            }
            QrCommands::Verify {
                student,
                token,
                latitude,
                longitude,
            } => {
                let outcome = service::verify_qr_checkin(
                    &mut store,
                    &mut ids,
                    now,
                    student,
                    &token,
                    Coordinates {
                        latitude,
                        longitude,
                    },
                )
                .await?;
                println!("{}", outcome.code());
            }
        },
        Commands::Announce { text, career, year } => {
            let delivered = service::announce(
                &mut store,
                &mut ids,
                now,
                &text,
                career.as_deref(),
                year,
            )
            .await?;
            println!("Announcement delivered to {delivered} students.");
        }
        Commands::Notifications { user, mark_read } => {
            let notifications = store.notifications_for(user).await?;
            if notifications.is_empty() {
                println!("No notifications for user {user}.");
            }
            for notification in &notifications {
                println!(
                    "- [{}] {}{}{}",
                    notification.kind.label(),
                    notification.text,
                    notification
                        .details
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default(),
                    if notification.read { "" } else { " *" }
                );
            }
            if mark_read {
                let changed = store.mark_notifications_read(user).await?;
                println!("Marked {changed} notifications as read.");
            }
        }
        Commands::Report { out } => {
            let records = store.all_records().await?;
            let students = store.list_students(None, None).await?;
            let subjects = store.list_subjects().await?;
            let report = report::build_report(&records, &students, &subjects);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Prefs(_) => unreachable!("handled before connecting"),
    }

    Ok(())
}

fn handle_prefs(command: PrefsCommands) -> anyhow::Result<()> {
    match command {
        PrefsCommands::Get { key, file } => {
            let prefs = prefs::Preferences::load(&file)?;
            match key {
                Some(key) => {
                    let key: prefs::PrefKey = key.parse()?;
                    println!("{}", prefs.get(key));
                }
                None => {
                    for key in [
                        prefs::PrefKey::Theme,
                        prefs::PrefKey::BorderStyle,
                        prefs::PrefKey::FontStyle,
                    ] {
                        println!("{} = {}", key.name(), prefs.get(key));
                    }
                }
            }
        }
        PrefsCommands::Set { key, value, file } => {
            let key: prefs::PrefKey = key.parse()?;
            let mut prefs = prefs::Preferences::load(&file)?;
            prefs.set(key, &value)?;
            prefs.save(&file)?;
            println!("{} = {value}", key.name());
        }
    }
    Ok(())
}

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    value
        .parse::<NaiveDate>()
        .with_context(|| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

fn parse_decision(value: &str) -> anyhow::Result<forum::ModerationDecision> {
    match value {
        "approve" => Ok(forum::ModerationDecision::Approve),
        "reject" => Ok(forum::ModerationDecision::Reject),
        "needs-revision" => Ok(forum::ModerationDecision::NeedsRevision),
        other => Err(anyhow::anyhow!(
            "unknown decision '{other}', expected approve, reject or needs-revision"
        )),
    }
}

fn read_attachment(path: PathBuf) -> anyhow::Result<JustificationFile> {
    let bytes = std::fs::read(&path)
        .with_context(|| format!("failed to read attachment {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "adjunto".to_string());
    let mime = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();
    Ok(JustificationFile {
        name,
        mime,
        content_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}
