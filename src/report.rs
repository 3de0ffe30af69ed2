use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{AttendanceRecord, AttendanceStatus, Standing, Subject, User};
use crate::standing;

#[derive(Debug, Clone)]
pub struct SubjectStanding {
    pub student_id: i64,
    pub student_name: String,
    pub subject_id: String,
    pub subject_name: String,
    pub standing: Standing,
}

/// Evaluates every (student, subject) pair present in the record set. Sorted
/// worst-first: libre students lead, then lowest presentism.
pub fn standings(
    records: &[AttendanceRecord],
    students: &[User],
    subjects: &[Subject],
) -> Vec<SubjectStanding> {
    let mut by_pair: HashMap<(i64, &str), Vec<&AttendanceRecord>> = HashMap::new();
    for record in records {
        by_pair
            .entry((record.student_id, record.subject_id.as_str()))
            .or_default()
            .push(record);
    }

    let mut results: Vec<SubjectStanding> = by_pair
        .into_iter()
        .map(|((student_id, subject_id), pair_records)| {
            let owned: Vec<AttendanceRecord> =
                pair_records.into_iter().cloned().collect();
            let student_name = students
                .iter()
                .find(|u| u.id == student_id)
                .map(|u| u.name.clone())
                .unwrap_or_else(|| format!("Alumno {student_id}"));
            let subject_name = subjects
                .iter()
                .find(|s| s.id == subject_id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| subject_id.to_string());
            SubjectStanding {
                student_id,
                student_name,
                subject_id: subject_id.to_string(),
                subject_name,
                standing: standing::evaluate(&owned),
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.standing
            .is_libre
            .cmp(&a.standing.is_libre)
            .then(
                a.standing
                    .attendance_percent
                    .partial_cmp(&b.standing.attendance_percent)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.student_id.cmp(&b.student_id))
    });
    results
}

pub fn build_report(
    records: &[AttendanceRecord],
    students: &[User],
    subjects: &[Subject],
) -> String {
    let all = standings(records, students, subjects);
    let mut output = String::new();

    let _ = writeln!(output, "# Reporte de Asistencia");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Alumnos Libres");

    let libres: Vec<&SubjectStanding> = all.iter().filter(|s| s.standing.is_libre).collect();
    if libres.is_empty() {
        let _ = writeln!(output, "Ningún alumno quedó libre.");
    } else {
        for entry in &libres {
            let _ = writeln!(
                output,
                "- {} en {}: {} faltas, presentismo {:.1}%",
                entry.student_name,
                entry.subject_name,
                entry.standing.absences,
                entry.standing.attendance_percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alumnos en Riesgo");

    let warned: Vec<&SubjectStanding> = all
        .iter()
        .filter(|s| {
            !s.standing.is_libre
                && (s.standing.is_warning_absences || s.standing.is_warning_percent)
        })
        .collect();
    if warned.is_empty() {
        let _ = writeln!(output, "Ningún alumno en zona de alerta.");
    } else {
        for entry in &warned {
            let _ = writeln!(
                output,
                "- {} en {}: {} faltas, presentismo {:.1}%",
                entry.student_name,
                entry.subject_name,
                entry.standing.absences,
                entry.standing.attendance_percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Justificaciones Pendientes");

    let pending: Vec<&AttendanceRecord> = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::PendingJustification)
        .collect();
    if pending.is_empty() {
        let _ = writeln!(output, "No hay solicitudes pendientes.");
    } else {
        for record in &pending {
            let student_name = students
                .iter()
                .find(|u| u.id == record.student_id)
                .map(|u| u.name.as_str())
                .unwrap_or("Alumno desconocido");
            let _ = writeln!(
                output,
                "- {} ({}, {}): {}",
                student_name,
                record.subject_id,
                record.taken_on,
                record
                    .justification_reason
                    .as_deref()
                    .unwrap_or("sin motivo")
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn student(id: i64, name: &str) -> User {
        User {
            id,
            name: name.to_string(),
            email: format!("{id}@dev.com"),
            role: Role::Student,
            career_id: "dev".to_string(),
            year: 1,
        }
    }

    fn record(student_id: i64, subject_id: &str, day: u32, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord::new(
            Uuid::new_v4(),
            student_id,
            subject_id,
            NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            status,
        )
    }

    fn fixtures() -> (Vec<AttendanceRecord>, Vec<User>, Vec<Subject>) {
        let mut records = Vec::new();
        // Juan: 9 absences -> libre.
        for day in 1..=9 {
            records.push(record(101, "dev-1-algo", day, AttendanceStatus::Absent));
        }
        for day in 10..=15 {
            records.push(record(101, "dev-1-algo", day, AttendanceStatus::Present));
        }
        // Maria: clean, with one pending justification.
        for day in 1..=9 {
            records.push(record(102, "dev-1-prog1", day, AttendanceStatus::Present));
        }
        let mut pending = record(102, "dev-1-prog1", 10, AttendanceStatus::PendingJustification);
        pending.justification_reason = Some("Turno con el dentista.".to_string());
        records.push(pending);

        let students = vec![student(101, "Juan Perez"), student(102, "Maria Lopez")];
        let subjects = vec![
            Subject {
                id: "dev-1-algo".to_string(),
                name: "Algoritmos y Estructuras de Datos".to_string(),
                career_id: "dev".to_string(),
                year: 1,
            },
            Subject {
                id: "dev-1-prog1".to_string(),
                name: "Programación I".to_string(),
                career_id: "dev".to_string(),
                year: 1,
            },
        ];
        (records, students, subjects)
    }

    #[test]
    fn libre_pairs_sort_first() {
        let (records, students, subjects) = fixtures();
        let all = standings(&records, &students, &subjects);
        assert_eq!(all.len(), 2);
        assert!(all[0].standing.is_libre);
        assert_eq!(all[0].student_name, "Juan Perez");
        assert!(!all[1].standing.is_libre);
    }

    #[test]
    fn report_lists_libres_and_pending_justifications() {
        let (records, students, subjects) = fixtures();
        let report = build_report(&records, &students, &subjects);
        assert!(report.contains("## Alumnos Libres"));
        assert!(report.contains("Juan Perez en Algoritmos y Estructuras de Datos"));
        assert!(report.contains("## Justificaciones Pendientes"));
        assert!(report.contains("Maria Lopez (dev-1-prog1, 2024-06-10): Turno con el dentista."));
    }

    #[test]
    fn empty_record_set_produces_the_calm_report() {
        let report = build_report(&[], &[], &[]);
        assert!(report.contains("Ningún alumno quedó libre."));
        assert!(report.contains("Ningún alumno en zona de alerta."));
        assert!(report.contains("No hay solicitudes pendientes."));
    }
}
