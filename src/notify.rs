use crate::models::{NotificationDraft, NotificationKind, Standing};
use crate::standing::{self, LibreReason, ABSENCE_LIMIT, MINIMUM_PRESENTISM};

/// Alerts to emit after a record transitions into absent, given the student's
/// standing before and after the mutation. Going libre suppresses the
/// threshold warnings; the two warnings are otherwise independent and may both
/// fire in the same call.
pub fn absence_alerts(
    student_id: i64,
    subject_name: &str,
    before: &Standing,
    after: &Standing,
) -> Vec<NotificationDraft> {
    let mut alerts = Vec::new();

    if after.is_libre && !before.is_libre {
        let details = match standing::libre_reason(after) {
            Some(LibreReason::AbsenceLimit) => {
                format!("Has superado el límite de {ABSENCE_LIMIT} faltas.")
            }
            _ => format!(
                "Tu presentismo ({:.1}%) es menor al mínimo requerido.",
                after.attendance_percent
            ),
        };
        alerts.push(NotificationDraft {
            user_id: student_id,
            kind: NotificationKind::AttendanceStatusLibre,
            text: format!("Condición: Libre en {subject_name}"),
            details: Some(details),
        });
        return alerts;
    }

    if after.is_warning_absences && !before.is_warning_absences {
        alerts.push(NotificationDraft {
            user_id: student_id,
            kind: NotificationKind::AttendanceWarning,
            text: format!("Alerta de Asistencia en {subject_name}"),
            details: Some("Te quedan solo 3 faltas para alcanzar el límite.".to_string()),
        });
    }

    if after.is_warning_percent && !before.is_warning_percent {
        alerts.push(NotificationDraft {
            user_id: student_id,
            kind: NotificationKind::AttendanceWarning,
            text: format!("Alerta de Asistencia en {subject_name}"),
            details: Some(format!(
                "Tu presentismo es del {:.1}%. ¡Cuidado! El mínimo es {MINIMUM_PRESENTISM}%.",
                after.attendance_percent
            )),
        });
    }

    alerts
}

/// Fixed notification for a brand-new absence record.
pub fn new_absence(student_id: i64, subject_name: &str) -> NotificationDraft {
    NotificationDraft {
        user_id: student_id,
        kind: NotificationKind::Absence,
        text: "Se ha registrado una nueva falta.".to_string(),
        details: Some(format!("Materia: {subject_name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_standing() -> Standing {
        Standing {
            total_classes: 10,
            absences: 2,
            attendance_percent: 80.0,
            is_libre: false,
            is_warning_absences: false,
            is_warning_percent: false,
        }
    }

    #[test]
    fn going_libre_suppresses_other_warnings() {
        let before = quiet_standing();
        let after = Standing {
            absences: 9,
            attendance_percent: 40.0,
            is_libre: true,
            is_warning_absences: true,
            is_warning_percent: true,
            ..before
        };

        let alerts = absence_alerts(101, "Algoritmos y Estructuras de Datos", &before, &after);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, NotificationKind::AttendanceStatusLibre);
        assert_eq!(
            alerts[0].text,
            "Condición: Libre en Algoritmos y Estructuras de Datos"
        );
        assert_eq!(
            alerts[0].details.as_deref(),
            Some("Has superado el límite de 8 faltas.")
        );
    }

    #[test]
    fn libre_by_presentism_reports_the_percentage() {
        let before = quiet_standing();
        let after = Standing {
            absences: 4,
            attendance_percent: 60.0,
            is_libre: true,
            ..before
        };

        let alerts = absence_alerts(101, "Programación I", &before, &after);
        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts[0].details.as_deref(),
            Some("Tu presentismo (60.0%) es menor al mínimo requerido.")
        );
    }

    #[test]
    fn already_libre_stays_silent() {
        let mut before = quiet_standing();
        before.is_libre = true;
        let after = Standing {
            absences: 10,
            ..before
        };
        assert!(absence_alerts(101, "Programación I", &before, &after).is_empty());
    }

    #[test]
    fn both_warnings_may_fire_in_one_call() {
        let before = quiet_standing();
        let after = Standing {
            absences: 5,
            attendance_percent: 72.0,
            is_warning_absences: true,
            is_warning_percent: true,
            ..before
        };

        let alerts = absence_alerts(101, "Bases de Datos", &before, &after);
        assert_eq!(alerts.len(), 2);
        assert!(alerts
            .iter()
            .all(|a| a.kind == NotificationKind::AttendanceWarning));
        assert_eq!(
            alerts[0].details.as_deref(),
            Some("Te quedan solo 3 faltas para alcanzar el límite.")
        );
        assert_eq!(
            alerts[1].details.as_deref(),
            Some("Tu presentismo es del 72.0%. ¡Cuidado! El mínimo es 70%.")
        );
    }

    #[test]
    fn no_transition_means_no_alerts() {
        let before = quiet_standing();
        let after = Standing {
            absences: 3,
            attendance_percent: 77.0,
            ..before
        };
        assert!(absence_alerts(101, "Fotografía", &before, &after).is_empty());
    }
}
