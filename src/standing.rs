use crate::models::{AttendanceRecord, AttendanceStatus, Standing};

pub const ABSENCE_LIMIT: usize = 8;
pub const MINIMUM_PRESENTISM: f64 = 70.0;
pub const CLASS_COUNT_THRESHOLD_FOR_LIBRE: usize = 10;

/// Upper bound of the low-presentism warning band. A student at or above the
/// minimum but under this value is warned before they actually go libre.
pub const WARNING_PRESENTISM_CEILING: f64 = 75.0;

/// Why a student went libre in a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibreReason {
    AbsenceLimit,
    LowPresentism,
}

/// Computes a student's standing in one subject from their full record set for
/// that pair. Pure single pass; an empty set means 100% attendance and no
/// warnings.
pub fn evaluate(records: &[AttendanceRecord]) -> Standing {
    let total = records.len();
    if total == 0 {
        return Standing {
            total_classes: 0,
            absences: 0,
            attendance_percent: 100.0,
            is_libre: false,
            is_warning_absences: false,
            is_warning_percent: false,
        };
    }

    let mut absences = 0usize;
    let mut covered = 0usize;
    for record in records {
        if record.status == AttendanceStatus::Absent {
            absences += 1;
        }
        if record.status.counts_as_covered() {
            covered += 1;
        }
    }

    let attendance_percent = (covered as f64 / total as f64) * 100.0;
    let under_threshold =
        total >= CLASS_COUNT_THRESHOLD_FOR_LIBRE && attendance_percent < MINIMUM_PRESENTISM;

    Standing {
        total_classes: total,
        absences,
        attendance_percent,
        is_libre: absences > ABSENCE_LIMIT || under_threshold,
        is_warning_absences: ABSENCE_LIMIT.checked_sub(absences) == Some(3),
        is_warning_percent: total >= CLASS_COUNT_THRESHOLD_FOR_LIBRE
            && attendance_percent >= MINIMUM_PRESENTISM
            && attendance_percent < WARNING_PRESENTISM_CEILING,
    }
}

/// The absence-count clause takes precedence when both hold.
pub fn libre_reason(standing: &Standing) -> Option<LibreReason> {
    if !standing.is_libre {
        return None;
    }
    if standing.absences > ABSENCE_LIMIT {
        Some(LibreReason::AbsenceLimit)
    } else {
        Some(LibreReason::LowPresentism)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn records_with(statuses: &[(AttendanceStatus, usize)]) -> Vec<AttendanceRecord> {
        let mut records = Vec::new();
        let mut day = 0u32;
        for (status, count) in statuses {
            for _ in 0..*count {
                day += 1;
                let taken_on =
                    NaiveDate::from_ymd_opt(2024, 1 + day / 28, 1 + day % 28).unwrap();
                records.push(AttendanceRecord::new(
                    Uuid::new_v4(),
                    101,
                    "dev-1-algo",
                    taken_on,
                    *status,
                ));
            }
        }
        records
    }

    #[test]
    fn empty_record_set_is_full_attendance() {
        let standing = evaluate(&[]);
        assert_eq!(standing.total_classes, 0);
        assert_eq!(standing.attendance_percent, 100.0);
        assert!(!standing.is_libre);
        assert!(!standing.is_warning_absences);
        assert!(!standing.is_warning_percent);
    }

    #[test]
    fn exceeding_absence_limit_means_libre_regardless_of_percent() {
        // 9 absences out of 100 classes keeps the percentage high.
        let records = records_with(&[
            (AttendanceStatus::Present, 91),
            (AttendanceStatus::Absent, 9),
        ]);
        let standing = evaluate(&records);
        assert!(standing.attendance_percent > 90.0);
        assert!(standing.is_libre);
        assert_eq!(libre_reason(&standing), Some(LibreReason::AbsenceLimit));
    }

    #[test]
    fn low_presentism_means_libre_even_within_absence_limit() {
        // total=10, present=6, absent=4 -> 60% and only 4 absences.
        let records = records_with(&[
            (AttendanceStatus::Present, 6),
            (AttendanceStatus::Absent, 4),
        ]);
        let standing = evaluate(&records);
        assert_eq!(standing.total_classes, 10);
        assert_eq!(standing.absences, 4);
        assert!((standing.attendance_percent - 60.0).abs() < f64::EPSILON);
        assert!(standing.is_libre);
        assert_eq!(libre_reason(&standing), Some(LibreReason::LowPresentism));
    }

    #[test]
    fn percent_threshold_needs_enough_classes() {
        // 60% but only 5 classes: not libre yet.
        let records = records_with(&[
            (AttendanceStatus::Present, 3),
            (AttendanceStatus::Absent, 2),
        ]);
        let standing = evaluate(&records);
        assert!(!standing.is_libre);
        assert!(!standing.is_warning_percent);
    }

    #[test]
    fn nine_straight_absences_is_libre_by_absence_count() {
        let records = records_with(&[(AttendanceStatus::Absent, 9)]);
        let standing = evaluate(&records);
        assert!(standing.is_libre);
        // 0% also breaches presentism, but the absence clause wins.
        assert_eq!(libre_reason(&standing), Some(LibreReason::AbsenceLimit));
    }

    #[test]
    fn warning_fires_exactly_at_three_remaining_absences() {
        let at_five = records_with(&[
            (AttendanceStatus::Present, 20),
            (AttendanceStatus::Absent, 5),
        ]);
        assert!(evaluate(&at_five).is_warning_absences);

        let at_four = records_with(&[
            (AttendanceStatus::Present, 20),
            (AttendanceStatus::Absent, 4),
        ]);
        assert!(!evaluate(&at_four).is_warning_absences);

        let at_six = records_with(&[
            (AttendanceStatus::Present, 20),
            (AttendanceStatus::Absent, 6),
        ]);
        assert!(!evaluate(&at_six).is_warning_absences);
    }

    #[test]
    fn percent_warning_band_sits_between_minimum_and_ceiling() {
        // 72% with 25 classes: warned, not libre.
        let records = records_with(&[
            (AttendanceStatus::Present, 18),
            (AttendanceStatus::Absent, 7),
        ]);
        let standing = evaluate(&records);
        assert!(standing.attendance_percent >= MINIMUM_PRESENTISM);
        assert!(standing.attendance_percent < WARNING_PRESENTISM_CEILING);
        assert!(standing.is_warning_percent);
        assert!(!standing.is_libre);

        // 80%: comfortably clear.
        let records = records_with(&[
            (AttendanceStatus::Present, 20),
            (AttendanceStatus::Absent, 5),
        ]);
        assert!(!evaluate(&records).is_warning_percent);
    }

    #[test]
    fn justified_and_pending_count_toward_presentism() {
        let records = records_with(&[
            (AttendanceStatus::Present, 5),
            (AttendanceStatus::Justified, 3),
            (AttendanceStatus::PendingJustification, 2),
            (AttendanceStatus::Absent, 2),
        ]);
        let standing = evaluate(&records);
        assert_eq!(standing.total_classes, 12);
        assert_eq!(standing.absences, 2);
        let expected = 10.0 / 12.0 * 100.0;
        assert!((standing.attendance_percent - expected).abs() < 0.001);
    }
}
