//! Justification lifecycle for a single attendance record.
//!
//! absent --request--> pending --approve--> justified
//!                            \--reject---> absent
//!
//! Both resolutions clear the stored reason and file.

use crate::error::RuleError;
use crate::models::{AttendanceRecord, AttendanceStatus, JustificationFile};

pub fn request(
    record: &mut AttendanceRecord,
    reason: String,
    file: Option<JustificationFile>,
) -> Result<(), RuleError> {
    if record.status != AttendanceStatus::Absent {
        return Err(RuleError::JustificationNotAbsent(record.status));
    }
    record.status = AttendanceStatus::PendingJustification;
    record.justification_reason = Some(reason);
    record.justification_file = file;
    Ok(())
}

pub fn resolve(record: &mut AttendanceRecord, approved: bool) -> Result<(), RuleError> {
    if record.status != AttendanceStatus::PendingJustification {
        return Err(RuleError::JustificationNotPending(record.status));
    }
    record.status = if approved {
        AttendanceStatus::Justified
    } else {
        AttendanceStatus::Absent
    };
    record.justification_reason = None;
    record.justification_file = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn absent_record() -> AttendanceRecord {
        AttendanceRecord::new(
            Uuid::new_v4(),
            102,
            "dev-1-prog1",
            NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
            AttendanceStatus::Absent,
        )
    }

    fn dentist_file() -> JustificationFile {
        JustificationFile {
            name: "comprobante_dentista.pdf".to_string(),
            mime: "application/pdf".to_string(),
            content_base64: String::new(),
        }
    }

    #[test]
    fn approve_round_trip_leaves_no_residue() {
        let mut record = absent_record();
        request(
            &mut record,
            "Turno con el dentista.".to_string(),
            Some(dentist_file()),
        )
        .unwrap();
        assert_eq!(record.status, AttendanceStatus::PendingJustification);
        assert!(record.justification_reason.is_some());
        assert!(record.justification_file.is_some());

        resolve(&mut record, true).unwrap();
        assert_eq!(record.status, AttendanceStatus::Justified);
        assert_eq!(record.justification_reason, None);
        assert_eq!(record.justification_file, None);
    }

    #[test]
    fn reject_returns_to_absent_and_clears_attachment() {
        let mut record = absent_record();
        request(&mut record, "Paro de transporte.".to_string(), None).unwrap();
        resolve(&mut record, false).unwrap();
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert_eq!(record.justification_reason, None);
        assert_eq!(record.justification_file, None);
    }

    #[test]
    fn request_requires_an_absence() {
        let mut record = absent_record();
        record.status = AttendanceStatus::Present;
        let err = request(&mut record, "x".to_string(), None).unwrap_err();
        assert_eq!(
            err,
            RuleError::JustificationNotAbsent(AttendanceStatus::Present)
        );

        // Justified records cannot re-enter the workflow either.
        record.status = AttendanceStatus::Justified;
        assert!(request(&mut record, "x".to_string(), None).is_err());
    }

    #[test]
    fn resolve_requires_a_pending_request() {
        let mut record = absent_record();
        let err = resolve(&mut record, true).unwrap_err();
        assert_eq!(
            err,
            RuleError::JustificationNotPending(AttendanceStatus::Absent)
        );
    }

    #[test]
    fn rejected_absence_can_be_requested_again() {
        let mut record = absent_record();
        request(&mut record, "Primera solicitud.".to_string(), None).unwrap();
        resolve(&mut record, false).unwrap();
        assert!(request(&mut record, "Segunda solicitud.".to_string(), None).is_ok());
    }
}
