use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, QrSession};

/// Institute campus reference point.
pub const INSTITUTE_LOCATION: Coordinates = Coordinates {
    latitude: -34.6037,
    longitude: -58.3816,
};

/// Accepted distance from the institute, in meters.
pub const VALID_RADIUS_M: f64 = 100.0;

const SESSION_DURATION_MINUTES: i64 = 5;

pub fn session_duration() -> Duration {
    Duration::minutes(SESSION_DURATION_MINUTES)
}

/// Payload encoded into the QR image shown in class.
#[derive(Debug, Serialize, Deserialize)]
pub struct QrPayload {
    #[serde(rename = "sessionId")]
    pub session_id: uuid::Uuid,
}

/// Closed outcome set. The codes are what the client applications key their
/// messages on, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrOutcome {
    Success,
    Invalid,
    Expired,
    OutOfRange,
}

impl QrOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            QrOutcome::Success => "success",
            QrOutcome::Invalid => "error_invalid",
            QrOutcome::Expired => "error_expired",
            QrOutcome::OutOfRange => "error_location",
        }
    }
}

/// Haversine great-circle distance in meters.
pub fn distance_m(a: &Coordinates, b: &Coordinates) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Checks a known session against the clock and the student's reported
/// position. Malformed payloads and unknown session ids are mapped to
/// `Invalid` by the caller before a session ever reaches this point.
pub fn verify(session: &QrSession, now: DateTime<Utc>, location: &Coordinates) -> QrOutcome {
    if now > session.expires_at {
        return QrOutcome::Expired;
    }
    if distance_m(location, &session.location) > session.radius_m {
        return QrOutcome::OutOfRange;
    }
    QrOutcome::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session_created_at(created_at: DateTime<Utc>) -> QrSession {
        QrSession {
            id: Uuid::new_v4(),
            subject_id: "dev-1-prog1".to_string(),
            preceptor_id: 1,
            created_at,
            expires_at: created_at + session_duration(),
            location: INSTITUTE_LOCATION,
            radius_m: VALID_RADIUS_M,
        }
    }

    /// Offsets a coordinate north by roughly the requested number of meters.
    fn offset_north(origin: Coordinates, meters: f64) -> Coordinates {
        Coordinates {
            latitude: origin.latitude + meters / 111_320.0,
            longitude: origin.longitude,
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert!(distance_m(&INSTITUTE_LOCATION, &INSTITUTE_LOCATION) < 1e-9);
    }

    #[test]
    fn distance_approximates_known_offsets() {
        let fifty_m = offset_north(INSTITUTE_LOCATION, 50.0);
        let measured = distance_m(&INSTITUTE_LOCATION, &fifty_m);
        assert!((measured - 50.0).abs() < 1.0, "measured {measured}");
    }

    #[test]
    fn check_within_window_and_radius_succeeds() {
        let created = Utc::now();
        let session = session_created_at(created);
        let outcome = verify(
            &session,
            created + Duration::minutes(2),
            &offset_north(INSTITUTE_LOCATION, 30.0),
        );
        assert_eq!(outcome, QrOutcome::Success);
        assert_eq!(outcome.code(), "success");
    }

    #[test]
    fn session_expires_after_five_minutes() {
        let created = Utc::now();
        let session = session_created_at(created);
        let outcome = verify(
            &session,
            created + Duration::minutes(6),
            &INSTITUTE_LOCATION,
        );
        assert_eq!(outcome, QrOutcome::Expired);
        assert_eq!(outcome.code(), "error_expired");
    }

    #[test]
    fn checking_in_150m_away_is_out_of_range() {
        let created = Utc::now();
        let session = session_created_at(created);
        let outcome = verify(
            &session,
            created + Duration::minutes(1),
            &offset_north(INSTITUTE_LOCATION, 150.0),
        );
        assert_eq!(outcome, QrOutcome::OutOfRange);
        assert_eq!(outcome.code(), "error_location");
    }

    #[test]
    fn expiry_wins_over_location() {
        let created = Utc::now();
        let session = session_created_at(created);
        let outcome = verify(
            &session,
            created + Duration::minutes(10),
            &offset_north(INSTITUTE_LOCATION, 500.0),
        );
        assert_eq!(outcome, QrOutcome::Expired);
    }

    #[test]
    fn payload_parses_from_the_wire_shape() {
        let id = Uuid::new_v4();
        let payload: QrPayload =
            serde_json::from_str(&format!("{{\"sessionId\":\"{id}\"}}")).unwrap();
        assert_eq!(payload.session_id, id);

        assert!(serde_json::from_str::<QrPayload>("not json").is_err());
        assert!(serde_json::from_str::<QrPayload>("{}").is_err());
    }
}
