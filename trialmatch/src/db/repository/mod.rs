mod evaluations;
mod organizations;
mod patients;
mod runs;
mod trials;

pub use evaluations::EvaluationRepository;
pub use organizations::OrganizationRepository;
pub use patients::PatientRepository;
pub use runs::RunRepository;
pub use trials::TrialRepository;

use chrono::{DateTime, Utc};

pub(crate) fn parse_datetime(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_optional_datetime(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decode an F32_BLOB column back into a vector. libsql stores vectors as
/// packed little-endian f32.
pub(crate) fn vector_from_blob(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_from_blob_round_trip() {
        let original = [0.25f32, -1.5, 3.0];
        let bytes: Vec<u8> = original.iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(vector_from_blob(&bytes), original.to_vec());
    }

    #[test]
    fn test_vector_from_blob_ignores_trailing_bytes() {
        let mut bytes = 1.0f32.to_le_bytes().to_vec();
        bytes.push(0xff);
        assert_eq!(vector_from_blob(&bytes), vec![1.0]);
    }

    #[test]
    fn test_parse_datetime_invalid_falls_back_to_now() {
        let parsed = parse_datetime("not-a-date");
        assert!((Utc::now() - parsed).num_seconds().abs() < 5);
    }

    #[test]
    fn test_parse_optional_datetime() {
        assert_eq!(parse_optional_datetime(None), None);
        assert_eq!(parse_optional_datetime(Some("garbage".to_string())), None);
        let parsed = parse_optional_datetime(Some("2026-01-02T03:04:05Z".to_string())).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }
}
