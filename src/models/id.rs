//! Entity identifiers.
//!
//! Identifiers are UUIDv7 values: unique with overwhelming probability and
//! ordered by creation time, so sorting by id roughly matches insertion order.

use thiserror::Error;
use uuid::Uuid;

/// Identifier shared by every entity in the service.
pub type Id = Uuid;

/// Returned when a string is not a syntactically valid identifier.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid identifier `{0}`")]
pub struct InvalidId(pub String);

/// Generate a fresh, time-ordered identifier.
pub fn new_id() -> Id {
    Uuid::now_v7()
}

/// Parse an identifier from its textual form.
pub fn parse_id(raw: &str) -> Result<Id, InvalidId> {
    Uuid::parse_str(raw.trim()).map_err(|_| InvalidId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_unique_and_ordered() {
        let first = new_id();
        let second = new_id();

        assert_ne!(first, second);
        assert!(first < second);
    }

    #[test]
    fn test_parse_id_round_trips_display() {
        let id = new_id();
        assert_eq!(parse_id(&id.to_string()), Ok(id));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(parse_id("").is_err());
        assert!(parse_id("not-an-id").is_err());
        assert!(parse_id("0190f0c4-1e2b-7c3d-8e4f").is_err());
    }
}
