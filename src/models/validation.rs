use thiserror::Error;

/// A single failed field rule.
///
/// Entities check their fields in a fixed order and report only the first
/// failure, so callers can rely on which variant comes back.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is required")]
    ValueRequired,
    #[error("invalid value")]
    InvalidValue,
    #[error("image is required")]
    ImageRequired,
    #[error("invalid image")]
    InvalidImage,
    #[error("type is required")]
    TypeRequired,
    #[error("invalid type")]
    InvalidType,
    #[error("user is required")]
    UserRequired,
    #[error("invalid user")]
    InvalidUser,
    #[error("name is required")]
    NameRequired,
    #[error("email is required")]
    EmailRequired,
    #[error("password is required")]
    PasswordRequired,
}
