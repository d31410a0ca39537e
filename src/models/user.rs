//! Account holder who owns measurements and receives access tokens.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;

use super::{
    id::{Id, new_id},
    validation::ValidationError,
};

/// bcrypt work factor used for new password hashes.
pub const PASSWORD_HASH_COST: u32 = 10;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("password could not be hashed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// A registered user. The cleartext password is never kept.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, ToSchema)]
pub struct User {
    #[schema(value_type = String, format = Uuid)]
    pub id: Id,
    pub name: String,
    pub email: String,

    /// bcrypt hash of the password, never serialized.
    #[serde(skip)]
    pub password_hash: String,
}

impl User {
    /// Hash `password` and build a validated user.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: &str,
    ) -> Result<Self, UserError> {
        // An empty cleartext must not turn into a non-empty hash.
        let password_hash = if password.is_empty() {
            String::new()
        } else {
            bcrypt::non_truncating_hash(password, PASSWORD_HASH_COST)?
        };

        let user = Self {
            id: new_id(),
            name: name.into(),
            email: email.into(),
            password_hash,
        };
        user.validate()?;
        Ok(user)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::NameRequired);
        }
        if self.email.is_empty() {
            return Err(ValidationError::EmailRequired);
        }
        if self.password_hash.is_empty() {
            return Err(ValidationError::PasswordRequired);
        }
        Ok(())
    }

    /// Compare `password` against the stored hash.
    ///
    /// Any failure, including a malformed stored hash, counts as a mismatch.
    pub fn validate_password(&self, password: &str) -> bool {
        bcrypt::non_truncating_verify(password, &self.password_hash).unwrap_or(false)
    }
}
