//! A single meter reading and the rules it must satisfy.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use url::Url;
use utoipa::ToSchema;

use super::{
    id::{Id, new_id, parse_id},
    validation::ValidationError,
};

/// Type code for a water meter.
pub const WATER: &str = "1";
/// Type code for a gas meter.
pub const GAS: &str = "2";

/// How the `image` field of a measurement is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageEncoding {
    /// The image payload itself, standard base64.
    #[default]
    Base64,
    /// An absolute `http(s)` URL pointing at the hosted image.
    Url,
}

impl ImageEncoding {
    /// Whether `image` is well-formed for this encoding. Emptiness is checked separately.
    pub fn accepts(self, image: &str) -> bool {
        match self {
            Self::Base64 => decode_base64(image).is_ok(),
            Self::Url => Url::parse(image)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
                .unwrap_or(false),
        }
    }
}

impl FromStr for ImageEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            "url" => Ok(Self::Url),
            other => Err(format!("unknown image encoding `{other}` (expected base64 or url)")),
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64 => f.write_str("base64"),
            Self::Url => f.write_str("url"),
        }
    }
}

/// A water or gas meter reading.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, ToSchema)]
pub struct Measurement {
    /// Time-ordered identifier assigned at creation.
    #[schema(value_type = String, format = Uuid)]
    pub id: Id,

    /// Numeric reading extracted from the photograph.
    pub value: i64,

    /// Base64 payload or hosted URL, depending on the deployment's [`ImageEncoding`].
    pub image: String,

    /// Meter category code, [`WATER`] or [`GAS`].
    #[serde(rename = "type")]
    #[schema(example = "1")]
    pub kind: String,

    /// Set by the confirmation workflow; always false for new readings.
    pub confirmed: bool,

    /// Identifier of the owning user, kept in its textual form.
    pub user: String,

    pub created_at: DateTime<Utc>,
}

impl Measurement {
    /// Build a new, unconfirmed measurement and validate it.
    pub fn new(
        value: i64,
        image: impl Into<String>,
        kind: impl Into<String>,
        user: impl Into<String>,
        encoding: ImageEncoding,
    ) -> Result<Self, ValidationError> {
        let measurement = Self {
            id: new_id(),
            value,
            image: image.into(),
            kind: kind.into(),
            confirmed: false,
            user: user.into(),
            created_at: Utc::now(),
        };
        measurement.validate(encoding)?;
        Ok(measurement)
    }

    /// Check every field rule in order and return the first failure.
    pub fn validate(&self, encoding: ImageEncoding) -> Result<(), ValidationError> {
        if self.value == 0 {
            return Err(ValidationError::ValueRequired);
        }
        if self.value < 0 {
            return Err(ValidationError::InvalidValue);
        }

        validate_image(&self.image, encoding)?;

        if self.kind.is_empty() {
            return Err(ValidationError::TypeRequired);
        }
        if self.kind != WATER && self.kind != GAS {
            return Err(ValidationError::InvalidType);
        }

        if self.user.is_empty() {
            return Err(ValidationError::UserRequired);
        }
        if parse_id(&self.user).is_err() {
            return Err(ValidationError::InvalidUser);
        }

        Ok(())
    }
}

/// Drop the line breaks that wrapping encoders (e.g. the `base64` CLI) insert.
pub fn unwrap_base64(image: &str) -> String {
    image.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

/// Standard base64 decode that tolerates wrapped input.
pub fn decode_base64(image: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(unwrap_base64(image))
}

/// Image rules on their own, shared with request shape checks.
pub fn validate_image(image: &str, encoding: ImageEncoding) -> Result<(), ValidationError> {
    if image.is_empty() {
        return Err(ValidationError::ImageRequired);
    }
    if !encoding.accepts(image) {
        return Err(ValidationError::InvalidImage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: &str = "aGVsbG8gbWV0ZXI=";

    fn user_id() -> String {
        new_id().to_string()
    }

    #[test]
    fn test_new_measurement_defaults() {
        let user = user_id();
        let m = Measurement::new(150, IMAGE, WATER, user.clone(), ImageEncoding::Base64).unwrap();

        assert_eq!(m.value, 150);
        assert_eq!(m.image, IMAGE);
        assert_eq!(m.kind, WATER);
        assert_eq!(m.user, user);
        assert!(!m.confirmed);
        assert!(!m.id.is_nil());
    }

    #[test]
    fn test_value_rules() {
        let user = user_id();
        assert_eq!(
            Measurement::new(0, IMAGE, WATER, user.clone(), ImageEncoding::Base64),
            Err(ValidationError::ValueRequired)
        );
        for value in [-1, -150, i64::MIN] {
            assert_eq!(
                Measurement::new(value, IMAGE, WATER, user.clone(), ImageEncoding::Base64),
                Err(ValidationError::InvalidValue)
            );
        }
        for value in [1, 150, i64::MAX] {
            assert!(Measurement::new(value, IMAGE, GAS, user.clone(), ImageEncoding::Base64).is_ok());
        }
    }

    #[test]
    fn test_image_rules_base64() {
        let user = user_id();
        assert_eq!(
            Measurement::new(1, "", WATER, user.clone(), ImageEncoding::Base64),
            Err(ValidationError::ImageRequired)
        );
        for image in ["not base64!", "aGVsbG8", "@@@@"] {
            assert_eq!(
                Measurement::new(1, image, WATER, user.clone(), ImageEncoding::Base64),
                Err(ValidationError::InvalidImage)
            );
        }

        let m = Measurement::new(1, IMAGE, WATER, user, ImageEncoding::Base64).unwrap();
        assert_eq!(
            general_purpose::STANDARD.decode(&m.image).unwrap(),
            b"hello meter"
        );
    }

    #[test]
    fn test_wrapped_base64_accepted() {
        let wrapped = format!("{}\n{}", "A".repeat(76), "AAAA");
        let m = Measurement::new(150, wrapped.as_str(), WATER, user_id(), ImageEncoding::Base64)
            .unwrap();
        assert_eq!(decode_base64(&m.image).unwrap(), vec![0u8; 60]);

        let crlf = "aGVsbG8g\r\nbWV0ZXI=";
        assert_eq!(unwrap_base64(crlf), IMAGE);
        assert_eq!(decode_base64(crlf).unwrap(), b"hello meter");

        // Other whitespace is still rejected.
        assert_eq!(
            validate_image("aGVsbG8g bWV0ZXI=", ImageEncoding::Base64),
            Err(ValidationError::InvalidImage)
        );
    }

    #[test]
    fn test_image_rules_url() {
        let user = user_id();
        assert!(
            Measurement::new(
                1,
                "https://res.cloudinary.com/demo/image/upload/meter.jpg",
                WATER,
                user.clone(),
                ImageEncoding::Url
            )
            .is_ok()
        );
        for image in [IMAGE, "ftp://example.com/a.jpg", "/relative/path.jpg"] {
            assert_eq!(
                Measurement::new(1, image, WATER, user.clone(), ImageEncoding::Url),
                Err(ValidationError::InvalidImage)
            );
        }
    }

    #[test]
    fn test_type_rules() {
        let user = user_id();
        assert_eq!(
            Measurement::new(1, IMAGE, "", user.clone(), ImageEncoding::Base64),
            Err(ValidationError::TypeRequired)
        );
        for kind in ["0", "3", "water", " 1", "12"] {
            assert_eq!(
                Measurement::new(1, IMAGE, kind, user.clone(), ImageEncoding::Base64),
                Err(ValidationError::InvalidType)
            );
        }
        assert!(Measurement::new(1, IMAGE, WATER, user.clone(), ImageEncoding::Base64).is_ok());
        assert!(Measurement::new(1, IMAGE, GAS, user, ImageEncoding::Base64).is_ok());
    }

    #[test]
    fn test_user_rules() {
        assert_eq!(
            Measurement::new(1, IMAGE, WATER, "", ImageEncoding::Base64),
            Err(ValidationError::UserRequired)
        );
        assert_eq!(
            Measurement::new(1, IMAGE, WATER, "john", ImageEncoding::Base64),
            Err(ValidationError::InvalidUser)
        );
    }

    #[test]
    fn test_first_failure_wins() {
        // Every field is wrong; the value rule is checked first.
        assert_eq!(
            Measurement::new(0, "", "9", "nobody", ImageEncoding::Base64),
            Err(ValidationError::ValueRequired)
        );
        assert_eq!(
            Measurement::new(5, "", "9", "nobody", ImageEncoding::Base64),
            Err(ValidationError::ImageRequired)
        );
        assert_eq!(
            Measurement::new(5, IMAGE, "9", "nobody", ImageEncoding::Base64),
            Err(ValidationError::InvalidType)
        );
    }

    #[test]
    fn test_validate_existing_record() {
        let mut m = Measurement::new(10, IMAGE, WATER, user_id(), ImageEncoding::Base64).unwrap();
        assert!(m.validate(ImageEncoding::Base64).is_ok());

        m.kind = "7".into();
        assert_eq!(m.validate(ImageEncoding::Base64), Err(ValidationError::InvalidType));
    }

    #[test]
    fn test_serializes_kind_as_type() {
        let m = Measurement::new(10, IMAGE, GAS, user_id(), ImageEncoding::Base64).unwrap();
        let json = serde_json::to_value(&m).unwrap();

        assert_eq!(json["type"], "2");
        assert_eq!(json["confirmed"], false);
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_image_encoding_from_str() {
        assert_eq!("base64".parse::<ImageEncoding>(), Ok(ImageEncoding::Base64));
        assert_eq!("URL".parse::<ImageEncoding>(), Ok(ImageEncoding::Url));
        assert!("png".parse::<ImageEncoding>().is_err());
    }
}
