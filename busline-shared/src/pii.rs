use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps contact details so they never show up in `Debug`/`Display` output.
///
/// Serialization passes the real value through: API responses and the store need it,
/// log macros such as `tracing::info!("{:?}", booking)` do not.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_masked() {
        let email = Masked::from("rider@example.com");
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(email.expose(), "rider@example.com");
    }

    #[test]
    fn serializes_real_value() {
        let email = Masked::from("rider@example.com");
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"rider@example.com\"");

        let back: Masked<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, email);
    }
}
