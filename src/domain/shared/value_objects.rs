//! Shared value objects used across the call context

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::DomainError;
use super::result::Result;

/// Call identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A dialable phone number: digits with an optional leading `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let digits = raw.strip_prefix('+').unwrap_or(raw);

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::InvalidPhoneNumber(raw.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number without the leading `+`
    pub fn digits(&self) -> &str {
        self.0.strip_prefix('+').unwrap_or(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_number_parse() {
        let number = PhoneNumber::parse("79133888778").unwrap();
        assert_eq!(number.as_str(), "79133888778");
        assert_eq!(number.digits(), "79133888778");

        let plus = PhoneNumber::parse("+79133888778").unwrap();
        assert_eq!(plus.digits(), "79133888778");
        assert_eq!(plus.to_string(), "+79133888778");
    }

    #[test]
    fn test_phone_number_rejects_garbage() {
        assert!(PhoneNumber::parse("").is_err());
        assert!(PhoneNumber::parse("+").is_err());
        assert!(PhoneNumber::parse("7913-388").is_err());
        assert!(PhoneNumber::parse("sip_79133888778").is_err());
    }

    #[test]
    fn test_phone_number_deserialize_validates() {
        let ok: std::result::Result<PhoneNumber, _> = serde_json::from_str("\"+15550001111\"");
        assert!(ok.is_ok());

        let bad: std::result::Result<PhoneNumber, _> = serde_json::from_str("\"call me\"");
        assert!(bad.is_err());
    }
}
