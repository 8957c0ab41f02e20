//! Entity addresses.

use std::fmt;

use crate::error::{Result, VersionError};

/// Address of an entity on the messaging channel (`user@host/resource`).
///
/// Only shape checks are performed; stringprep is the transport's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid(String);

impl Jid {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VersionError::BadRequest("empty address".into()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(VersionError::BadRequest(format!(
                "address contains whitespace: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(Jid::new("   ").is_err());
        assert!(Jid::new("a b@example.com").is_err());
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let j = Jid::new(" romeo@montague.lit/orchard ").unwrap();
        assert_eq!(j.as_str(), "romeo@montague.lit/orchard");
        assert_eq!(j.to_string(), "romeo@montague.lit/orchard");
    }
}
