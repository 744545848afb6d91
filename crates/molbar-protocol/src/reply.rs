//! Datagram reply payloads.
//!
//! Only the datagram transport answers its peer. The exact wording is not
//! contractual; clients should only rely on [`Reply::is_success`].

use std::fmt;

const DELIVERED_PREFIX: &str = "OK: Delivered ";
const NOT_DELIVERED_PREFIX: &str = "did not deliver ";
const NOT_DELIVERED_SUFFIX: &str = ", sorry.";
const INVALID_PREFIX: &str = "ERROR: ";

/// A reply sent back to a datagram peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The molecules were withdrawn.
    Delivered { molecule: String },
    /// Unknown molecule, insufficient stock, or a store failure.
    NotDelivered { molecule: String },
    /// The datagram did not parse as a `DELIVER` command.
    Invalid { reason: String },
}

impl Reply {
    pub fn delivered(molecule: impl Into<String>) -> Self {
        Self::Delivered {
            molecule: molecule.into(),
        }
    }

    pub fn not_delivered(molecule: impl Into<String>) -> Self {
        Self::NotDelivered {
            molecule: molecule.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Interprets reply text received from the server.
    ///
    /// Anything that is not recognisably a success or a refusal is
    /// treated as an error reply carrying the raw text.
    pub fn from_wire(text: &str) -> Self {
        let text = text.trim_end_matches(['\n', '\r', '\0']);
        if let Some(molecule) = text.strip_prefix(DELIVERED_PREFIX) {
            return Self::delivered(molecule);
        }
        if let Some(molecule) = text
            .strip_prefix(NOT_DELIVERED_PREFIX)
            .and_then(|rest| rest.strip_suffix(NOT_DELIVERED_SUFFIX))
        {
            return Self::not_delivered(molecule);
        }
        let reason = text.strip_prefix(INVALID_PREFIX).unwrap_or(text);
        Self::invalid(reason)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered { molecule } => write!(f, "{DELIVERED_PREFIX}{molecule}"),
            Self::NotDelivered { molecule } => {
                write!(f, "{NOT_DELIVERED_PREFIX}{molecule}{NOT_DELIVERED_SUFFIX}")
            }
            Self::Invalid { reason } => write!(f, "{INVALID_PREFIX}{reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_text() {
        assert_eq!(Reply::delivered("WATER").to_string(), "OK: Delivered WATER");
        assert_eq!(
            Reply::not_delivered("CARBON DIOXIDE").to_string(),
            "did not deliver CARBON DIOXIDE, sorry."
        );
        assert_eq!(
            Reply::invalid("Unknown command: FOO").to_string(),
            "ERROR: Unknown command: FOO"
        );
    }

    #[test]
    fn test_from_wire() {
        assert_eq!(
            Reply::from_wire("OK: Delivered GLUCOSE"),
            Reply::delivered("GLUCOSE")
        );
        assert_eq!(
            Reply::from_wire("did not deliver WATER, sorry."),
            Reply::not_delivered("WATER")
        );
        assert_eq!(Reply::from_wire("ERROR: bad"), Reply::invalid("bad"));
        assert_eq!(Reply::from_wire("garbage"), Reply::invalid("garbage"));
    }

    #[test]
    fn test_only_delivered_is_success() {
        assert!(Reply::delivered("WATER").is_success());
        assert!(!Reply::not_delivered("WATER").is_success());
        assert!(!Reply::invalid("x").is_success());
    }
}
