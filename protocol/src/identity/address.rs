//! # Addresses
//!
//! An [`Address`] names anything that can hold or move value: a developer,
//! the administrator, a token holder, a project token ledger, a redemption
//! vault, or a settlement asset. It is an opaque string with a small set of
//! structural rules, so an `Address` value is never empty or malformed once
//! constructed (including after deserialization).
//!
//! Ledgers created by the protocol itself get a generated address with a
//! kind prefix and a random UUID body:
//!
//! ```text
//! tok_5f0c1d9e6a2b4c61a0b3e1f8d2c7a914   project token
//! vlt_09a4...                            redemption vault
//! ast_7be2...                            settlement asset
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::config::MAX_ADDRESS_LENGTH;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised when parsing an address string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The address string is empty (or whitespace only).
    #[error("address must not be empty")]
    Empty,

    /// The address string exceeds [`MAX_ADDRESS_LENGTH`].
    #[error("address too long: {len} bytes (max {max})")]
    TooLong {
        /// Length of the rejected string.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The address contains whitespace or control characters.
    #[error("address contains invalid character {0:?}")]
    InvalidCharacter(char),
}

// ---------------------------------------------------------------------------
// AddressKind
// ---------------------------------------------------------------------------

/// The kind of ledger a generated address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// A project token ledger.
    Token,
    /// A redemption vault.
    Vault,
    /// A settlement asset ledger.
    Asset,
}

impl AddressKind {
    /// Prefix used for generated addresses of this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            AddressKind::Token => "tok",
            AddressKind::Vault => "vlt",
            AddressKind::Asset => "ast",
        }
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A validated account or ledger identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parses and validates an address.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the string is empty, too long, or contains
    /// whitespace/control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, AddressError> {
        let value = value.into();
        if value.is_empty() {
            return Err(AddressError::Empty);
        }
        if value.len() > MAX_ADDRESS_LENGTH {
            return Err(AddressError::TooLong {
                len: value.len(),
                max: MAX_ADDRESS_LENGTH,
            });
        }
        if let Some(c) = value
            .chars()
            .find(|c| c.is_whitespace() || c.is_control())
        {
            return Err(AddressError::InvalidCharacter(c));
        }
        Ok(Self(value))
    }

    /// Generates a fresh, never-reused address for a protocol-created ledger.
    pub fn generate(kind: AddressKind) -> Self {
        Self(format!("{}_{}", kind.prefix(), Uuid::new_v4().simple()))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this address was generated for the given kind.
    pub fn is_kind(&self, kind: AddressKind) -> bool {
        self.0
            .strip_prefix(kind.prefix())
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::new(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::new(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        let addr = Address::new("alice").unwrap();
        assert_eq!(addr.as_str(), "alice");
        assert_eq!(addr.to_string(), "alice");
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert_eq!(Address::new(""), Err(AddressError::Empty));
        assert_eq!(
            Address::new("al ice"),
            Err(AddressError::InvalidCharacter(' '))
        );
        assert!(Address::new("bob\n").is_err());
    }

    #[test]
    fn rejects_oversized() {
        let long = "a".repeat(MAX_ADDRESS_LENGTH + 1);
        assert!(matches!(
            Address::new(long),
            Err(AddressError::TooLong { .. })
        ));
    }

    #[test]
    fn generated_addresses_are_unique_and_tagged() {
        let a = Address::generate(AddressKind::Vault);
        let b = Address::generate(AddressKind::Vault);
        assert_ne!(a, b);
        assert!(a.is_kind(AddressKind::Vault));
        assert!(!a.is_kind(AddressKind::Token));
    }

    #[test]
    fn deserialization_revalidates() {
        let ok: Address = serde_json::from_str("\"carol\"").unwrap();
        assert_eq!(ok.as_str(), "carol");
        assert!(serde_json::from_str::<Address>("\"\"").is_err());
    }
}
