//! Error taxonomy shared by every offtake component.
//!
//! Each component defines its own `thiserror` enum, and every variant maps
//! onto exactly one [`ErrorKind`]. Callers (the node's JSON-RPC gateway,
//! metrics, tests) branch on the kind rather than on component-specific
//! variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category a failed operation belongs to.
///
/// Every failure aborts the whole operation; the kind only says *why*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input: empty identifiers, zero amounts, mismatched references.
    Validation,
    /// The caller is not the identity allowed to perform the operation.
    Authorization,
    /// The operation is not valid in the current lifecycle state.
    Lifecycle,
    /// A computed value rounds to zero, overflows, or exceeds available capacity.
    Arithmetic,
    /// A lookup key does not exist.
    NotFound,
    /// An external collaborator (the settlement asset) refused the operation.
    External,
}

impl ErrorKind {
    /// Stable lowercase label, used for metric labels and RPC error data.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Lifecycle => "lifecycle",
            ErrorKind::Arithmetic => "arithmetic",
            ErrorKind::NotFound => "not_found",
            ErrorKind::External => "external",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_distinct() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::Authorization,
            ErrorKind::Lifecycle,
            ErrorKind::Arithmetic,
            ErrorKind::NotFound,
            ErrorKind::External,
        ];
        let mut labels: Vec<_> = kinds.iter().map(|k| k.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), kinds.len());
    }
}
