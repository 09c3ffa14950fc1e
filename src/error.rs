//! Unified error type for the rule engine's public surface.
//!
//! `RuleError` serializes as `{ "kind": "...", "message": "..." }` so a
//! presentation collaborator can programmatically distinguish error
//! categories.

use serde::ser::SerializeStruct;

/// Error returned by fallible rule engine operations.
///
/// Invalid categories are unrepresentable (`Category` is an enum), so the
/// remaining kinds are all recoverable integration-level failures.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Errors originating from SQLite / the override store.
    #[error("{0}")]
    Database(String),

    /// I/O and filesystem errors.
    #[error("{0}")]
    Io(String),

    /// The target package of a change is not in the working rule set.
    #[error("unknown package {0}")]
    UnknownPackage(String),
}

impl RuleError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleError::Database(_) => "Database",
            RuleError::Io(_) => "Io",
            RuleError::UnknownPackage(_) => "UnknownPackage",
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for RuleError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("RuleError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<anyhow::Error> for RuleError {
    fn from(err: anyhow::Error) -> Self {
        RuleError::Database(err.to_string())
    }
}

impl From<std::io::Error> for RuleError {
    fn from(err: std::io::Error) -> Self {
        RuleError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for RuleError {
    fn from(err: rusqlite::Error) -> Self {
        RuleError::Database(err.to_string())
    }
}
