//! Sparse override table operations.
//!
//! Storage stays proportional to the number of user customizations: a value
//! equal to the computed default is never stored, and writing the default
//! removes any existing row. A global default-policy change therefore
//! retroactively affects every package that was never explicitly
//! overridden, with no migration step.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::params;
use rusqlite::types::Value;

use super::Database;
use crate::core::rule::Category;

impl Database {
    /// Return the stored delta for a (category, package) pair, if any.
    ///
    /// A stored value that is not an SQLite integer is treated as
    /// "no override present" and logged.
    pub fn get_override(&self, category: Category, package: &str) -> Result<Option<bool>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT value FROM overrides WHERE category = ?1 AND package = ?2",
        )?;

        let mut rows = stmt.query(params![category.as_str(), package])?;
        match rows.next()? {
            Some(row) => match row.get::<_, Value>(0)? {
                Value::Integer(v) => Ok(Some(v != 0)),
                other => {
                    tracing::warn!(
                        "Malformed {} override for {package}: {other:?}, using default",
                        category.as_str()
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Store a delta, or remove it when the value equals the computed default.
    pub fn set_override(
        &self,
        category: Category,
        package: &str,
        value: bool,
        default: bool,
    ) -> Result<()> {
        let conn = self.conn();
        if value == default {
            tracing::info!("Removing {package} {}", category.as_str());
            conn.execute(
                "DELETE FROM overrides WHERE category = ?1 AND package = ?2",
                params![category.as_str(), package],
            )?;
        } else {
            tracing::info!("Setting {package} {}={value}", category.as_str());
            conn.execute(
                "INSERT OR REPLACE INTO overrides (category, package, value)
                 VALUES (?1, ?2, ?3)",
                params![category.as_str(), package, value as i32],
            )?;
        }
        Ok(())
    }

    /// Remove a delta regardless of the computed default.
    pub fn remove_override(&self, category: Category, package: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM overrides WHERE category = ?1 AND package = ?2",
            params![category.as_str(), package],
        )?;
        Ok(())
    }

    /// Load all deltas for one category. Used at startup to reconstruct
    /// current values. Malformed rows are logged and skipped.
    pub fn load_overrides(&self, category: Category) -> Result<HashMap<String, bool>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT package, value FROM overrides WHERE category = ?1",
        )?;

        let rows = stmt.query_map(params![category.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Value>(1)?))
        })?;

        let mut results = HashMap::new();
        for row in rows {
            let (package, value) = row?;
            match value {
                Value::Integer(v) => {
                    results.insert(package, v != 0);
                }
                other => {
                    tracing::warn!(
                        "Malformed {} override for {package}: {other:?}, skipping",
                        category.as_str()
                    );
                }
            }
        }
        Ok(results)
    }

    /// Drop every delta in one category namespace.
    pub fn clear_category(&self, category: Category) -> Result<usize> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM overrides WHERE category = ?1",
            params![category.as_str()],
        )?;
        if deleted > 0 {
            tracing::info!("Cleared {deleted} {} overrides", category.as_str());
        }
        Ok(deleted)
    }
}
